//! Non-dominated sorting with crowding distance.

use std::cmp::Ordering;

use log::debug;
use rayon::prelude::*;

use super::member::Member;
use super::objectives::Direction;
use crate::schema::AdaptiveEpsilonConfig;

/// Values oriented so that larger is always better.
fn oriented(value: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Maximize => value,
        Direction::Minimize => -value,
    }
}

/// `a` dominates `b` when it is better by more than `epsilon` on at least
/// one objective and worse by more than `epsilon` on none.
pub fn dominates(a: &[f64], b: &[f64], directions: &[Direction], epsilon: f64) -> bool {
    let mut better = false;
    for ((&x, &y), &dir) in a.iter().zip(b).zip(directions) {
        let (x, y) = (oriented(x, dir), oriented(y, dir));
        if x < y - epsilon {
            return false;
        }
        if x > y + epsilon {
            better = true;
        }
    }
    better
}

/// Fronts of indices into `values`, best first.
pub fn non_dominated_sort(
    values: &[Vec<f64>],
    directions: &[Direction],
    epsilon: f64,
) -> Vec<Vec<usize>> {
    let n = values.len();
    let dominated_by_me: Vec<Vec<usize>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && dominates(&values[i], &values[j], directions, epsilon))
                .collect()
        })
        .collect();

    let mut in_degree = vec![0usize; n];
    for list in &dominated_by_me {
        for &j in list {
            in_degree[j] += 1;
        }
    }

    let mut fronts = Vec::new();
    let mut assigned = vec![false; n];
    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            assigned[i] = true;
            for &j in &dominated_by_me[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    // Epsilon dominance is not transitive; anything left in a cycle forms
    // one last front.
    let leftover: Vec<usize> = (0..n).filter(|&i| !assigned[i]).collect();
    if !leftover.is_empty() {
        fronts.push(leftover);
    }
    fronts
}

/// Crowding distance of each front member, in front order.
pub fn crowding_distances(front: &[usize], values: &[Vec<f64>]) -> Vec<f64> {
    let len = front.len();
    if len < 3 {
        return vec![f64::INFINITY; len];
    }
    let objectives = values.get(front[0]).map_or(0, |row| row.len());
    let mut distance = vec![0.0; len];
    for m in 0..objectives {
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| {
            values[front[a]][m]
                .total_cmp(&values[front[b]][m])
                .then(front[a].cmp(&front[b]))
        });
        let lo = values[front[order[0]]][m];
        let hi = values[front[order[len - 1]]][m];
        distance[order[0]] = f64::INFINITY;
        distance[order[len - 1]] = f64::INFINITY;
        let range = hi - lo;
        if range <= 0.0 {
            continue;
        }
        for k in 1..len - 1 {
            let gap = values[front[order[k + 1]]][m] - values[front[order[k - 1]]][m];
            distance[order[k]] += gap / range;
        }
    }
    distance
}

/// Result of ranking a population.
#[derive(Debug, Clone, Default)]
pub struct RankOutcome {
    pub front_sizes: Vec<usize>,
    /// Front 0 members' objective rows.
    pub first_front: Vec<Vec<f64>>,
}

/// Rank, annotate and reorder the population by (rank, -crowding, index).
/// `values` is row-aligned with the population on entry.
pub fn rank_population<G>(
    population: &mut Vec<Member<G>>,
    values: &[Vec<f64>],
    directions: &[Direction],
    epsilon: f64,
) -> RankOutcome {
    let fronts = non_dominated_sort(values, directions, epsilon);
    let n = population.len();
    let mut rank = vec![0usize; n];
    let mut crowding = vec![0.0f64; n];
    for (r, front) in fronts.iter().enumerate() {
        let distances = crowding_distances(front, values);
        for (&i, d) in front.iter().zip(distances) {
            rank[i] = r;
            crowding[i] = d;
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        rank[a]
            .cmp(&rank[b])
            .then_with(|| {
                crowding[b]
                    .partial_cmp(&crowding[a])
                    .unwrap_or(Ordering::Equal)
            })
            .then(a.cmp(&b))
    });

    let outcome = RankOutcome {
        front_sizes: fronts.iter().map(|f| f.len()).collect(),
        first_front: fronts
            .first()
            .map(|f| f.iter().map(|&i| values[i].clone()).collect())
            .unwrap_or_default(),
    };

    let mut slots: Vec<Option<Member<G>>> = std::mem::take(population).into_iter().map(Some).collect();
    for i in order {
        if let Some(mut member) = slots[i].take() {
            member.traits.pareto_rank = rank[i];
            member.traits.crowding = crowding[i];
            population.push(member);
        }
    }
    outcome
}

/// Volume dominated by the front, measured from the population-wide worst
/// point.
pub fn hypervolume(front: &[Vec<f64>], values: &[Vec<f64>], directions: &[Direction]) -> f64 {
    if front.is_empty() || directions.is_empty() {
        return 0.0;
    }
    let dims = directions.len();
    let reference: Vec<f64> = (0..dims)
        .map(|m| {
            values
                .iter()
                .map(|row| oriented(row[m], directions[m]))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    let points: Vec<Vec<f64>> = front
        .iter()
        .map(|row| {
            (0..dims)
                .map(|m| (oriented(row[m], directions[m]) - reference[m]).max(0.0))
                .collect()
        })
        .collect();
    dominated_volume(points, dims)
}

/// Exact volume dominated by non-negative `points` over their first `dims`
/// coordinates, slicing along the last one.
fn dominated_volume(mut points: Vec<Vec<f64>>, dims: usize) -> f64 {
    match dims {
        0 => 0.0,
        1 => points.iter().map(|p| p[0]).fold(0.0, f64::max),
        2 => {
            points.sort_by(|a, b| b[0].total_cmp(&a[0]));
            let mut area = 0.0;
            let mut ceiling = 0.0;
            for p in &points {
                if p[1] > ceiling {
                    area += p[0] * (p[1] - ceiling);
                    ceiling = p[1];
                }
            }
            area
        }
        _ => {
            let last = dims - 1;
            points.sort_by(|a, b| b[last].total_cmp(&a[last]));
            let mut volume = 0.0;
            for k in 0..points.len() {
                let top = points[k][last];
                let bottom = points.get(k + 1).map_or(0.0, |p| p[last]);
                if top > bottom {
                    volume += (top - bottom) * dominated_volume(points[..=k].to_vec(), last);
                }
            }
            volume
        }
    }
}

/// Steers the dominance epsilon toward a target front-0 size.
#[derive(Debug, Clone)]
pub struct EpsilonController {
    epsilon: f64,
    last_change: Option<usize>,
}

impl EpsilonController {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            last_change: None,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    /// A larger epsilon makes domination harder and grows front 0.
    pub fn step(
        &mut self,
        front0: usize,
        population: usize,
        generation: usize,
        config: &AdaptiveEpsilonConfig,
    ) {
        if !config.enabled {
            return;
        }
        if let Some(last) = self.last_change
            && generation.saturating_sub(last) < config.cooldown
        {
            return;
        }
        let target = config.target_front0_fraction * population as f64;
        let front0 = front0 as f64;
        let next = if front0 > target {
            self.epsilon - config.adjust
        } else if front0 < target {
            self.epsilon + config.adjust
        } else {
            return;
        };
        let next = next.clamp(config.min, config.max);
        if next != self.epsilon {
            debug!("Dominance epsilon {:.4} -> {:.4}", self.epsilon, next);
            self.epsilon = next;
            self.last_change = Some(generation);
        }
    }
}
