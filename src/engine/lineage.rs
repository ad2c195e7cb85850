//! Lineage records, ancestor uniqueness and depth-based score pressure.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use super::diversity::sample_pairs;
use super::member::Member;
use super::rng::EngineRng;
use crate::schema::{AncestorUniquenessConfig, LineageConfig, LineagePressure, UniquenessTarget};

/// Parent links of recently born members, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct LineageTracker {
    parents: HashMap<u64, (Vec<u64>, usize)>,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<G>(&mut self, member: &Member<G>, generation: usize) {
        self.parents
            .entry(member.id)
            .or_insert_with(|| (member.parents.clone(), generation));
    }

    pub fn parents_of(&self, id: u64) -> Option<&[u64]> {
        self.parents.get(&id).map(|(p, _)| p.as_slice())
    }

    /// Forget records older than `window` generations, except for ids still
    /// in `alive`.
    pub fn prune(&mut self, generation: usize, window: usize, alive: &BTreeSet<u64>) {
        self.parents
            .retain(|id, (_, born)| generation.saturating_sub(*born) <= window || alive.contains(id));
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The member itself plus ancestors up to `depth` links back.
    pub fn ancestors(&self, id: u64, depth: usize) -> BTreeSet<u64> {
        let mut set = BTreeSet::from([id]);
        let mut frontier = vec![id];
        for _ in 0..depth {
            let mut next = Vec::new();
            for node in frontier {
                if let Some(parents) = self.parents_of(node) {
                    for &p in parents {
                        if set.insert(p) {
                            next.push(p);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        set
    }

    /// Whether a member's two parents are the same or share a parent.
    pub fn is_inbred<G>(&self, member: &Member<G>) -> bool {
        match member.parents.as_slice() {
            [a, b] if a == b => true,
            [a, b] => match (self.parents_of(*a), self.parents_of(*b)) {
                (Some(pa), Some(pb)) => pa.iter().any(|p| pb.contains(p)),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Mean Jaccard distance between ancestor sets over sampled pairs.
pub fn ancestor_uniqueness<G>(
    population: &[Member<G>],
    tracker: &LineageTracker,
    window: usize,
    pairs: usize,
    rng: &mut EngineRng,
) -> f64 {
    let sampled = sample_pairs(population.len(), pairs, rng);
    if sampled.is_empty() {
        return 0.0;
    }
    let total: f64 = sampled
        .iter()
        .map(|&(i, j)| {
            let a = tracker.ancestors(population[i].id, window);
            let b = tracker.ancestors(population[j].id, window);
            let shared = a.intersection(&b).count() as f64;
            let union = a.union(&b).count() as f64;
            1.0 - shared / union
        })
        .sum();
    total / sampled.len() as f64
}

/// Adjust scores by lineage depth or inbreeding.
pub fn apply_pressure<G>(
    population: &mut [Member<G>],
    tracker: &LineageTracker,
    config: &LineageConfig,
    strength: f64,
) {
    let Some(mode) = config.pressure else {
        return;
    };
    let target = config.target_depth as f64;
    for member in population.iter_mut() {
        if member.score.is_none() {
            continue;
        }
        let depth = member.depth as f64;
        let adjustment = match mode {
            LineagePressure::PenalizeDeep => -strength * (depth - target).max(0.0),
            LineagePressure::RewardShallow => strength * (target - depth).max(0.0),
            LineagePressure::AntiInbreeding => {
                if tracker.is_inbred(member) {
                    -strength
                } else {
                    0.0
                }
            }
        };
        member.score = Some(member.fitness() + adjustment);
    }
}

/// Feedback from ancestor uniqueness into epsilon or lineage strength.
#[derive(Debug, Clone, Default)]
pub struct UniquenessController {
    last_change: Option<usize>,
}

impl UniquenessController {
    /// Returns true when a knob moved.
    pub fn step(
        &mut self,
        uniqueness: f64,
        generation: usize,
        config: &AncestorUniquenessConfig,
        epsilon: &mut f64,
        lineage_strength: &mut f64,
    ) -> bool {
        if !config.enabled {
            return false;
        }
        if let Some(last) = self.last_change
            && generation.saturating_sub(last) < config.cooldown
        {
            return false;
        }
        let direction = if uniqueness < config.low {
            1.0
        } else if uniqueness > config.high {
            -1.0
        } else {
            return false;
        };
        let knob = match config.target {
            UniquenessTarget::Epsilon => epsilon,
            UniquenessTarget::LineagePressure => lineage_strength,
        };
        *knob = (*knob + direction * config.adjust).max(0.0);
        debug!(
            "Ancestor uniqueness {:.3}: {:?} -> {:.4}",
            uniqueness, config.target, *knob
        );
        self.last_change = Some(generation);
        true
    }
}
