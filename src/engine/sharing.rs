//! Explicit fitness sharing within species.

use std::collections::HashMap;

use super::compat::{CompatibilityCache, CompatibilityParams};
use super::member::Member;
use super::species::Species;
use crate::network::Genome;

/// Divide every member's score by its niche count.
///
/// With `sigma == 0` the niche count is the species size. Otherwise it is
/// the sum of `max(0, 1 - (d / sigma)^2)` over species mates (the member
/// itself contributes 1), floored at 1. Unscored members end up at 0.
pub fn share_fitness<G: Genome>(
    population: &mut [Member<G>],
    species: &[Species<G>],
    sigma: f64,
    cache: &mut CompatibilityCache,
    params: &CompatibilityParams,
) {
    let index: HashMap<u64, usize> = population
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id, i))
        .collect();

    let mut divisors: Vec<(usize, f64)> = Vec::with_capacity(population.len());
    for s in species {
        let members: Vec<usize> = s
            .members
            .iter()
            .filter_map(|id| index.get(id).copied())
            .collect();
        if sigma <= 0.0 {
            let size = members.len().max(1) as f64;
            divisors.extend(members.iter().map(|&i| (i, size)));
            continue;
        }
        for &i in &members {
            let mut niche = 0.0;
            for &j in &members {
                let d = if i == j {
                    0.0
                } else {
                    cache.distance(
                        population[i].id,
                        &population[i].genome,
                        population[j].id,
                        &population[j].genome,
                        params,
                    )
                };
                niche += (1.0 - (d / sigma).powi(2)).max(0.0);
            }
            divisors.push((i, niche.max(1.0)));
        }
    }

    for (i, divisor) in divisors {
        let member = &mut population[i];
        member.score = Some(member.fitness() / divisor);
    }
}
