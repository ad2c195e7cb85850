//! Per-member self-adaptive mutation rate and amount.

use super::member::Member;
use super::rng::EngineRng;
use crate::schema::{AdaptiveMutationConfig, AdaptiveStrategy};

/// Which trait a pass adapts.
#[derive(Debug, Clone, Copy)]
enum Knob {
    Rate,
    Amount,
}

/// Seed unset traits and, on adaptation generations, move every member's
/// rate (and amount when enabled) by a bounded random delta.
pub fn adapt_mutation<G>(
    population: &mut [Member<G>],
    config: &AdaptiveMutationConfig,
    base_rate: f64,
    base_amount: f64,
    generation: usize,
    rng: &mut EngineRng,
) {
    if !config.enabled {
        return;
    }
    let initial_rate = config.initial_rate.unwrap_or(base_rate);
    for member in population.iter_mut() {
        member.traits.mutation_rate.get_or_insert(initial_rate);
        member.traits.mutation_amount.get_or_insert(base_amount);
    }
    if config.adapt_every > 1 && generation % config.adapt_every != 0 {
        return;
    }

    let mut ranked: Vec<usize> = (0..population.len())
        .filter(|&i| population[i].score.is_some())
        .collect();
    ranked.sort_by(|&a, &b| population[b].fitness().total_cmp(&population[a].fitness()));

    adapt_knob(population, &ranked, config, Knob::Rate, generation, rng);
    if config.adapt_amount {
        adapt_knob(population, &ranked, config, Knob::Amount, generation, rng);
    }
}

fn adapt_knob<G>(
    population: &mut [Member<G>],
    ranked: &[usize],
    config: &AdaptiveMutationConfig,
    knob: Knob,
    generation: usize,
    rng: &mut EngineRng,
) {
    let (sigma, lo, hi) = match knob {
        Knob::Rate => (config.sigma, config.min_rate, config.max_rate),
        Knob::Amount => (config.amount_sigma, config.min_amount, config.max_amount),
    };
    let deltas = propose(population.len(), ranked, config.strategy, sigma, generation, rng);
    for (member, delta) in population.iter_mut().zip(deltas) {
        let slot = match knob {
            Knob::Rate => &mut member.traits.mutation_rate,
            Knob::Amount => &mut member.traits.mutation_amount,
        };
        if let Some(value) = slot.as_mut() {
            *value = (*value + delta).clamp(lo, hi);
        }
    }
}

/// Strategy deltas plus the balancing pass.
fn propose(
    n: usize,
    ranked: &[usize],
    strategy: AdaptiveStrategy,
    sigma: f64,
    generation: usize,
    rng: &mut EngineRng,
) -> Vec<f64> {
    let mut deltas = vec![0.0; n];
    if n == 0 || sigma <= 0.0 {
        return deltas;
    }
    let half = ranked.len() / 2;
    let mut tier = vec![None; n];
    for (pos, &i) in ranked.iter().enumerate() {
        tier[i] = Some(pos < half);
    }

    for (i, delta) in deltas.iter_mut().enumerate() {
        let magnitude = rng.uniform(0.0, sigma);
        let symmetric = rng.uniform(-sigma, sigma);
        *delta = match (strategy, tier[i]) {
            (AdaptiveStrategy::TwoTier, Some(true)) => -magnitude,
            (AdaptiveStrategy::TwoTier, Some(false)) => magnitude,
            (AdaptiveStrategy::Exploration, Some(false)) => magnitude,
            (AdaptiveStrategy::Anneal, _) => symmetric / (1.0 + generation as f64).sqrt(),
            _ => symmetric,
        };
    }

    if n >= 2 {
        let up = ranked.last().copied().unwrap_or(n - 1);
        let down = ranked
            .first()
            .copied()
            .filter(|&i| i != up)
            .unwrap_or(if up == 0 { 1 } else { 0 });
        if !deltas.iter().any(|&d| d > 0.0) {
            deltas[up] = sigma;
        }
        if !deltas.iter().any(|&d| d < 0.0) {
            deltas[down] = -sigma;
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(scores: &[Option<f64>]) -> Vec<Member<()>> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let mut m = Member::new(i as u64, ());
                m.score = s;
                m
            })
            .collect()
    }

    fn enabled(strategy: AdaptiveStrategy) -> AdaptiveMutationConfig {
        AdaptiveMutationConfig {
            enabled: true,
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_leaves_traits_unset() {
        let mut pop = members(&[Some(1.0)]);
        let mut rng = EngineRng::new(0);
        adapt_mutation(&mut pop, &AdaptiveMutationConfig::default(), 0.7, 1.0, 0, &mut rng);
        assert!(pop[0].traits.mutation_rate.is_none());
    }

    #[test]
    fn test_two_tier_splits_directions() {
        let mut pop = members(&[Some(4.0), Some(3.0), Some(2.0), Some(1.0)]);
        let mut rng = EngineRng::new(1);
        adapt_mutation(&mut pop, &enabled(AdaptiveStrategy::TwoTier), 0.5, 1.0, 0, &mut rng);
        let rates: Vec<f64> = pop.iter().map(|m| m.traits.mutation_rate.unwrap()).collect();
        assert!(rates[0] <= 0.5 && rates[1] <= 0.5);
        assert!(rates[2] >= 0.5 && rates[3] >= 0.5);
    }

    #[test]
    fn test_balancing_forces_divergence() {
        for seed in 0..20 {
            let mut pop = members(&[Some(2.0), Some(1.0)]);
            let mut rng = EngineRng::new(seed);
            adapt_mutation(
                &mut pop,
                &enabled(AdaptiveStrategy::Exploration),
                0.5,
                1.0,
                0,
                &mut rng,
            );
            let up = pop.iter().any(|m| m.traits.mutation_rate.unwrap() > 0.5);
            let down = pop.iter().any(|m| m.traits.mutation_rate.unwrap() < 0.5);
            assert!(up && down, "seed {seed}");
        }
    }

    #[test]
    fn test_rates_stay_in_bounds() {
        let config = AdaptiveMutationConfig {
            adapt_amount: true,
            ..enabled(AdaptiveStrategy::Anneal)
        };
        let mut pop = members(&[Some(1.0), None, Some(3.0), None, Some(0.5)]);
        let mut rng = EngineRng::new(2);
        for generation in 0..200 {
            adapt_mutation(&mut pop, &config, 0.7, 1.0, generation, &mut rng);
        }
        for m in &pop {
            let r = m.traits.mutation_rate.unwrap();
            let a = m.traits.mutation_amount.unwrap();
            assert!((config.min_rate..=config.max_rate).contains(&r));
            assert!((config.min_amount..=config.max_amount).contains(&a));
        }
    }
}
