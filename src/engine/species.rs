//! Speciation: greedy clustering by compatibility with a feedback-controlled
//! threshold.

use std::collections::HashMap;

use log::debug;

use super::compat::{CompatibilityCache, CompatibilityParams};
use super::member::Member;
use super::rng::EngineRng;
use crate::network::Genome;
use crate::schema::{CoefficientTuneConfig, SpeciationConfig, ThresholdControllerConfig};

/// A cluster of compatible members.
#[derive(Debug, Clone)]
pub struct Species<G> {
    pub id: u64,
    /// Member ids, in population order.
    pub members: Vec<u64>,
    /// Id of the first member.
    pub representative: u64,
    /// Snapshot of the representative, kept across generations.
    pub representative_genome: G,
    pub created: usize,
    pub last_improved: usize,
    pub best_score: f64,
}

impl<G> Species<G> {
    pub fn age(&self, generation: usize) -> usize {
        generation.saturating_sub(self.created)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// PI controller over an exponentially smoothed species count.
#[derive(Debug, Clone, Default)]
pub struct ThresholdController {
    ema: Option<f64>,
    integral: f64,
}

impl ThresholdController {
    pub fn ema(&self) -> Option<f64> {
        self.ema
    }

    /// Advance one step. Returns `(new threshold, error)`.
    pub fn step(
        &mut self,
        threshold: f64,
        observed: usize,
        target: usize,
        config: &ThresholdControllerConfig,
    ) -> (f64, f64) {
        let observed = observed as f64;
        let ema = match self.ema {
            Some(prev) => config.smoothing * prev + (1.0 - config.smoothing) * observed,
            None => observed,
        };
        self.ema = Some(ema);

        let error = target as f64 - ema;
        self.integral = self.integral * config.integral_decay + error;
        let raw = threshold - (config.kp * error + config.ki * self.integral);
        let clamped = raw.clamp(config.min_threshold, config.max_threshold);
        if clamped != raw {
            self.integral = 0.0;
        }
        (clamped, error)
    }
}

/// Multiplicative nudge of the excess/disjoint coefficients.
pub fn tune_coefficients(
    params: &mut CompatibilityParams,
    error: f64,
    config: &CoefficientTuneConfig,
    rng: &mut EngineRng,
) {
    let factor = if error > 0.0 {
        1.0 + config.rate
    } else if error < 0.0 {
        1.0 - config.rate
    } else {
        rng.uniform(1.0 - config.rate / 2.0, 1.0 + config.rate / 2.0)
    };
    params.excess = (params.excess * factor).clamp(config.min_coeff, config.max_coeff);
    params.disjoint = (params.disjoint * factor).clamp(config.min_coeff, config.max_coeff);
}

/// Species list plus the adaptive threshold state.
#[derive(Debug, Clone)]
pub struct Speciation<G> {
    species: Vec<Species<G>>,
    next_id: u64,
    threshold: f64,
    params: CompatibilityParams,
    controller: ThresholdController,
    membership: HashMap<u64, u64>,
    turnover: f64,
}

impl<G: Genome> Speciation<G> {
    pub fn new(config: &SpeciationConfig) -> Self {
        Self {
            species: Vec::new(),
            next_id: 0,
            threshold: config.compatibility_threshold,
            params: CompatibilityParams::from_config(config),
            controller: ThresholdController::default(),
            membership: HashMap::new(),
            turnover: 0.0,
        }
    }

    pub fn species(&self) -> &[Species<G>] {
        &self.species
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn params(&self) -> &CompatibilityParams {
        &self.params
    }

    pub fn smoothed_count(&self) -> Option<f64> {
        self.controller.ema()
    }

    /// Fraction of previously assigned members whose species changed.
    pub fn turnover(&self) -> f64 {
        self.turnover
    }

    /// Reassign the population, then run the age penalty, stagnation
    /// culling and threshold control.
    pub fn speciate(
        &mut self,
        population: &mut [Member<G>],
        cache: &mut CompatibilityCache,
        config: &SpeciationConfig,
        generation: usize,
        rng: &mut EngineRng,
    ) {
        let previous = std::mem::take(&mut self.membership);

        for species in &mut self.species {
            species.members.clear();
        }

        for member in population.iter() {
            let mut assigned = None;
            for (idx, species) in self.species.iter().enumerate() {
                let d = cache.distance(
                    member.id,
                    &member.genome,
                    species.representative,
                    &species.representative_genome,
                    &self.params,
                );
                if d < self.threshold {
                    assigned = Some(idx);
                    break;
                }
            }
            match assigned {
                Some(idx) => self.species[idx].members.push(member.id),
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.species.push(Species {
                        id,
                        members: vec![member.id],
                        representative: member.id,
                        representative_genome: member.genome.clone(),
                        created: generation,
                        last_improved: generation,
                        best_score: f64::NEG_INFINITY,
                    });
                }
            }
        }

        self.species.retain(|s| !s.is_empty());

        let index: HashMap<u64, usize> = population
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect();

        for species in &mut self.species {
            let first = species.members[0];
            if species.representative != first {
                species.representative = first;
                if let Some(&i) = index.get(&first) {
                    species.representative_genome = population[i].genome.clone();
                }
            }
            let best = species
                .members
                .iter()
                .filter_map(|id| index.get(id))
                .map(|&i| population[i].fitness())
                .fold(f64::NEG_INFINITY, f64::max);
            if best > species.best_score {
                species.best_score = best;
                species.last_improved = generation;
            }
        }

        // Merging stagnant species shrinks the count for reproduction only;
        // the controller sees the partition the threshold produced.
        let observed = self.species.len();
        self.cull_stagnant(population, &index, cache, config, generation);

        for species in &self.species {
            if species.age(generation) > config.age.very_old_age {
                for id in &species.members {
                    if let Some(&i) = index.get(id)
                        && let Some(score) = population[i].score.as_mut()
                    {
                        *score *= config.age.very_old_penalty;
                    }
                }
            }
        }

        self.membership = self
            .species
            .iter()
            .flat_map(|s| s.members.iter().map(move |&m| (m, s.id)))
            .collect();
        let mut carried = 0usize;
        let mut moved = 0usize;
        for (member, species) in &self.membership {
            if let Some(before) = previous.get(member) {
                carried += 1;
                if before != species {
                    moved += 1;
                }
            }
        }
        self.turnover = if carried == 0 {
            0.0
        } else {
            moved as f64 / carried as f64
        };

        if let Some(target) = config.target_species {
            let (threshold, error) =
                self.controller
                    .step(self.threshold, observed, target, &config.controller);
            debug!(
                "Species {} (target {}), threshold {:.3} -> {:.3}",
                observed, target, self.threshold, threshold
            );
            self.threshold = threshold;
            if config.auto_tune.enabled {
                tune_coefficients(&mut self.params, error, &config.auto_tune, rng);
            }
        }
    }

    /// Remove species that have not improved for the stagnation window.
    /// Their members move to the closest surviving species so the
    /// partition holds and they still take part in reproduction.
    fn cull_stagnant(
        &mut self,
        population: &[Member<G>],
        index: &HashMap<u64, usize>,
        cache: &mut CompatibilityCache,
        config: &SpeciationConfig,
        generation: usize,
    ) {
        if self.species.len() < 2 || config.stagnation_generations == 0 {
            return;
        }
        let global_best = self
            .species
            .iter()
            .map(|s| s.best_score)
            .fold(f64::NEG_INFINITY, f64::max);

        let (stagnant, mut alive): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.species).into_iter().partition(|s| {
                generation.saturating_sub(s.last_improved) >= config.stagnation_generations
                    && s.best_score < global_best
            });
        if alive.is_empty() {
            self.species = stagnant;
            return;
        }

        for species in stagnant {
            debug!(
                "Species {} stagnant since generation {}, merging {} members",
                species.id,
                species.last_improved,
                species.len()
            );
            for id in species.members {
                let Some(&i) = index.get(&id) else { continue };
                let member = &population[i];
                let mut nearest = 0;
                let mut nearest_d = f64::INFINITY;
                for (k, s) in alive.iter().enumerate() {
                    let d = cache.distance(
                        member.id,
                        &member.genome,
                        s.representative,
                        &s.representative_genome,
                        &self.params,
                    );
                    if d < nearest_d {
                        nearest_d = d;
                        nearest = k;
                    }
                }
                alive[nearest].members.push(id);
            }
        }
        self.species = alive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{InnovationRegistry, MutationContext, MutationOp, Network};

    fn population(n: usize, seed: u64, structural: usize) -> Vec<Member<Network>> {
        let mut rng = EngineRng::new(seed);
        let mut reg = InnovationRegistry::new(2, 1);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        (0..n)
            .map(|i| {
                let mut net = Network::minimal(2, 1, &mut ctx);
                for _ in 0..(i % (structural + 1)) {
                    net.mutate(MutationOp::AddNode, &mut ctx);
                    net.mutate(MutationOp::AddConn, &mut ctx);
                }
                let mut m = Member::new(i as u64, net);
                m.score = Some(i as f64);
                m
            })
            .collect()
    }

    #[test]
    fn test_species_partition_population() {
        let config = SpeciationConfig::default();
        let mut pop = population(30, 5, 3);
        let mut speciation = Speciation::new(&config);
        let mut cache = CompatibilityCache::new();
        let mut rng = EngineRng::new(0);
        speciation.speciate(&mut pop, &mut cache, &config, 0, &mut rng);

        let total: usize = speciation.species().iter().map(|s| s.len()).sum();
        assert_eq!(total, pop.len());
        let mut seen: Vec<u64> = speciation
            .species()
            .iter()
            .flat_map(|s| s.members.clone())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), pop.len());
        for s in speciation.species() {
            assert_eq!(s.representative, s.members[0]);
        }
    }

    #[test]
    fn test_first_matching_species_wins() {
        let mut config = SpeciationConfig::default();
        config.compatibility_threshold = 1000.0;
        let mut pop = population(10, 1, 2);
        let mut speciation = Speciation::new(&config);
        let mut cache = CompatibilityCache::new();
        let mut rng = EngineRng::new(0);
        speciation.speciate(&mut pop, &mut cache, &config, 0, &mut rng);
        assert_eq!(speciation.species().len(), 1);
        assert_eq!(speciation.species()[0].members[0], 0);
    }

    #[test]
    fn test_controller_lowers_threshold_when_too_few() {
        let config = ThresholdControllerConfig::default();
        let mut ctl = ThresholdController::default();
        let (t, error) = ctl.step(3.0, 1, 8, &config);
        assert!(error > 0.0);
        assert!(t < 3.0);
    }

    #[test]
    fn test_controller_clamp_resets_integral() {
        let config = ThresholdControllerConfig::default();
        let mut ctl = ThresholdController::default();
        let (t, _) = ctl.step(0.6, 1, 50, &config);
        assert_eq!(t, config.min_threshold);
        assert_eq!(ctl.integral, 0.0);
    }

    #[test]
    fn test_tune_direction_and_bounds() {
        let config = CoefficientTuneConfig {
            enabled: true,
            ..Default::default()
        };
        let mut rng = EngineRng::new(0);
        let mut params = CompatibilityParams::from_config(&SpeciationConfig::default());
        tune_coefficients(&mut params, 2.0, &config, &mut rng);
        assert!(params.excess > 1.0);
        for _ in 0..500 {
            tune_coefficients(&mut params, -1.0, &config, &mut rng);
        }
        assert_eq!(params.excess, config.min_coeff);
        let before = params.disjoint;
        tune_coefficients(&mut params, 0.0, &config, &mut rng);
        assert!((params.disjoint / before - 1.0).abs() <= config.rate / 2.0 + 1e-12);
    }

    #[test]
    fn test_stagnant_species_merged() {
        let mut config = SpeciationConfig::default();
        config.compatibility_threshold = 0.5;
        config.stagnation_generations = 2;
        let mut pop = population(20, 9, 4);
        let mut speciation = Speciation::new(&config);
        let mut cache = CompatibilityCache::new();
        let mut rng = EngineRng::new(0);
        for generation in 0..6 {
            cache.begin_generation(generation);
            speciation.speciate(&mut pop, &mut cache, &config, generation, &mut rng);
            let total: usize = speciation.species().iter().map(|s| s.len()).sum();
            assert_eq!(total, pop.len());
        }
        // Only the species holding the best score can outlive the window.
        assert_eq!(speciation.species().len(), 1);
    }

    #[test]
    fn test_very_old_species_penalized() {
        let mut config = SpeciationConfig::default();
        config.compatibility_threshold = 1000.0;
        config.age.very_old_age = 3;
        config.age.very_old_penalty = 0.5;
        let mut pop = population(6, 2, 1);
        let mut speciation = Speciation::new(&config);
        let mut cache = CompatibilityCache::new();
        let mut rng = EngineRng::new(0);
        speciation.speciate(&mut pop, &mut cache, &config, 0, &mut rng);
        assert_eq!(pop[4].score, Some(4.0));

        speciation.speciate(&mut pop, &mut cache, &config, 3, &mut rng);
        assert_eq!(pop[4].score, Some(4.0));

        speciation.speciate(&mut pop, &mut cache, &config, 4, &mut rng);
        for (i, member) in pop.iter().enumerate() {
            assert_eq!(member.score, Some(i as f64 * 0.5));
        }
    }

    #[test]
    fn test_turnover_counts_moved_members() {
        let mut config = SpeciationConfig::default();
        config.compatibility_threshold = 1000.0;
        let mut pop = population(10, 3, 2);
        let mut speciation = Speciation::new(&config);
        let mut cache = CompatibilityCache::new();
        let mut rng = EngineRng::new(0);
        speciation.speciate(&mut pop, &mut cache, &config, 0, &mut rng);
        assert_eq!(speciation.turnover(), 0.0);
        speciation.speciate(&mut pop, &mut cache, &config, 1, &mut rng);
        assert_eq!(speciation.turnover(), 0.0);

        // A tiny threshold splits everyone away from the shared species
        // except the representative.
        config.compatibility_threshold = 1e-9;
        speciation.threshold = 1e-9;
        cache.begin_generation(2);
        speciation.speciate(&mut pop, &mut cache, &config, 2, &mut rng);
        assert!(speciation.turnover() > 0.5);
    }
}
