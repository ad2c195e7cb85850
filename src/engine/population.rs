//! The generation loop.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info, trace, warn};

use super::NeatError;
use super::compat::CompatibilityCache;
use super::controllers::{
    ControlState, GenerationHook, HookContext, default_hooks, reject_below,
};
use super::diversity::{DiversitySampler, EntropyCache};
use super::lineage::{LineageTracker, UniquenessController, ancestor_uniqueness, apply_pressure};
use super::member::Member;
use super::novelty::{DescriptorFn, NoveltyArchive, blend_scores};
use super::objectives::{FITNESS_KEY, Objective, ObjectiveRegistry};
use super::operators::{OperatorConstraints, OperatorStats};
use super::pareto::{EpsilonController, hypervolume, rank_population};
use super::reproduce::Breeder;
use super::rng::{EngineRng, RngState};
use super::self_adaptive::adapt_mutation;
use super::sharing::share_fitness;
use super::species::{Species, Speciation};
use super::telemetry::{TelemetryRecorder, TelemetrySink};
use crate::network::{Genome, InnovationRegistry};
use crate::schema::{
    ComplexityStats, LineageStats, NeatConfig, ObjectiveImportance, PerformanceStats,
    TelemetryEntry,
};

/// Scores genomes. Closures `FnMut(&G) -> f64` implement it directly.
pub trait FitnessFunction<G> {
    fn evaluate(&mut self, genome: &G) -> f64;

    /// Score every member. Used when `population.batch_fitness` is set.
    fn evaluate_population(&mut self, population: &mut [Member<G>]) {
        for member in population.iter_mut() {
            member.score = Some(self.evaluate(&member.genome));
        }
    }
}

impl<G, F> FitnessFunction<G> for F
where
    F: FnMut(&G) -> f64,
{
    fn evaluate(&mut self, genome: &G) -> f64 {
        self(genome)
    }
}

/// Adapter for fitness functions that score a whole generation at once.
pub struct BatchFitness<F>(pub F);

impl<G, F> FitnessFunction<G> for BatchFitness<F>
where
    F: FnMut(&[&G]) -> Vec<f64>,
{
    fn evaluate(&mut self, genome: &G) -> f64 {
        (self.0)(&[genome]).first().copied().unwrap_or(0.0)
    }

    fn evaluate_population(&mut self, population: &mut [Member<G>]) {
        let genomes: Vec<&G> = population.iter().map(|m| &m.genome).collect();
        let scores = (self.0)(&genomes);
        for (member, score) in population.iter_mut().zip(scores) {
            member.score = Some(score);
        }
    }
}

/// Why [`Neat::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxGenerations,
    TargetReached,
}

/// Progress report passed to [`Neat::run_with_callback`].
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub generation: usize,
    pub best: f64,
    pub species: usize,
    pub threshold: f64,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunSummary<G> {
    pub best: Member<G>,
    pub generations: usize,
    pub stop_reason: StopReason,
}

/// Speciated multi-objective neuroevolution engine.
pub struct Neat<G: Genome> {
    pub(super) config: NeatConfig,
    pub(super) fitness: Box<dyn FitnessFunction<G>>,
    pub(super) rng: EngineRng,
    pub(super) innovations: InnovationRegistry,
    pub(super) population: Vec<Member<G>>,
    pub(super) next_id: u64,
    pub(super) generation: usize,
    speciation: Speciation<G>,
    compat_cache: CompatibilityCache,
    entropy_cache: EntropyCache,
    objectives: ObjectiveRegistry<G>,
    epsilon: EpsilonController,
    hooks: Vec<Box<dyn GenerationHook<G>>>,
    control: ControlState,
    operator_stats: OperatorStats,
    novelty: NoveltyArchive,
    descriptor: Option<DescriptorFn<G>>,
    lineage: LineageTracker,
    uniqueness: UniquenessController,
    lineage_strength: f64,
    telemetry: TelemetryRecorder,
    baseline: Option<G>,
    best_history: Vec<f64>,
    best_ever: f64,
    stagnation: usize,
}

impl<G: Genome> Neat<G> {
    /// Validate `config` and create a population of minimal genomes.
    pub fn new<F>(config: NeatConfig, fitness: F) -> Result<Self, NeatError>
    where
        F: FitnessFunction<G> + 'static,
    {
        config.validate()?;
        let rng = match config.population.seed {
            Some(seed) => EngineRng::new(seed),
            None => EngineRng::random(),
        };
        let mut neat = Self {
            fitness: Box::new(fitness),
            rng,
            innovations: InnovationRegistry::new(config.input, config.output),
            population: Vec::new(),
            next_id: 0,
            generation: 0,
            speciation: Speciation::new(&config.speciation),
            compat_cache: CompatibilityCache::new(),
            entropy_cache: EntropyCache::new(),
            objectives: ObjectiveRegistry::new(),
            epsilon: EpsilonController::new(config.multi_objective.dominance_epsilon),
            hooks: default_hooks(),
            control: ControlState::default(),
            operator_stats: OperatorStats::new(),
            novelty: NoveltyArchive::new(config.novelty.insertion_threshold),
            descriptor: None,
            lineage: LineageTracker::new(),
            uniqueness: UniquenessController::default(),
            lineage_strength: config.lineage.strength,
            telemetry: TelemetryRecorder::new(config.telemetry.max_entries),
            baseline: None,
            best_history: Vec::new(),
            best_ever: f64::NEG_INFINITY,
            stagnation: 0,
            config,
        };
        neat.population = neat.founders(neat.config.population.size);
        Ok(neat)
    }

    fn breeder(&mut self) -> Breeder<'_> {
        Breeder {
            config: &self.config,
            rng: &mut self.rng,
            innovations: &mut self.innovations,
            next_id: &mut self.next_id,
        }
    }

    fn founders(&mut self, count: usize) -> Vec<Member<G>> {
        let mut breeder = self.breeder();
        (0..count).map(|_| breeder.fresh()).collect()
    }

    /// Forget derived state after the population or options were replaced.
    pub(super) fn reset_derived_state(&mut self) {
        self.speciation = Speciation::new(&self.config.speciation);
        self.compat_cache.clear();
        self.entropy_cache = EntropyCache::new();
        self.objectives.invalidate();
        self.epsilon = EpsilonController::new(self.config.multi_objective.dominance_epsilon);
        self.hooks = default_hooks();
        self.control = ControlState::default();
        self.novelty = NoveltyArchive::new(self.config.novelty.insertion_threshold);
        self.lineage = LineageTracker::new();
        self.uniqueness = UniquenessController::default();
        self.lineage_strength = self.config.lineage.strength;
        self.operator_stats = OperatorStats::new();
        self.telemetry.set_capacity(self.config.telemetry.max_entries);
        self.best_ever = f64::NEG_INFINITY;
        self.stagnation = 0;
        self.next_id = self.population.iter().map(|m| m.id + 1).max().unwrap_or(0);
    }

    /// Run one generation and return the best member of the evaluated
    /// population by raw score.
    pub fn evolve(&mut self) -> Result<Member<G>, NeatError> {
        if self.population.is_empty() {
            return Err(NeatError::EmptyPopulation);
        }
        let started = Instant::now();
        let generation = self.generation;
        self.compat_cache.begin_generation(generation);
        self.entropy_cache.begin_generation(generation);

        // Evaluate.
        let eval_started = Instant::now();
        if self.config.population.batch_fitness {
            self.fitness.evaluate_population(&mut self.population);
        } else {
            for member in self.population.iter_mut() {
                member.score = Some(self.fitness.evaluate(&member.genome));
            }
        }
        let eval_ms = eval_started.elapsed().as_secs_f64() * 1000.0;
        for member in self.population.iter_mut() {
            if member.score.is_some_and(f64::is_nan) {
                warn!("Member {} scored NaN; treating as 0", member.id);
                member.score = Some(0.0);
            }
            member.traits.raw_score = member.score;
        }

        let best_idx = (0..self.population.len())
            .max_by(|&a, &b| {
                let (x, y) = (&self.population[a], &self.population[b]);
                x.traits
                    .raw_score
                    .unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&y.traits.raw_score.unwrap_or(f64::NEG_INFINITY))
                    .then(b.cmp(&a))
            })
            .ok_or(NeatError::EmptyPopulation)?;
        let best = self.population[best_idx].clone();
        let best_raw = best.traits.raw_score.unwrap_or(f64::NEG_INFINITY);
        self.best_history.push(best_raw);
        if best_raw > self.best_ever {
            self.best_ever = best_raw;
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }

        // Controllers.
        {
            let mut ctx = HookContext {
                generation,
                population: &mut self.population,
                best: best_raw,
                config: &self.config,
                control: &mut self.control,
            };
            for hook in self.hooks.iter_mut() {
                trace!("Generation {generation}: running {}", hook.name());
                hook.run(&mut ctx);
            }
        }

        // Novelty.
        if self.config.novelty.enabled
            && let Some(descriptor) = self.descriptor.as_ref()
        {
            let ids: Vec<u64> = self.population.iter().map(|m| m.id).collect();
            let descriptors: Vec<Vec<f64>> =
                self.population.iter().map(|m| descriptor(&m.genome)).collect();
            let novelty = self
                .novelty
                .update(&ids, &descriptors, generation, &self.config.novelty);
            blend_scores(&mut self.population, &novelty, self.config.novelty.blend_factor);
        }

        // Lineage pressure.
        for member in &self.population {
            self.lineage.record(member, generation);
        }
        apply_pressure(
            &mut self.population,
            &self.lineage,
            &self.config.lineage,
            self.lineage_strength,
        );

        // Rejected members stay at zero whatever novelty or lineage added.
        if let Some(threshold) = self.control.mc_threshold {
            reject_below(&mut self.population, threshold);
        }

        // Speciation and sharing.
        if self.config.speciation.enabled {
            self.speciation.speciate(
                &mut self.population,
                &mut self.compat_cache,
                &self.config.speciation,
                generation,
                &mut self.rng,
            );
            share_fitness(
                &mut self.population,
                self.speciation.species(),
                self.config.speciation.sharing_sigma,
                &mut self.compat_cache,
                self.speciation.params(),
            );
        }

        // Ranking.
        let mut fronts = None;
        let mut hv = None;
        let mut importance = Default::default();
        let order: Vec<usize> = if self.config.multi_objective.enabled {
            let mo = &self.config.multi_objective;
            self.objectives.refresh(generation, self.stagnation, mo);
            let values = self.objectives.values(&self.population, &mut self.entropy_cache);
            let directions = self.objectives.directions();
            importance = self.objectives.importance(&values);
            self.objectives.track_inactive(&values, &mo.prune_inactive);
            let outcome = rank_population(
                &mut self.population,
                &values,
                &directions,
                self.epsilon.epsilon(),
            );
            let front0 = outcome.front_sizes.first().copied().unwrap_or(0);
            self.epsilon
                .step(front0, self.population.len(), generation, &mo.adaptive_epsilon);
            if self.config.telemetry.hypervolume {
                hv = Some(hypervolume(&outcome.first_front, &values, &directions));
            }
            fronts = Some(outcome.front_sizes);
            (0..self.population.len()).collect()
        } else {
            let mut order: Vec<usize> = (0..self.population.len()).collect();
            order.sort_by(|&a, &b| {
                self.population[b]
                    .fitness()
                    .total_cmp(&self.population[a].fitness())
                    .then(a.cmp(&b))
            });
            order
        };

        // Ancestor uniqueness feedback.
        let uniqueness = if self.config.telemetry.enabled || self.config.ancestor_uniqueness.enabled
        {
            ancestor_uniqueness(
                &self.population,
                &self.lineage,
                self.config.lineage.ancestor_window,
                self.config.telemetry.diversity_pairs,
                &mut self.rng,
            )
        } else {
            0.0
        };
        let mut epsilon = self.epsilon.epsilon();
        if self.uniqueness.step(
            uniqueness,
            generation,
            &self.config.ancestor_uniqueness,
            &mut epsilon,
            &mut self.lineage_strength,
        ) {
            self.epsilon.set(epsilon);
        }

        // Telemetry snapshot of the scored generation.
        let diversity = if self.config.telemetry.enabled {
            let mut sampler = DiversitySampler {
                cache: &mut self.compat_cache,
                params: self.speciation.params(),
                entropy: &mut self.entropy_cache,
                rng: &mut self.rng,
                pairs: self.config.telemetry.diversity_pairs,
                motif_samples: self.config.telemetry.motif_samples,
            };
            let mut stats = sampler.sample(&mut self.population);
            stats.species_turnover = self.speciation.turnover();
            Some(stats)
        } else {
            None
        };
        let complexity = (self.config.telemetry.enabled && self.config.telemetry.complexity)
            .then(|| self.complexity_stats());

        // Self-adaptive traits move on the scored generation; offspring
        // inherit them from the fitter parent.
        adapt_mutation(
            &mut self.population,
            &self.config.adaptive_mutation,
            self.config.mutation.rate,
            self.config.mutation.amount,
            generation,
            &mut self.rng,
        );

        // Reproduction.
        let constraints = self.operator_constraints();
        let size = self.config.population.size;
        let previous = std::mem::take(&mut self.population);

        // Global stagnation: the lowest-ranked non-elites leave the parent
        // pool and fresh founders take their slots.
        let mut injected = 0;
        if let Some(limit) = self.config.population.global_stagnation_generations
            && limit > 0
            && self.stagnation >= limit
        {
            let planned_elites = self.config.population.elitism.min(size).min(order.len());
            let open = size - planned_elites;
            injected = ((self.config.population.stagnation_replace_fraction * open as f64).ceil()
                as usize)
                .min(open);
            info!(
                "Global stagnation for {} generations: replacing {} members",
                self.stagnation, injected
            );
            self.stagnation = 0;
        }
        let (parents, parent_order) = if injected > 0 {
            let cut = order.len().saturating_sub(injected).max(
                self.config.population.elitism.min(order.len()),
            );
            let mut doomed = vec![false; previous.len()];
            for &i in &order[cut..] {
                doomed[i] = true;
            }
            let mut remap = vec![0; previous.len()];
            let mut kept = Vec::with_capacity(previous.len());
            for (i, member) in previous.iter().enumerate() {
                if !doomed[i] {
                    remap[i] = kept.len();
                    kept.push(member.clone());
                }
            }
            let kept_order: Vec<usize> = order[..cut].iter().map(|&i| remap[i]).collect();
            (Some(kept), kept_order)
        } else {
            (None, order)
        };

        let mut breeder = Breeder {
            config: &self.config,
            rng: &mut self.rng,
            innovations: &mut self.innovations,
            next_id: &mut self.next_id,
        };
        let mut offspring = breeder.next_generation(
            parents.as_deref().unwrap_or(&previous[..]),
            &parent_order,
            self.speciation.species(),
            generation,
            self.baseline.as_ref(),
            injected,
        );
        let elites = offspring.elites;

        let mut changed = Vec::new();
        for (i, member) in offspring.members.iter_mut().enumerate() {
            let mut touched = breeder.repair(&mut member.genome);
            if i >= elites {
                touched |= breeder.prune(&mut member.genome, generation);
                touched |= breeder.mutate(member, &mut self.operator_stats, &constraints);
            }
            if touched {
                changed.push(member.id);
            }
        }
        for id in changed {
            self.compat_cache.invalidate(id);
            self.entropy_cache.invalidate(id);
        }

        if self.config.operator_adaptation.enabled {
            self.operator_stats.decay(self.config.operator_adaptation.decay);
        }

        let alive: BTreeSet<u64> = offspring.members.iter().map(|m| m.id).collect();
        self.lineage
            .prune(generation, self.config.lineage.ancestor_window + 1, &alive);

        if let Some(diversity) = diversity {
            let objectives = if self.config.multi_objective.enabled {
                self.objectives.keys().to_vec()
            } else {
                vec![FITNESS_KEY.to_string()]
            };
            let mean_depth = if previous.is_empty() {
                0.0
            } else {
                previous.iter().map(|m| m.depth as f64).sum::<f64>() / previous.len() as f64
            };
            let entry = TelemetryEntry {
                generation,
                best: best_raw,
                species: self.speciation.species().len(),
                threshold: self.speciation.threshold(),
                epsilon: self.epsilon.epsilon(),
                diversity,
                ops: self.operator_stats.snapshot(),
                objectives,
                species_alloc: offspring.allocations.clone(),
                obj_ages: self.objectives.ages().clone(),
                obj_events: self.objectives.events().to_vec(),
                obj_importance: importance,
                fronts,
                hypervolume: hv,
                phase: self.control.phase,
                lineage: LineageStats {
                    parents: best.parents.clone(),
                    depth_best: best.depth,
                    mean_depth,
                    inbreeding: offspring.inbreeding,
                    ancestor_uniq: uniqueness,
                },
                complexity,
                perf: self.config.telemetry.performance.then(|| PerformanceStats {
                    eval_ms,
                    evolve_ms: started.elapsed().as_secs_f64() * 1000.0,
                }),
            };
            self.telemetry.record(entry);
        }

        self.population = offspring.members;
        debug_assert_eq!(self.population.len(), size);
        self.generation += 1;

        info!(
            "Generation {}: best {:.4}, {} species, threshold {:.3}",
            generation,
            best_raw,
            self.speciation.species().len(),
            self.speciation.threshold()
        );
        Ok(best)
    }

    fn operator_constraints(&self) -> OperatorConstraints {
        let cap = |budget: Option<usize>, limit: Option<usize>| match (budget, limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        OperatorConstraints {
            node_cap: cap(self.control.node_cap, self.config.limits.max_nodes),
            connection_cap: cap(self.control.connection_cap, self.config.limits.max_connections),
            phase: self.control.phase,
            phase_bias: self.config.phased_complexity.bias,
        }
    }

    fn complexity_stats(&self) -> ComplexityStats {
        let n = self.population.len().max(1) as f64;
        let nodes: Vec<usize> = self.population.iter().map(|m| m.genome.node_count()).collect();
        let conns: Vec<usize> = self
            .population
            .iter()
            .map(|m| m.genome.connection_count())
            .collect();
        let enabled_ratio: f64 = self
            .population
            .iter()
            .map(|m| {
                let total = m.genome.connection_count();
                if total == 0 {
                    1.0
                } else {
                    m.genome.enabled_connection_count() as f64 / total as f64
                }
            })
            .sum();
        ComplexityStats {
            mean_nodes: nodes.iter().sum::<usize>() as f64 / n,
            mean_conns: conns.iter().sum::<usize>() as f64 / n,
            max_nodes: nodes.iter().copied().max().unwrap_or(0),
            max_conns: conns.iter().copied().max().unwrap_or(0),
            mean_enabled_ratio: enabled_ratio / n,
            budget_max_nodes: self.control.node_cap,
            budget_max_conns: self.control.connection_cap,
        }
    }

    /// Evolve until `max_generations` or until the best raw score reaches
    /// `target`.
    pub fn run(
        &mut self,
        max_generations: usize,
        target: Option<f64>,
    ) -> Result<RunSummary<G>, NeatError> {
        self.run_with_callback(max_generations, target, |_| {})
    }

    pub fn run_with_callback<F>(
        &mut self,
        max_generations: usize,
        target: Option<f64>,
        mut callback: F,
    ) -> Result<RunSummary<G>, NeatError>
    where
        F: FnMut(&RunProgress),
    {
        let mut overall: Option<Member<G>> = None;
        let mut generations = 0;
        let mut stop_reason = StopReason::MaxGenerations;
        for _ in 0..max_generations.max(1) {
            let best = self.evolve()?;
            generations += 1;
            let raw = best.traits.raw_score.unwrap_or(f64::NEG_INFINITY);
            callback(&RunProgress {
                generation: self.generation - 1,
                best: raw,
                species: self.speciation.species().len(),
                threshold: self.speciation.threshold(),
            });
            let improved = overall
                .as_ref()
                .is_none_or(|o| raw > o.traits.raw_score.unwrap_or(f64::NEG_INFINITY));
            if improved {
                overall = Some(best);
            }
            if target.is_some_and(|t| raw >= t) {
                stop_reason = StopReason::TargetReached;
                break;
            }
        }
        let best = overall.ok_or(NeatError::EmptyPopulation)?;
        debug!("Run finished after {generations} generations: {stop_reason:?}");
        Ok(RunSummary {
            best,
            generations,
            stop_reason,
        })
    }

    /// Add a user objective; takes effect at the next ranking.
    pub fn register_objective(&mut self, objective: Objective<G>) {
        self.objectives.register(objective);
    }

    pub fn clear_custom_objectives(&mut self) {
        self.objectives.clear_custom();
    }

    /// Genome cloned by provenance slots instead of fresh minimal genomes.
    pub fn set_baseline(&mut self, genome: Option<G>) {
        self.baseline = genome;
    }

    pub fn set_novelty_descriptor<F>(&mut self, descriptor: F)
    where
        F: Fn(&G) -> Vec<f64> + Send + Sync + 'static,
    {
        self.descriptor = Some(Box::new(descriptor));
    }

    pub fn set_telemetry_sink(&mut self, sink: Option<TelemetrySink>) {
        self.telemetry.set_sink(sink);
    }

    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    pub fn population(&self) -> &[Member<G>] {
        &self.population
    }

    pub fn species(&self) -> &[Species<G>] {
        self.speciation.species()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn compatibility_threshold(&self) -> f64 {
        self.speciation.threshold()
    }

    /// Exponential moving average of the species count.
    pub fn smoothed_species_count(&self) -> Option<f64> {
        self.speciation.smoothed_count()
    }

    pub fn dominance_epsilon(&self) -> f64 {
        self.epsilon.epsilon()
    }

    pub fn objective_keys(&self) -> &[String] {
        self.objectives.keys()
    }

    pub fn objective_importance(&self) -> Option<&BTreeMap<String, ObjectiveImportance>> {
        self.telemetry.latest().map(|e| &e.obj_importance)
    }

    pub fn is_objective_pruned(&self, key: &str) -> bool {
        self.objectives.is_pruned(key)
    }

    /// Best raw score of each evaluated generation.
    pub fn best_history(&self) -> &[f64] {
        &self.best_history
    }

    pub fn novelty_archive(&self) -> &NoveltyArchive {
        &self.novelty
    }

    pub fn operator_stats(&self) -> &OperatorStats {
        &self.operator_stats
    }

    /// Fraction of members that changed species in the last speciation.
    pub fn species_turnover(&self) -> f64 {
        self.speciation.turnover()
    }

    pub fn control_state(&self) -> &ControlState {
        &self.control
    }

    pub fn rng_snapshot(&self) -> RngState {
        self.rng.snapshot()
    }

    pub fn restore_rng(&mut self, state: &RngState) {
        self.rng.restore(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Direction;
    use crate::network::Network;
    use crate::schema::ComplexityMetric;

    const XOR: [([f64; 2], f64); 4] = [
        ([0.0, 0.0], 0.0),
        ([0.0, 1.0], 1.0),
        ([1.0, 0.0], 1.0),
        ([1.0, 1.0], 0.0),
    ];

    fn xor_fitness(net: &Network) -> f64 {
        let error: f64 = XOR
            .iter()
            .map(|(input, expected)| {
                let out = net.activate(input)[0];
                (out - expected).powi(2)
            })
            .sum();
        4.0 - error
    }

    fn config(size: usize, seed: u64) -> NeatConfig {
        let mut config = NeatConfig::new(2, 1);
        config.population.size = size;
        config.population.seed = Some(seed);
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(4, 0);
        bad.population.selection = crate::schema::SelectionMethod::Tournament {
            size: 10,
            probability: 1.0,
        };
        assert!(matches!(
            Neat::<Network>::new(bad, xor_fitness),
            Err(NeatError::Config(_))
        ));
    }

    #[test]
    fn test_population_size_invariant() {
        let mut neat = Neat::<Network>::new(config(20, 1), xor_fitness).unwrap();
        for _ in 0..8 {
            neat.evolve().unwrap();
            assert_eq!(neat.population().len(), 20);
            let species_total: usize = neat.species().iter().map(|s| s.len()).sum();
            assert_eq!(species_total, 20);
        }
        assert_eq!(neat.generation(), 8);
        assert_eq!(neat.best_history().len(), 8);
        assert_eq!(neat.telemetry().len(), 8);
        let turnover = neat.telemetry().latest().unwrap().diversity.species_turnover;
        assert_eq!(turnover, neat.species_turnover());
        assert!((0.0..=1.0).contains(&turnover));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let run = |seed| {
            let mut neat = Neat::<Network>::new(config(16, seed), xor_fitness).unwrap();
            (0..6).map(|_| neat.evolve().unwrap().fitness()).collect::<Vec<f64>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_lineage_depth_grows() {
        let mut neat = Neat::<Network>::new(config(12, 2), xor_fitness).unwrap();
        for _ in 0..3 {
            neat.evolve().unwrap();
        }
        for member in neat.population() {
            assert!(member.parents.len() <= 2);
        }
        assert!(neat.population().iter().any(|m| m.depth > 0));
    }

    #[test]
    fn test_threshold_controller_tracks_target() {
        let mut config = config(50, 11);
        config.speciation.target_species = Some(8);
        config.speciation.controller.max_threshold = 30.0;
        let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap();
        let mut trailing = Vec::new();
        for generation in 0..60 {
            neat.evolve().unwrap();
            if generation >= 40 {
                trailing.push(neat.smoothed_species_count().unwrap());
            }
        }
        let worst = trailing
            .iter()
            .map(|ema| (ema - 8.0).abs())
            .fold(0.0, f64::max);
        assert!(worst <= 3.0, "species count EMA left the band: {trailing:?}");
    }

    #[test]
    fn test_inactive_objective_pruned() {
        let mut config = config(20, 5);
        config.multi_objective.enabled = true;
        config.multi_objective.prune_inactive.enabled = true;
        config.multi_objective.prune_inactive.window = 3;
        config.multi_objective.prune_inactive.protect =
            vec![FITNESS_KEY.to_string(), "anchor".to_string()];
        let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap();
        neat.register_objective(Objective::custom("flat", Direction::Maximize, |_| 1.0));
        neat.register_objective(Objective::custom("anchor", Direction::Maximize, |_| 1.0));
        neat.evolve().unwrap();
        neat.evolve().unwrap();
        assert!(neat.objective_keys().iter().any(|k| k == "flat"));
        neat.evolve().unwrap();
        assert!(neat.is_objective_pruned("flat"));
        assert!(!neat.objective_keys().iter().any(|k| k == "flat"));
        assert!(neat.objective_keys().iter().any(|k| k == "anchor"));
        assert!(neat.objective_keys().iter().any(|k| k == FITNESS_KEY));
    }

    #[test]
    fn test_global_stagnation_injects_fresh_genomes() {
        let mut config = config(10, 9);
        config.population.global_stagnation_generations = Some(2);
        config.population.stagnation_replace_fraction = 0.5;
        config.population.elitism = 2;
        config.speciation.enabled = false;
        // Scores follow population position, so the best never improves and
        // the first four slots are always ranked lowest.
        let mut calls = 0usize;
        let fitness = move |_: &Network| {
            let score = (calls % 10) as f64;
            calls += 1;
            score
        };
        let mut neat = Neat::<Network>::new(config, fitness).unwrap();
        neat.evolve().unwrap();
        neat.evolve().unwrap();
        let worst: Vec<u64> = neat.population()[..4].iter().map(|m| m.id).collect();
        neat.evolve().unwrap();

        let population = neat.population();
        assert_eq!(population.len(), 10);
        for member in &population[2..6] {
            assert!(member.parents.is_empty());
            assert_eq!(member.depth, 0);
        }
        for member in population {
            assert!(!worst.contains(&member.id));
            assert!(member.parents.iter().all(|p| !worst.contains(p)));
        }
    }

    #[test]
    fn test_minimal_criterion_survives_novelty_and_lineage() {
        let mut config = config(10, 12);
        config.population.elitism = 10;
        config.speciation.enabled = false;
        config.minimal_criterion.enabled = true;
        config.minimal_criterion.initial_threshold = Some(1e9);
        config.novelty.enabled = true;
        config.novelty.blend_factor = 0.5;
        config.lineage.pressure = Some(crate::schema::LineagePressure::RewardShallow);
        config.lineage.strength = 1.0;
        let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap();
        neat.set_novelty_descriptor(|net: &Network| net.activate(&[1.0, 0.0]));
        neat.evolve().unwrap();
        for member in neat.population() {
            assert_eq!(member.score, Some(0.0));
        }
    }

    #[test]
    fn test_multi_objective_telemetry() {
        let mut config = config(16, 3);
        config.multi_objective.enabled = true;
        config.multi_objective.complexity = Some(ComplexityMetric::Connections);
        let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap();
        neat.evolve().unwrap();
        let entry = neat.telemetry().latest().unwrap();
        let fronts = entry.fronts.as_ref().unwrap();
        assert_eq!(fronts.iter().sum::<usize>(), 16);
        assert!(entry.hypervolume.is_some());
        assert_eq!(entry.objectives, vec!["fitness", "complexity"]);
        assert_eq!(entry.obj_events.len(), 2);
    }

    #[test]
    fn test_batch_fitness_and_run_loop() {
        let mut config = config(10, 4);
        config.population.batch_fitness = true;
        let batch = BatchFitness(|genomes: &[&Network]| {
            genomes.iter().map(|g| g.connection_count() as f64).collect()
        });
        let mut neat = Neat::<Network>::new(config, batch).unwrap();
        let mut calls = 0;
        let summary = neat
            .run_with_callback(5, Some(f64::INFINITY), |_| calls += 1)
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::MaxGenerations);
        assert_eq!(summary.generations, 5);
        assert_eq!(calls, 5);

        let summary = neat.run(50, Some(0.0)).unwrap();
        assert_eq!(summary.stop_reason, StopReason::TargetReached);
        assert_eq!(summary.generations, 1);
    }

    #[test]
    fn test_novelty_blend_sets_traits() {
        let mut config = config(10, 6);
        config.novelty.enabled = true;
        let mut neat = Neat::<Network>::new(config, xor_fitness).unwrap();
        neat.set_novelty_descriptor(|net: &Network| net.activate(&[1.0, 0.0]));
        neat.evolve().unwrap();
        assert!(!neat.novelty_archive().is_empty() || neat.novelty_archive().threshold() > 0.0);
    }
}
