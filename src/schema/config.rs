//! Configuration types for the evolutionary engine.
//!
//! Every section deserializes from a partial JSON object; missing fields take
//! the same values as the `Default` impls.

use serde::{Deserialize, Serialize};

use crate::network::{MutationOp, PruneMethod};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    /// Number of network inputs.
    pub input: usize,
    /// Number of network outputs.
    pub output: usize,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub speciation: SpeciationConfig,
    #[serde(default)]
    pub multi_objective: MultiObjectiveConfig,
    #[serde(default)]
    pub complexity_budget: ComplexityBudgetConfig,
    #[serde(default)]
    pub phased_complexity: PhasedComplexityConfig,
    #[serde(default)]
    pub minimal_criterion: MinimalCriterionConfig,
    #[serde(default)]
    pub adaptive_mutation: AdaptiveMutationConfig,
    #[serde(default)]
    pub operator_adaptation: OperatorAdaptationConfig,
    #[serde(default)]
    pub operator_bandit: OperatorBanditConfig,
    #[serde(default)]
    pub novelty: NoveltyConfig,
    #[serde(default)]
    pub lineage: LineageConfig,
    #[serde(default)]
    pub ancestor_uniqueness: AncestorUniquenessConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl NeatConfig {
    /// Defaults for a network of the given shape.
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input,
            output,
            ..Default::default()
        }
    }
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            input: 2,
            output: 1,
            population: PopulationConfig::default(),
            mutation: MutationConfig::default(),
            speciation: SpeciationConfig::default(),
            multi_objective: MultiObjectiveConfig::default(),
            complexity_budget: ComplexityBudgetConfig::default(),
            phased_complexity: PhasedComplexityConfig::default(),
            minimal_criterion: MinimalCriterionConfig::default(),
            adaptive_mutation: AdaptiveMutationConfig::default(),
            operator_adaptation: OperatorAdaptationConfig::default(),
            operator_bandit: OperatorBanditConfig::default(),
            novelty: NoveltyConfig::default(),
            lineage: LineageConfig::default(),
            ancestor_uniqueness: AncestorUniquenessConfig::default(),
            pruning: PruningConfig::default(),
            telemetry: TelemetryConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

// ============================================================================
// Population & reproduction
// ============================================================================

/// Population and reproduction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of genomes per generation.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Best genomes copied unchanged into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Clones of the baseline genome (or fresh genomes) injected each generation.
    #[serde(default)]
    pub provenance: usize,
    /// Fraction of each species eligible to breed.
    #[serde(default = "default_survival_threshold")]
    pub survival_threshold: f64,
    /// Probability that an offspring comes from crossover rather than cloning.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Parent selection when speciation is disabled.
    #[serde(default)]
    pub selection: SelectionMethod,
    /// Crossover inherits the union of both parents' genes.
    #[serde(default)]
    pub prefer_equal_length_genes: bool,
    /// Hand the whole population to the fitness function at once.
    #[serde(default)]
    pub batch_fitness: bool,
    /// Minimum number of hidden nodes enforced by structural repair.
    #[serde(default)]
    pub min_hidden: usize,
    /// Generations without best-score improvement before injecting fresh genomes.
    #[serde(default)]
    pub global_stagnation_generations: Option<usize>,
    /// Fraction of non-elite genomes replaced on global stagnation.
    #[serde(default = "default_stagnation_replace_fraction")]
    pub stagnation_replace_fraction: f64,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            elitism: default_elitism(),
            provenance: 0,
            survival_threshold: default_survival_threshold(),
            crossover_rate: default_crossover_rate(),
            selection: SelectionMethod::default(),
            prefer_equal_length_genes: false,
            batch_fitness: false,
            min_hidden: 0,
            global_stagnation_generations: None,
            stagnation_replace_fraction: default_stagnation_replace_fraction(),
            seed: None,
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_elitism() -> usize {
    1
}
fn default_survival_threshold() -> f64 {
    0.5
}
fn default_crossover_rate() -> f64 {
    0.75
}
fn default_stagnation_replace_fraction() -> f64 {
    0.2
}

/// Parent selection method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method")]
pub enum SelectionMethod {
    /// Tournament selection. Entrants are ranked and the k-th best wins
    /// with probability `p * (1 - p)^k`; `probability = 1` always takes the best.
    Tournament {
        #[serde(default = "default_tournament_size")]
        size: usize,
        #[serde(default = "default_tournament_probability")]
        probability: f64,
    },
    /// Fitness proportionate (roulette wheel), scores shifted to be positive.
    FitnessProportionate,
    /// Rank-biased pick: `index = floor(u^exponent * n)` over the sorted population.
    Power {
        #[serde(default = "default_power_exponent")]
        exponent: f64,
    },
}

impl Default for SelectionMethod {
    fn default() -> Self {
        Self::Tournament {
            size: default_tournament_size(),
            probability: default_tournament_probability(),
        }
    }
}

fn default_tournament_size() -> usize {
    3
}
fn default_tournament_probability() -> f64 {
    1.0
}
fn default_power_exponent() -> f64 {
    4.0
}

/// Mutation scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Probability that an offspring is mutated.
    #[serde(default = "default_mutation_rate")]
    pub rate: f64,
    /// Operators applied per mutated offspring.
    #[serde(default = "default_mutation_amount")]
    pub amount: f64,
    /// Operator pool.
    #[serde(default = "default_operators")]
    pub operators: Vec<MutationOp>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rate: default_mutation_rate(),
            amount: default_mutation_amount(),
            operators: default_operators(),
        }
    }
}

fn default_mutation_rate() -> f64 {
    0.7
}
fn default_mutation_amount() -> f64 {
    1.0
}
fn default_operators() -> Vec<MutationOp> {
    MutationOp::ALL.to_vec()
}

/// Structural limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub max_connections: Option<usize>,
    /// Keep networks feed-forward.
    #[serde(default = "default_true")]
    pub acyclic: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_nodes: None,
            max_connections: None,
            acyclic: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Speciation
// ============================================================================

/// Speciation and compatibility settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_compatibility_threshold")]
    pub compatibility_threshold: f64,
    #[serde(default = "default_excess_coeff")]
    pub excess_coeff: f64,
    #[serde(default = "default_disjoint_coeff")]
    pub disjoint_coeff: f64,
    #[serde(default = "default_weight_coeff")]
    pub weight_coeff: f64,
    /// Genomes with fewer genes than this are not length-normalized.
    #[serde(default = "default_normalize_threshold")]
    pub normalize_threshold: usize,
    /// Desired species count; enables the threshold controller.
    #[serde(default)]
    pub target_species: Option<usize>,
    #[serde(default)]
    pub controller: ThresholdControllerConfig,
    #[serde(default)]
    pub auto_tune: CoefficientTuneConfig,
    /// Species without improvement for this many generations are dropped.
    #[serde(default = "default_species_stagnation")]
    pub stagnation_generations: usize,
    #[serde(default)]
    pub age: SpeciesAgeConfig,
    /// Kernel radius for fitness sharing; 0 means divide by species size.
    #[serde(default)]
    pub sharing_sigma: f64,
    /// Probability the second parent comes from another species.
    #[serde(default = "default_interspecies_mating_rate")]
    pub interspecies_mating_rate: f64,
    /// Offspring guaranteed to each surviving species when capacity allows.
    #[serde(default = "default_min_offspring")]
    pub min_offspring: usize,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compatibility_threshold: default_compatibility_threshold(),
            excess_coeff: default_excess_coeff(),
            disjoint_coeff: default_disjoint_coeff(),
            weight_coeff: default_weight_coeff(),
            normalize_threshold: default_normalize_threshold(),
            target_species: None,
            controller: ThresholdControllerConfig::default(),
            auto_tune: CoefficientTuneConfig::default(),
            stagnation_generations: default_species_stagnation(),
            age: SpeciesAgeConfig::default(),
            sharing_sigma: 0.0,
            interspecies_mating_rate: default_interspecies_mating_rate(),
            min_offspring: default_min_offspring(),
        }
    }
}

fn default_compatibility_threshold() -> f64 {
    3.0
}
fn default_excess_coeff() -> f64 {
    1.0
}
fn default_disjoint_coeff() -> f64 {
    1.0
}
fn default_weight_coeff() -> f64 {
    0.4
}
fn default_normalize_threshold() -> usize {
    20
}
fn default_species_stagnation() -> usize {
    15
}
fn default_interspecies_mating_rate() -> f64 {
    0.001
}
fn default_min_offspring() -> usize {
    1
}

/// PI controller steering the compatibility threshold toward the target species count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdControllerConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    /// Geometric decay applied to the integral term each step.
    #[serde(default = "default_integral_decay")]
    pub integral_decay: f64,
    /// Weight of the previous value in the species-count moving average.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f64,
    #[serde(default = "default_max_threshold")]
    pub max_threshold: f64,
}

impl Default for ThresholdControllerConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            integral_decay: default_integral_decay(),
            smoothing: default_smoothing(),
            min_threshold: default_min_threshold(),
            max_threshold: default_max_threshold(),
        }
    }
}

fn default_kp() -> f64 {
    0.3
}
fn default_ki() -> f64 {
    0.02
}
fn default_integral_decay() -> f64 {
    0.95
}
fn default_smoothing() -> f64 {
    0.5
}
fn default_min_threshold() -> f64 {
    0.5
}
fn default_max_threshold() -> f64 {
    10.0
}

/// Multiplicative tuning of the excess/disjoint coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientTuneConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tune_rate")]
    pub rate: f64,
    #[serde(default = "default_coeff_min")]
    pub min_coeff: f64,
    #[serde(default = "default_coeff_max")]
    pub max_coeff: f64,
}

impl Default for CoefficientTuneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: default_tune_rate(),
            min_coeff: default_coeff_min(),
            max_coeff: default_coeff_max(),
        }
    }
}

fn default_tune_rate() -> f64 {
    0.05
}
fn default_coeff_min() -> f64 {
    0.1
}
fn default_coeff_max() -> f64 {
    5.0
}

/// Age-based species adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesAgeConfig {
    #[serde(default = "default_young_threshold")]
    pub young_threshold: usize,
    #[serde(default = "default_young_multiplier")]
    pub young_multiplier: f64,
    #[serde(default = "default_old_threshold")]
    pub old_threshold: usize,
    #[serde(default = "default_old_multiplier")]
    pub old_multiplier: f64,
    /// Species older than this have member scores scaled by `very_old_penalty`.
    #[serde(default = "default_very_old_age")]
    pub very_old_age: usize,
    #[serde(default = "default_very_old_penalty")]
    pub very_old_penalty: f64,
}

impl Default for SpeciesAgeConfig {
    fn default() -> Self {
        Self {
            young_threshold: default_young_threshold(),
            young_multiplier: default_young_multiplier(),
            old_threshold: default_old_threshold(),
            old_multiplier: default_old_multiplier(),
            very_old_age: default_very_old_age(),
            very_old_penalty: default_very_old_penalty(),
        }
    }
}

fn default_young_threshold() -> usize {
    5
}
fn default_young_multiplier() -> f64 {
    1.2
}
fn default_old_threshold() -> usize {
    30
}
fn default_old_multiplier() -> f64 {
    0.7
}
fn default_very_old_age() -> usize {
    60
}
fn default_very_old_penalty() -> f64 {
    0.9
}

// ============================================================================
// Multi-objective ranking
// ============================================================================

/// Multi-objective (Pareto) ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiObjectiveConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Add a complexity-minimization objective.
    #[serde(default)]
    pub complexity: Option<ComplexityMetric>,
    /// Add a structural-entropy-maximization objective.
    #[serde(default)]
    pub entropy: bool,
    /// Leave the fitness objective out of the active set.
    #[serde(default)]
    pub suppress_fitness: bool,
    #[serde(default)]
    pub dominance_epsilon: f64,
    #[serde(default)]
    pub adaptive_epsilon: AdaptiveEpsilonConfig,
    #[serde(default)]
    pub prune_inactive: PruneInactiveConfig,
    #[serde(default)]
    pub dynamic: DynamicObjectivesConfig,
}

impl Default for MultiObjectiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            complexity: None,
            entropy: false,
            suppress_fitness: false,
            dominance_epsilon: 0.0,
            adaptive_epsilon: AdaptiveEpsilonConfig::default(),
            prune_inactive: PruneInactiveConfig::default(),
            dynamic: DynamicObjectivesConfig::default(),
        }
    }
}

/// What the complexity objective counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ComplexityMetric {
    Nodes,
    Connections,
    #[default]
    Both,
}

/// Steers dominance epsilon toward a target front-0 size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveEpsilonConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Desired front-0 size as a fraction of the population.
    #[serde(default = "default_target_front0")]
    pub target_front0_fraction: f64,
    #[serde(default = "default_epsilon_adjust")]
    pub adjust: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_epsilon_max")]
    pub max: f64,
    #[serde(default = "default_epsilon_cooldown")]
    pub cooldown: usize,
}

impl Default for AdaptiveEpsilonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_front0_fraction: default_target_front0(),
            adjust: default_epsilon_adjust(),
            min: 0.0,
            max: default_epsilon_max(),
            cooldown: default_epsilon_cooldown(),
        }
    }
}

fn default_target_front0() -> f64 {
    0.25
}
fn default_epsilon_adjust() -> f64 {
    0.002
}
fn default_epsilon_max() -> f64 {
    0.5
}
fn default_epsilon_cooldown() -> usize {
    2
}

/// Removal of objectives whose values stopped varying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneInactiveConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Consecutive stale generations before removal.
    #[serde(default = "default_prune_window")]
    pub window: usize,
    /// Value range below which an objective counts as stale.
    #[serde(default = "default_range_eps")]
    pub range_eps: f64,
    /// Objective keys never pruned.
    #[serde(default = "default_protected")]
    pub protect: Vec<String>,
}

impl Default for PruneInactiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: default_prune_window(),
            range_eps: default_range_eps(),
            protect: default_protected(),
        }
    }
}

fn default_prune_window() -> usize {
    5
}
fn default_range_eps() -> f64 {
    1e-6
}
fn default_protected() -> Vec<String> {
    vec!["fitness".to_string(), "complexity".to_string()]
}

/// Generation-scheduled objective activation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DynamicObjectivesConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Generation at which the complexity objective joins.
    #[serde(default)]
    pub add_complexity_at: usize,
    /// Generation at which the entropy objective joins.
    #[serde(default)]
    pub add_entropy_at: usize,
    /// Drop entropy after this many generations without improvement.
    #[serde(default)]
    pub drop_entropy_on_stagnation: Option<usize>,
    /// Generations after a drop before entropy may rejoin.
    #[serde(default)]
    pub readd_entropy_after: usize,
}

// ============================================================================
// Adaptive controllers
// ============================================================================

/// Node/connection caps that follow search progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityBudgetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: BudgetMode,
    #[serde(default = "default_node_budget")]
    pub nodes: BudgetBounds,
    #[serde(default = "default_connection_budget")]
    pub connections: BudgetBounds,
    /// Generations over which linear mode ramps from start to max.
    #[serde(default = "default_budget_horizon")]
    pub horizon: usize,
    /// Best-score window for the slope estimate.
    #[serde(default = "default_budget_window")]
    pub window: usize,
    #[serde(default = "default_budget_increase")]
    pub increase: f64,
    #[serde(default = "default_budget_decrease")]
    pub decrease: f64,
}

impl Default for ComplexityBudgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: BudgetMode::default(),
            nodes: default_node_budget(),
            connections: default_connection_budget(),
            horizon: default_budget_horizon(),
            window: default_budget_window(),
            increase: default_budget_increase(),
            decrease: default_budget_decrease(),
        }
    }
}

/// Budget schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BudgetMode {
    #[default]
    Adaptive,
    Linear,
}

/// Start value and clamps of one budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetBounds {
    pub start: f64,
    pub min: f64,
    pub max: f64,
}

fn default_node_budget() -> BudgetBounds {
    BudgetBounds {
        start: 12.0,
        min: 4.0,
        max: 200.0,
    }
}
fn default_connection_budget() -> BudgetBounds {
    BudgetBounds {
        start: 30.0,
        min: 4.0,
        max: 1000.0,
    }
}
fn default_budget_horizon() -> usize {
    100
}
fn default_budget_window() -> usize {
    10
}
fn default_budget_increase() -> f64 {
    0.1
}
fn default_budget_decrease() -> f64 {
    0.05
}

/// Alternating complexify/simplify phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasedComplexityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_phase_length")]
    pub phase_length: usize,
    /// Probability that operator selection honors the phase.
    #[serde(default = "default_phase_bias")]
    pub bias: f64,
}

impl Default for PhasedComplexityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            phase_length: default_phase_length(),
            bias: default_phase_bias(),
        }
    }
}

fn default_phase_length() -> usize {
    10
}
fn default_phase_bias() -> f64 {
    0.75
}

/// Adaptive minimal criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimalCriterionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Starting threshold; when absent it is seeded from the first population.
    #[serde(default)]
    pub initial_threshold: Option<f64>,
    /// Fraction of the population that should pass.
    #[serde(default = "default_target_acceptance")]
    pub target_acceptance: f64,
    #[serde(default = "default_mc_adjust")]
    pub adjust: f64,
}

impl Default for MinimalCriterionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_threshold: None,
            target_acceptance: default_target_acceptance(),
            adjust: default_mc_adjust(),
        }
    }
}

fn default_target_acceptance() -> f64 {
    0.5
}
fn default_mc_adjust() -> f64 {
    0.1
}

/// Per-genome self-adaptive mutation rate and amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveMutationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: AdaptiveStrategy,
    /// Initial per-genome rate; defaults to `mutation.rate`.
    #[serde(default)]
    pub initial_rate: Option<f64>,
    /// Maximum per-cycle rate delta.
    #[serde(default = "default_adapt_sigma")]
    pub sigma: f64,
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    #[serde(default)]
    pub adapt_amount: bool,
    #[serde(default = "default_amount_sigma")]
    pub amount_sigma: f64,
    #[serde(default = "default_min_amount")]
    pub min_amount: f64,
    #[serde(default = "default_max_amount")]
    pub max_amount: f64,
    /// Adapt every N generations.
    #[serde(default = "default_adapt_every")]
    pub adapt_every: usize,
}

impl Default for AdaptiveMutationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: AdaptiveStrategy::default(),
            initial_rate: None,
            sigma: default_adapt_sigma(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            adapt_amount: false,
            amount_sigma: default_amount_sigma(),
            min_amount: default_min_amount(),
            max_amount: default_max_amount(),
            adapt_every: default_adapt_every(),
        }
    }
}

fn default_adapt_sigma() -> f64 {
    0.05
}
fn default_min_rate() -> f64 {
    0.01
}
fn default_max_rate() -> f64 {
    1.0
}
fn default_amount_sigma() -> f64 {
    1.0
}
fn default_min_amount() -> f64 {
    1.0
}
fn default_max_amount() -> f64 {
    10.0
}
fn default_adapt_every() -> usize {
    1
}

/// Strategy proposing per-genome deltas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AdaptiveStrategy {
    /// Top half decreases, bottom half increases.
    #[default]
    TwoTier,
    /// Low performers are biased upward, the rest drift randomly.
    Exploration,
    /// Delta magnitude shrinks toward zero as generations pass.
    Anneal,
}

/// Success-weighted operator pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorAdaptationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Geometric decay of success/attempt counts per generation.
    #[serde(default = "default_operator_decay")]
    pub decay: f64,
    /// Extra pool copies of above-average operators.
    #[serde(default = "default_operator_boost")]
    pub boost: usize,
}

impl Default for OperatorAdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            decay: default_operator_decay(),
            boost: default_operator_boost(),
        }
    }
}

fn default_operator_decay() -> f64 {
    0.9
}
fn default_operator_boost() -> usize {
    2
}

/// Upper-confidence-bound operator choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorBanditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bandit_c")]
    pub c: f64,
    /// Attempts below which an operator is always tried first.
    #[serde(default = "default_bandit_min_attempts")]
    pub min_attempts: f64,
}

impl Default for OperatorBanditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            c: default_bandit_c(),
            min_attempts: default_bandit_min_attempts(),
        }
    }
}

fn default_bandit_c() -> f64 {
    1.4
}
fn default_bandit_min_attempts() -> f64 {
    1.0
}

// ============================================================================
// Novelty, lineage, pruning
// ============================================================================

/// Novelty search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_k_nearest")]
    pub k: usize,
    /// Weight of novelty in the blended score.
    #[serde(default = "default_blend_factor")]
    pub blend_factor: f64,
    #[serde(default = "default_insertion_threshold")]
    pub insertion_threshold: f64,
    #[serde(default = "default_archive_cap")]
    pub archive_cap: usize,
    #[serde(default)]
    pub prune: ArchivePrune,
    #[serde(default)]
    pub adaptive_threshold: bool,
    /// Desired fraction of each generation admitted to the archive.
    #[serde(default = "default_target_insertion_rate")]
    pub target_insertion_rate: f64,
    #[serde(default = "default_novelty_adjust")]
    pub adjust: f64,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            k: default_k_nearest(),
            blend_factor: default_blend_factor(),
            insertion_threshold: default_insertion_threshold(),
            archive_cap: default_archive_cap(),
            prune: ArchivePrune::default(),
            adaptive_threshold: false,
            target_insertion_rate: default_target_insertion_rate(),
            adjust: default_novelty_adjust(),
        }
    }
}

fn default_k_nearest() -> usize {
    5
}
fn default_blend_factor() -> f64 {
    0.3
}
fn default_insertion_threshold() -> f64 {
    0.5
}
fn default_archive_cap() -> usize {
    200
}
fn default_target_insertion_rate() -> f64 {
    0.1
}
fn default_novelty_adjust() -> f64 {
    0.05
}

/// Archive eviction policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ArchivePrune {
    /// Evict oldest entries first.
    #[default]
    Fifo,
    /// Repeatedly drop one member of the closest pair.
    Sparse,
}

/// Lineage tracking and depth-based score pressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageConfig {
    #[serde(default)]
    pub pressure: Option<LineagePressure>,
    #[serde(default = "default_lineage_strength")]
    pub strength: f64,
    #[serde(default = "default_target_depth")]
    pub target_depth: usize,
    /// Ancestor generations considered by the uniqueness metric.
    #[serde(default = "default_ancestor_window")]
    pub ancestor_window: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            pressure: None,
            strength: default_lineage_strength(),
            target_depth: default_target_depth(),
            ancestor_window: default_ancestor_window(),
        }
    }
}

fn default_lineage_strength() -> f64 {
    0.01
}
fn default_target_depth() -> usize {
    4
}
fn default_ancestor_window() -> usize {
    4
}

/// Lineage pressure mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LineagePressure {
    PenalizeDeep,
    RewardShallow,
    AntiInbreeding,
}

/// Feedback from ancestor uniqueness into epsilon or lineage strength.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncestorUniquenessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub target: UniquenessTarget,
    #[serde(default = "default_uniqueness_low")]
    pub low: f64,
    #[serde(default = "default_uniqueness_high")]
    pub high: f64,
    #[serde(default = "default_uniqueness_adjust")]
    pub adjust: f64,
    #[serde(default = "default_uniqueness_cooldown")]
    pub cooldown: usize,
}

impl Default for AncestorUniquenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: UniquenessTarget::default(),
            low: default_uniqueness_low(),
            high: default_uniqueness_high(),
            adjust: default_uniqueness_adjust(),
            cooldown: default_uniqueness_cooldown(),
        }
    }
}

fn default_uniqueness_low() -> f64 {
    0.25
}
fn default_uniqueness_high() -> f64 {
    0.55
}
fn default_uniqueness_adjust() -> f64 {
    0.01
}
fn default_uniqueness_cooldown() -> usize {
    5
}

/// Which knob the ancestor-uniqueness feedback turns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum UniquenessTarget {
    #[default]
    Epsilon,
    LineagePressure,
}

/// Scheduled sparsity pruning during evolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start_generation: usize,
    #[serde(default = "default_prune_interval")]
    pub interval: usize,
    #[serde(default = "default_target_sparsity")]
    pub target_sparsity: f64,
    /// Generations over which sparsity ramps from 0 to target.
    #[serde(default = "default_prune_ramp")]
    pub ramp_generations: usize,
    #[serde(default)]
    pub method: PruneMethod,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_generation: 0,
            interval: default_prune_interval(),
            target_sparsity: default_target_sparsity(),
            ramp_generations: default_prune_ramp(),
            method: PruneMethod::default(),
        }
    }
}

fn default_prune_interval() -> usize {
    1
}
fn default_target_sparsity() -> f64 {
    0.5
}
fn default_prune_ramp() -> usize {
    50
}

/// Telemetry collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Genome pairs sampled for compatibility and lineage statistics.
    #[serde(default = "default_diversity_pairs")]
    pub diversity_pairs: usize,
    /// Node triples sampled per genome for motif entropy.
    #[serde(default = "default_motif_samples")]
    pub motif_samples: usize,
    #[serde(default = "default_true")]
    pub complexity: bool,
    #[serde(default = "default_true")]
    pub performance: bool,
    #[serde(default = "default_true")]
    pub hypervolume: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            diversity_pairs: default_diversity_pairs(),
            motif_samples: default_motif_samples(),
            complexity: true,
            performance: true,
            hypervolume: true,
        }
    }
}

fn default_max_entries() -> usize {
    500
}
fn default_diversity_pairs() -> usize {
    40
}
fn default_motif_samples() -> usize {
    12
}

// ============================================================================
// Validation
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Network must have at least one input and one output")]
    InvalidShape,
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Elitism ({elitism}) plus provenance ({provenance}) exceeds population size ({size})")]
    ReservedSlotsExceedPopulation {
        elitism: usize,
        provenance: usize,
        size: usize,
    },
    #[error("Tournament size {tournament} exceeds population size {size}")]
    TournamentTooLarge { tournament: usize, size: usize },
    #[error("Invalid probability for {name}: {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("Invalid range for {name}: min {min} > max {max}")]
    InvalidRange {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("Mutation operator pool is empty")]
    NoOperators,
    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

impl NeatConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input == 0 || self.output == 0 {
            return Err(ConfigError::InvalidShape);
        }

        let pop = &self.population;
        if pop.size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if pop.elitism + pop.provenance > pop.size {
            return Err(ConfigError::ReservedSlotsExceedPopulation {
                elitism: pop.elitism,
                provenance: pop.provenance,
                size: pop.size,
            });
        }
        if let SelectionMethod::Tournament { size, probability } = pop.selection {
            if size > pop.size {
                return Err(ConfigError::TournamentTooLarge {
                    tournament: size,
                    size: pop.size,
                });
            }
            if size == 0 {
                return Err(ConfigError::NonPositive("tournament size"));
            }
            if !(probability > 0.0 && probability <= 1.0) {
                return Err(ConfigError::InvalidProbability {
                    name: "tournament probability",
                    value: probability,
                });
            }
        }
        if let SelectionMethod::Power { exponent } = pop.selection
            && exponent <= 0.0
        {
            return Err(ConfigError::NonPositive("power selection exponent"));
        }

        let check_probability = |value: f64, name: &'static str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability { name, value })
            }
        };
        check_probability(pop.survival_threshold, "survival_threshold")?;
        if pop.survival_threshold == 0.0 {
            return Err(ConfigError::NonPositive("survival_threshold"));
        }
        check_probability(pop.crossover_rate, "crossover_rate")?;
        check_probability(pop.stagnation_replace_fraction, "stagnation_replace_fraction")?;
        check_probability(self.mutation.rate, "mutation.rate")?;
        check_probability(
            self.speciation.interspecies_mating_rate,
            "interspecies_mating_rate",
        )?;
        check_probability(
            self.minimal_criterion.target_acceptance,
            "minimal_criterion.target_acceptance",
        )?;
        check_probability(self.novelty.blend_factor, "novelty.blend_factor")?;
        check_probability(self.pruning.target_sparsity, "pruning.target_sparsity")?;
        check_probability(self.phased_complexity.bias, "phased_complexity.bias")?;

        if self.mutation.operators.is_empty() {
            return Err(ConfigError::NoOperators);
        }
        if self.mutation.amount <= 0.0 {
            return Err(ConfigError::NonPositive("mutation.amount"));
        }

        let check_range = |min: f64, max: f64, name: &'static str| {
            if min > max {
                Err(ConfigError::InvalidRange { name, min, max })
            } else {
                Ok(())
            }
        };
        let ctl = &self.speciation.controller;
        check_range(ctl.min_threshold, ctl.max_threshold, "speciation.controller")?;
        let tune = &self.speciation.auto_tune;
        check_range(tune.min_coeff, tune.max_coeff, "speciation.auto_tune")?;
        let eps = &self.multi_objective.adaptive_epsilon;
        check_range(eps.min, eps.max, "multi_objective.adaptive_epsilon")?;
        let am = &self.adaptive_mutation;
        check_range(am.min_rate, am.max_rate, "adaptive_mutation.rate")?;
        check_range(am.min_amount, am.max_amount, "adaptive_mutation.amount")?;
        let budget = &self.complexity_budget;
        check_range(budget.nodes.min, budget.nodes.max, "complexity_budget.nodes")?;
        check_range(
            budget.connections.min,
            budget.connections.max,
            "complexity_budget.connections",
        )?;
        let uniq = &self.ancestor_uniqueness;
        check_range(uniq.low, uniq.high, "ancestor_uniqueness")?;

        if self.speciation.compatibility_threshold <= 0.0 {
            return Err(ConfigError::NonPositive("compatibility_threshold"));
        }
        if self.novelty.enabled && self.novelty.k == 0 {
            return Err(ConfigError::NonPositive("novelty.k"));
        }
        if self.telemetry.max_entries == 0 {
            return Err(ConfigError::NonPositive("telemetry.max_entries"));
        }
        if self.phased_complexity.enabled && self.phased_complexity.phase_length == 0 {
            return Err(ConfigError::NonPositive("phased_complexity.phase_length"));
        }
        if self.multi_objective.prune_inactive.enabled
            && self.multi_objective.prune_inactive.window == 0
        {
            return Err(ConfigError::NonPositive("prune_inactive.window"));
        }

        Ok(())
    }
}
