//! Engine module - Speciation, multi-objective ranking, adaptive control and
//! reproduction for a population of genomes.

mod allocation;
mod compat;
mod controllers;
mod diversity;
mod lineage;
mod member;
mod novelty;
mod objectives;
mod operators;
mod pareto;
mod persistence;
mod population;
mod reproduce;
mod rng;
mod self_adaptive;
mod sharing;
mod species;
mod telemetry;

pub use allocation::{age_multiplier, allocate};
pub use compat::{CompatibilityCache, CompatibilityParams, compatibility};
pub use controllers::{ControlState, GenerationHook, HookContext, ols_slope};
pub use diversity::{motif_entropy, structural_entropy};
pub use lineage::LineageTracker;
pub use member::{Member, MemberTraits};
pub use novelty::{ArchiveEntry, DescriptorFn, NoveltyArchive};
pub use objectives::{Direction, Objective, ObjectiveFn};
pub use operators::{OperatorConstraints, OperatorCount, OperatorStats};
pub use pareto::{crowding_distances, dominates, hypervolume, non_dominated_sort};
pub use population::{BatchFitness, FitnessFunction, Neat, RunProgress, RunSummary, StopReason};
pub use reproduce::pruning_target;
pub use rng::{EngineRng, RngState};
pub use species::Species;
pub use telemetry::{TelemetryRecorder, TelemetrySink};

use crate::schema::{ConfigError, StateError};

/// Errors returned by fallible engine entry points.
#[derive(Debug, thiserror::Error)]
pub enum NeatError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid state: {0}")]
    State(#[from] StateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Population is empty")]
    EmptyPopulation,
}
