//! Per-generation telemetry records.
//!
//! Field names serialize in camelCase; the CSV exporter flattens nested
//! records into dotted keys such as `complexity.meanNodes`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Complexity phase of the phased-complexity controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityPhase {
    #[default]
    Complexify,
    Simplify,
}

impl ComplexityPhase {
    pub fn toggled(self) -> Self {
        match self {
            ComplexityPhase::Complexify => ComplexityPhase::Simplify,
            ComplexityPhase::Simplify => ComplexityPhase::Complexify,
        }
    }
}

/// One generation's immutable summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEntry {
    pub generation: usize,
    pub best: f64,
    pub species: usize,
    pub threshold: f64,
    pub epsilon: f64,
    pub diversity: DiversityStats,
    pub ops: Vec<OperatorStat>,
    pub objectives: Vec<String>,
    pub species_alloc: Vec<SpeciesAllocation>,
    pub obj_ages: BTreeMap<String, usize>,
    pub obj_events: Vec<ObjectiveEvent>,
    #[serde(default)]
    pub obj_importance: BTreeMap<String, ObjectiveImportance>,
    /// Front sizes in rank order (multi-objective only).
    #[serde(default)]
    pub fronts: Option<Vec<usize>>,
    #[serde(default)]
    pub hypervolume: Option<f64>,
    #[serde(default)]
    pub phase: Option<ComplexityPhase>,
    pub lineage: LineageStats,
    #[serde(default)]
    pub complexity: Option<ComplexityStats>,
    #[serde(default)]
    pub perf: Option<PerformanceStats>,
}

/// Sampled population diversity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiversityStats {
    pub mean_compat: f64,
    pub var_compat: f64,
    pub mean_entropy: f64,
    pub var_entropy: f64,
    pub graphlet_entropy: f64,
    pub lineage_mean_depth: f64,
    pub lineage_mean_pair_dist: f64,
    /// Fraction of carried-over members that changed species.
    #[serde(default)]
    pub species_turnover: f64,
}

/// Success/attempt counts of one mutation operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStat {
    pub name: String,
    pub success: f64,
    pub attempts: f64,
}

/// Species size and offspring share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesAllocation {
    pub id: u64,
    pub size: usize,
    pub age: usize,
    pub best: f64,
    pub offspring: usize,
}

/// Objective set change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveEvent {
    pub kind: ObjectiveEventKind,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveEventKind {
    Add,
    Remove,
}

/// Spread of an objective's values across the population.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveImportance {
    pub range: f64,
    pub variance: f64,
}

/// Lineage summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineageStats {
    /// Parent ids of the best genome.
    pub parents: Vec<u64>,
    pub depth_best: usize,
    pub mean_depth: f64,
    /// Same-parent matings this generation.
    pub inbreeding: usize,
    /// Mean Jaccard distance of recent ancestor sets over sampled pairs.
    pub ancestor_uniq: f64,
}

/// Structural size statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityStats {
    pub mean_nodes: f64,
    pub mean_conns: f64,
    pub max_nodes: usize,
    pub max_conns: usize,
    pub mean_enabled_ratio: f64,
    #[serde(default)]
    pub budget_max_nodes: Option<usize>,
    #[serde(default)]
    pub budget_max_conns: Option<usize>,
}

/// Wall-clock timings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub eval_ms: f64,
    pub evolve_ms: f64,
}
