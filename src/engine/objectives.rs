//! Objective registry: built-in and user objectives, the dynamic schedule,
//! and pruning of objectives that stopped discriminating.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::diversity::EntropyCache;
use super::member::Member;
use crate::network::Genome;
use crate::schema::{
    ComplexityMetric, MultiObjectiveConfig, ObjectiveEvent, ObjectiveEventKind,
    ObjectiveImportance, PruneInactiveConfig,
};

pub const FITNESS_KEY: &str = "fitness";
pub const COMPLEXITY_KEY: &str = "complexity";
pub const ENTROPY_KEY: &str = "entropy";

/// Optimisation direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Pure member accessor for user objectives.
pub type ObjectiveFn<G> = Arc<dyn Fn(&Member<G>) -> f64 + Send + Sync>;

enum ObjectiveKind<G> {
    Fitness,
    Complexity(ComplexityMetric),
    Entropy,
    Custom(ObjectiveFn<G>),
}

impl<G> Clone for ObjectiveKind<G> {
    fn clone(&self) -> Self {
        match self {
            ObjectiveKind::Fitness => ObjectiveKind::Fitness,
            ObjectiveKind::Complexity(m) => ObjectiveKind::Complexity(*m),
            ObjectiveKind::Entropy => ObjectiveKind::Entropy,
            ObjectiveKind::Custom(f) => ObjectiveKind::Custom(Arc::clone(f)),
        }
    }
}

/// One optimisation objective.
pub struct Objective<G> {
    pub key: String,
    pub direction: Direction,
    kind: ObjectiveKind<G>,
}

impl<G> Clone for Objective<G> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            direction: self.direction,
            kind: self.kind.clone(),
        }
    }
}

impl<G> fmt::Debug for Objective<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Objective")
            .field("key", &self.key)
            .field("direction", &self.direction)
            .finish()
    }
}

impl<G: Genome> Objective<G> {
    /// A user objective.
    pub fn custom<F>(key: impl Into<String>, direction: Direction, accessor: F) -> Self
    where
        F: Fn(&Member<G>) -> f64 + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            direction,
            kind: ObjectiveKind::Custom(Arc::new(accessor)),
        }
    }

    fn fitness() -> Self {
        Self {
            key: FITNESS_KEY.to_string(),
            direction: Direction::Maximize,
            kind: ObjectiveKind::Fitness,
        }
    }

    fn complexity(metric: ComplexityMetric) -> Self {
        Self {
            key: COMPLEXITY_KEY.to_string(),
            direction: Direction::Minimize,
            kind: ObjectiveKind::Complexity(metric),
        }
    }

    fn entropy() -> Self {
        Self {
            key: ENTROPY_KEY.to_string(),
            direction: Direction::Maximize,
            kind: ObjectiveKind::Entropy,
        }
    }

    pub fn value(&self, member: &Member<G>, entropy: &mut EntropyCache) -> f64 {
        match &self.kind {
            ObjectiveKind::Fitness => member.fitness(),
            ObjectiveKind::Complexity(metric) => match metric {
                ComplexityMetric::Nodes => member.genome.node_count() as f64,
                ComplexityMetric::Connections => member.genome.connection_count() as f64,
                ComplexityMetric::Both => {
                    (member.genome.node_count() + member.genome.connection_count()) as f64
                }
            },
            ObjectiveKind::Entropy => entropy.get(member.id, &member.genome),
            ObjectiveKind::Custom(f) => f(member),
        }
    }
}

/// Tracks which objectives are active and why.
pub struct ObjectiveRegistry<G> {
    custom: Vec<Objective<G>>,
    active: Option<Vec<Objective<G>>>,
    keys: Vec<String>,
    pruned: BTreeSet<String>,
    stale: BTreeMap<String, usize>,
    ages: BTreeMap<String, usize>,
    events: Vec<ObjectiveEvent>,
    entropy_dropped_at: Option<usize>,
}

impl<G> Default for ObjectiveRegistry<G> {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            active: None,
            keys: Vec::new(),
            pruned: BTreeSet::new(),
            stale: BTreeMap::new(),
            ages: BTreeMap::new(),
            events: Vec::new(),
            entropy_dropped_at: None,
        }
    }
}

impl<G: Genome> ObjectiveRegistry<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user objective (keys are unique).
    pub fn register(&mut self, objective: Objective<G>) {
        self.pruned.remove(&objective.key);
        self.stale.remove(&objective.key);
        match self.custom.iter_mut().find(|o| o.key == objective.key) {
            Some(slot) => *slot = objective,
            None => self.custom.push(objective),
        }
        self.invalidate();
    }

    pub fn clear_custom(&mut self) {
        self.custom.clear();
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> &[Objective<G>] {
        self.active.as_deref().unwrap_or(&[])
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn directions(&self) -> Vec<Direction> {
        self.active().iter().map(|o| o.direction).collect()
    }

    pub fn ages(&self) -> &BTreeMap<String, usize> {
        &self.ages
    }

    /// Add/remove events since the last refresh.
    pub fn events(&self) -> &[ObjectiveEvent] {
        &self.events
    }

    pub fn is_pruned(&self, key: &str) -> bool {
        self.pruned.contains(key)
    }

    /// Apply the schedule for `generation` and rebuild the active list when
    /// it changed. `stagnation` is the number of generations without a new
    /// best score.
    pub fn refresh(&mut self, generation: usize, stagnation: usize, config: &MultiObjectiveConfig) {
        self.events.clear();
        let dynamic = &config.dynamic;

        if dynamic.enabled && config.entropy {
            match self.entropy_dropped_at {
                Some(at) if generation.saturating_sub(at) >= dynamic.readd_entropy_after => {
                    debug!("Entropy objective re-enabled at generation {generation}");
                    self.entropy_dropped_at = None;
                    self.invalidate();
                }
                None => {
                    if let Some(limit) = dynamic.drop_entropy_on_stagnation
                        && stagnation >= limit
                        && self.keys.iter().any(|k| k == ENTROPY_KEY)
                    {
                        debug!("Entropy objective dropped after {stagnation} stagnant generations");
                        self.entropy_dropped_at = Some(generation);
                        self.invalidate();
                    }
                }
                _ => {}
            }
        }

        let desired = self.desired_keys(generation, config);
        if self.active.is_none() || desired != self.keys {
            self.rebuild(generation, config);
        }

        for key in &self.keys {
            *self.ages.entry(key.clone()).or_insert(0) += 1;
        }
    }

    fn desired_keys(&self, generation: usize, config: &MultiObjectiveConfig) -> Vec<String> {
        self.build(generation, config)
            .into_iter()
            .map(|o| o.key)
            .collect()
    }

    fn build(&self, generation: usize, config: &MultiObjectiveConfig) -> Vec<Objective<G>> {
        let dynamic = &config.dynamic;
        let mut list = Vec::new();
        if !config.suppress_fitness {
            list.push(Objective::fitness());
        }
        if let Some(metric) = config.complexity
            && (!dynamic.enabled || generation >= dynamic.add_complexity_at)
        {
            list.push(Objective::complexity(metric));
        }
        if config.entropy
            && self.entropy_dropped_at.is_none()
            && (!dynamic.enabled || generation >= dynamic.add_entropy_at)
        {
            list.push(Objective::entropy());
        }
        for objective in &self.custom {
            if !list.iter().any(|o| o.key == objective.key) {
                list.push(objective.clone());
            }
        }
        list.retain(|o| !self.pruned.contains(&o.key));
        list
    }

    fn rebuild(&mut self, generation: usize, config: &MultiObjectiveConfig) {
        let list = self.build(generation, config);
        let keys: Vec<String> = list.iter().map(|o| o.key.clone()).collect();
        for key in &keys {
            if !self.keys.contains(key) {
                self.events.push(ObjectiveEvent {
                    kind: ObjectiveEventKind::Add,
                    key: key.clone(),
                });
            }
        }
        for key in &self.keys {
            if !keys.contains(key) {
                self.events.push(ObjectiveEvent {
                    kind: ObjectiveEventKind::Remove,
                    key: key.clone(),
                });
                self.ages.remove(key);
            }
        }
        self.keys = keys;
        self.active = Some(list);
    }

    /// Row-major `n x m` matrix of objective values.
    pub fn values(&self, population: &[Member<G>], entropy: &mut EntropyCache) -> Vec<Vec<f64>> {
        let active = self.active();
        population
            .iter()
            .map(|m| active.iter().map(|o| o.value(m, entropy)).collect())
            .collect()
    }

    /// Count consecutive collapsed-range generations per unprotected
    /// objective and drop those that reach the window.
    pub fn track_inactive(&mut self, values: &[Vec<f64>], config: &PruneInactiveConfig) {
        if !config.enabled || values.is_empty() {
            return;
        }
        let keys: Vec<String> = self.active().iter().map(|o| o.key.clone()).collect();
        let mut removed = Vec::new();
        for (j, key) in keys.into_iter().enumerate() {
            if config.protect.contains(&key) {
                continue;
            }
            let (lo, hi) = column_bounds(values, j);
            let count = self.stale.entry(key.clone()).or_insert(0);
            if hi - lo < config.range_eps {
                *count += 1;
            } else {
                *count = 0;
            }
            if *count >= config.window {
                removed.push(key);
            }
        }
        for key in removed {
            info!("Objective '{key}' pruned after {} inactive generations", config.window);
            self.stale.remove(&key);
            self.pruned.insert(key.clone());
            self.keys.retain(|k| *k != key);
            self.ages.remove(&key);
            if let Some(active) = self.active.as_mut() {
                active.retain(|o| o.key != key);
            }
            self.events.push(ObjectiveEvent {
                kind: ObjectiveEventKind::Remove,
                key,
            });
        }
    }

    /// Range and variance of each active objective.
    pub fn importance(&self, values: &[Vec<f64>]) -> BTreeMap<String, ObjectiveImportance> {
        let n = values.len();
        self.active()
            .iter()
            .enumerate()
            .map(|(j, o)| {
                let (lo, hi) = column_bounds(values, j);
                let (range, variance) = if n == 0 {
                    (0.0, 0.0)
                } else {
                    let mean = values.iter().map(|row| row[j]).sum::<f64>() / n as f64;
                    let var =
                        values.iter().map(|row| (row[j] - mean).powi(2)).sum::<f64>() / n as f64;
                    (hi - lo, var)
                };
                (o.key.clone(), ObjectiveImportance { range, variance })
            })
            .collect()
    }
}

fn column_bounds(values: &[Vec<f64>], j: usize) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
        (lo.min(row[j]), hi.max(row[j]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRng;
    use crate::network::{InnovationRegistry, MutationContext, Network};

    fn population(n: usize) -> Vec<Member<Network>> {
        let mut rng = EngineRng::new(8);
        let mut reg = InnovationRegistry::new(2, 1);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        (0..n)
            .map(|i| {
                let mut m = Member::new(i as u64, Network::minimal(2, 1, &mut ctx));
                m.score = Some(i as f64);
                m
            })
            .collect()
    }

    #[test]
    fn test_default_is_fitness_only() {
        let mut reg: ObjectiveRegistry<Network> = ObjectiveRegistry::new();
        reg.refresh(0, 0, &MultiObjectiveConfig::default());
        assert_eq!(reg.keys(), &["fitness".to_string()]);
        assert_eq!(reg.events().len(), 1);
        assert_eq!(reg.events()[0].kind, ObjectiveEventKind::Add);
    }

    #[test]
    fn test_schedule_delays_complexity() {
        let mut config = MultiObjectiveConfig::default();
        config.complexity = Some(ComplexityMetric::Nodes);
        config.dynamic.enabled = true;
        config.dynamic.add_complexity_at = 3;
        let mut reg: ObjectiveRegistry<Network> = ObjectiveRegistry::new();
        for generation in 0..3 {
            reg.refresh(generation, 0, &config);
            assert_eq!(reg.keys().len(), 1);
        }
        reg.refresh(3, 0, &config);
        assert_eq!(reg.keys().len(), 2);
        assert_eq!(reg.directions()[1], Direction::Minimize);
        assert_eq!(reg.ages()["fitness"], 4);
        assert_eq!(reg.ages()["complexity"], 1);
    }

    #[test]
    fn test_entropy_dropped_and_readded() {
        let mut config = MultiObjectiveConfig::default();
        config.entropy = true;
        config.dynamic.enabled = true;
        config.dynamic.drop_entropy_on_stagnation = Some(2);
        config.dynamic.readd_entropy_after = 3;
        let mut reg: ObjectiveRegistry<Network> = ObjectiveRegistry::new();
        reg.refresh(0, 0, &config);
        assert!(reg.keys().iter().any(|k| k == ENTROPY_KEY));
        reg.refresh(1, 2, &config);
        assert!(!reg.keys().iter().any(|k| k == ENTROPY_KEY));
        reg.refresh(2, 0, &config);
        assert!(!reg.keys().iter().any(|k| k == ENTROPY_KEY));
        reg.refresh(4, 0, &config);
        assert!(reg.keys().iter().any(|k| k == ENTROPY_KEY));
    }

    #[test]
    fn test_constant_objective_pruned_protected_kept() {
        let mut config = MultiObjectiveConfig::default();
        config.prune_inactive.enabled = true;
        config.prune_inactive.window = 3;
        config.prune_inactive.protect.push("guard".to_string());
        let mut reg: ObjectiveRegistry<Network> = ObjectiveRegistry::new();
        reg.register(Objective::custom("flat", Direction::Maximize, |_| 1.0));
        reg.register(Objective::custom("guard", Direction::Maximize, |_| 1.0));
        let pop = population(6);
        let mut entropy = EntropyCache::new();

        for generation in 0..3 {
            reg.refresh(generation, 0, &config);
            assert!(reg.keys().iter().any(|k| k == "flat"));
            let values = reg.values(&pop, &mut entropy);
            reg.track_inactive(&values, &config.prune_inactive);
        }
        assert!(!reg.keys().iter().any(|k| k == "flat"));
        assert!(reg.keys().iter().any(|k| k == "guard"));
        assert!(reg.is_pruned("flat"));
        reg.refresh(3, 0, &config);
        assert!(!reg.keys().iter().any(|k| k == "flat"));
    }

    #[test]
    fn test_importance() {
        let mut reg: ObjectiveRegistry<Network> = ObjectiveRegistry::new();
        reg.refresh(0, 0, &MultiObjectiveConfig::default());
        let pop = population(5);
        let mut entropy = EntropyCache::new();
        let values = reg.values(&pop, &mut entropy);
        let imp = reg.importance(&values);
        assert_eq!(imp["fitness"].range, 4.0);
        assert!((imp["fitness"].variance - 2.0).abs() < 1e-12);
    }
}
