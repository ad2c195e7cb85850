//! Mutation operator bookkeeping and selection.

use std::collections::BTreeMap;

use super::rng::EngineRng;
use crate::network::{Genome, MutationOp};
use crate::schema::{ComplexityPhase, OperatorBanditConfig, OperatorStat};

/// Decayed success/attempt counts of one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperatorCount {
    pub success: f64,
    pub attempts: f64,
}

impl OperatorCount {
    pub fn rate(&self) -> f64 {
        if self.attempts > 0.0 {
            self.success / self.attempts
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperatorStats {
    counts: BTreeMap<MutationOp, OperatorCount>,
}

impl OperatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Success means the operator changed the genome.
    pub fn record(&mut self, op: MutationOp, success: bool) {
        let count = self.counts.entry(op).or_default();
        count.attempts += 1.0;
        if success {
            count.success += 1.0;
        }
    }

    pub fn decay(&mut self, factor: f64) {
        for count in self.counts.values_mut() {
            count.success *= factor;
            count.attempts *= factor;
        }
    }

    pub fn get(&self, op: MutationOp) -> OperatorCount {
        self.counts.get(&op).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<OperatorStat> {
        self.counts
            .iter()
            .map(|(op, c)| OperatorStat {
                name: op.name().to_string(),
                success: c.success,
                attempts: c.attempts,
            })
            .collect()
    }

    /// `base` with each operator above the mean success rate repeated
    /// `boost` extra times.
    pub fn pool(&self, base: &[MutationOp], boost: usize) -> Vec<MutationOp> {
        let tried: Vec<f64> = base
            .iter()
            .map(|&op| self.get(op))
            .filter(|c| c.attempts > 0.0)
            .map(|c| c.rate())
            .collect();
        if tried.is_empty() || boost == 0 {
            return base.to_vec();
        }
        let mean = tried.iter().sum::<f64>() / tried.len() as f64;
        let mut pool = base.to_vec();
        for &op in base {
            let c = self.get(op);
            if c.attempts > 0.0 && c.rate() > mean {
                pool.extend(std::iter::repeat_n(op, boost));
            }
        }
        pool
    }

    /// Upper-confidence-bound choice among `candidates`. Operators with
    /// fewer than `min_attempts` decayed attempts are tried first.
    pub fn ucb(&self, candidates: &[MutationOp], config: &OperatorBanditConfig) -> Option<MutationOp> {
        if let Some(&op) = candidates
            .iter()
            .find(|&&op| self.get(op).attempts < config.min_attempts)
        {
            return Some(op);
        }
        let total: f64 = candidates.iter().map(|&op| self.get(op).attempts).sum();
        let ln_total = total.max(1.0).ln();
        candidates
            .iter()
            .copied()
            .map(|op| {
                let c = self.get(op);
                (op, c.rate() + config.c * (ln_total / c.attempts).sqrt())
            })
            .fold(None, |best: Option<(MutationOp, f64)>, (op, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((op, score)),
            })
            .map(|(op, _)| op)
    }
}

/// Limits operator selection must respect.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorConstraints {
    pub node_cap: Option<usize>,
    pub connection_cap: Option<usize>,
    pub phase: Option<ComplexityPhase>,
    pub phase_bias: f64,
}

impl OperatorConstraints {
    /// Drop growth operators that would exceed a cap.
    pub fn allowed<G: Genome>(&self, genome: &G, pool: &[MutationOp]) -> Vec<MutationOp> {
        pool.iter()
            .copied()
            .filter(|op| match op {
                MutationOp::AddNode => self.node_cap.is_none_or(|cap| genome.node_count() < cap),
                MutationOp::AddConn => self
                    .connection_cap
                    .is_none_or(|cap| genome.connection_count() < cap),
                _ => true,
            })
            .collect()
    }
}

/// Pick one operator from `candidates`, or `None` when nothing is allowed.
pub fn select_operator(
    candidates: &[MutationOp],
    constraints: &OperatorConstraints,
    stats: &OperatorStats,
    bandit: Option<&OperatorBanditConfig>,
    rng: &mut EngineRng,
) -> Option<MutationOp> {
    if candidates.is_empty() {
        return None;
    }
    let mut choices = candidates.to_vec();
    if let Some(phase) = constraints.phase
        && rng.chance(constraints.phase_bias)
    {
        let preferred: Vec<MutationOp> = choices
            .iter()
            .copied()
            .filter(|op| match phase {
                ComplexityPhase::Complexify => op.is_growth(),
                ComplexityPhase::Simplify => op.is_shrink(),
            })
            .collect();
        if !preferred.is_empty() {
            choices = preferred;
        }
    }
    match bandit {
        Some(config) => {
            let mut unique = choices.clone();
            unique.sort();
            unique.dedup();
            stats.ucb(&unique, config)
        }
        None => Some(choices[rng.index(choices.len())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{InnovationRegistry, MutationContext, Network};

    #[test]
    fn test_record_and_decay() {
        let mut stats = OperatorStats::new();
        stats.record(MutationOp::AddNode, true);
        stats.record(MutationOp::AddNode, false);
        assert_eq!(stats.get(MutationOp::AddNode).rate(), 0.5);
        stats.decay(0.5);
        let c = stats.get(MutationOp::AddNode);
        assert_eq!((c.success, c.attempts), (0.5, 1.0));
        assert_eq!(stats.snapshot()[0].name, "ADD_NODE");
    }

    #[test]
    fn test_pool_boosts_above_mean() {
        let mut stats = OperatorStats::new();
        stats.record(MutationOp::ModWeight, true);
        stats.record(MutationOp::SubNode, false);
        let base = [MutationOp::ModWeight, MutationOp::SubNode];
        let pool = stats.pool(&base, 2);
        assert_eq!(pool.iter().filter(|&&o| o == MutationOp::ModWeight).count(), 3);
        assert_eq!(pool.iter().filter(|&&o| o == MutationOp::SubNode).count(), 1);
    }

    #[test]
    fn test_ucb_tries_unsampled_first() {
        let mut stats = OperatorStats::new();
        let config = OperatorBanditConfig::default();
        stats.record(MutationOp::AddNode, true);
        let pick = stats.ucb(&[MutationOp::AddNode, MutationOp::AddConn], &config);
        assert_eq!(pick, Some(MutationOp::AddConn));

        for _ in 0..20 {
            stats.record(MutationOp::AddConn, false);
        }
        let pick = stats.ucb(&[MutationOp::AddNode, MutationOp::AddConn], &config);
        assert_eq!(pick, Some(MutationOp::AddNode));
    }

    #[test]
    fn test_caps_and_phase_bias() {
        let mut rng = EngineRng::new(0);
        let mut reg = InnovationRegistry::new(2, 1);
        let net = {
            let mut ctx = MutationContext::new(&mut rng, &mut reg);
            Network::minimal(2, 1, &mut ctx)
        };
        let capped = OperatorConstraints {
            node_cap: Some(3),
            connection_cap: Some(2),
            ..Default::default()
        };
        let allowed = capped.allowed(&net, &MutationOp::ALL);
        assert!(!allowed.contains(&MutationOp::AddNode));
        assert!(!allowed.contains(&MutationOp::AddConn));
        assert!(allowed.contains(&MutationOp::ModWeight));

        let simplify = OperatorConstraints {
            phase: Some(ComplexityPhase::Simplify),
            phase_bias: 1.0,
            ..Default::default()
        };
        let stats = OperatorStats::new();
        for _ in 0..20 {
            let op = select_operator(&MutationOp::ALL, &simplify, &stats, None, &mut rng).unwrap();
            assert!(op.is_shrink());
        }
        assert!(select_operator(&[], &simplify, &stats, None, &mut rng).is_none());
    }
}
