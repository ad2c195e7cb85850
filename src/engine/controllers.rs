//! Per-generation control hooks run right after evaluation.
//!
//! Hooks run in a fixed order (complexity budget, phase, minimal criterion)
//! and publish their decisions into [`ControlState`], which operator
//! selection reads later in the same generation.

use std::collections::VecDeque;

use log::debug;

use super::member::Member;
use crate::schema::{BudgetMode, ComplexityPhase, NeatConfig};

/// Decisions shared with reproduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    pub node_cap: Option<usize>,
    pub connection_cap: Option<usize>,
    pub phase: Option<ComplexityPhase>,
    pub mc_threshold: Option<f64>,
}

/// What a hook may see and touch.
pub struct HookContext<'a, G> {
    pub generation: usize,
    pub population: &'a mut [Member<G>],
    /// Best raw score of the generation just evaluated.
    pub best: f64,
    pub config: &'a NeatConfig,
    pub control: &'a mut ControlState,
}

/// A controller invoked once per generation.
pub trait GenerationHook<G> {
    fn name(&self) -> &'static str;

    /// Must be a no-op when the controller is disabled.
    fn run(&mut self, ctx: &mut HookContext<'_, G>);
}

/// The standard hook list, in execution order.
pub fn default_hooks<G>() -> Vec<Box<dyn GenerationHook<G>>> {
    vec![
        Box::new(ComplexityBudget::default()),
        Box::new(PhaseController::default()),
        Box::new(MinimalCriterion::default()),
    ]
}

/// Least-squares slope of `ys` against `0..len`.
pub fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in ys.iter().enumerate() {
        let dx = x as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

/// Node and connection caps that grow while search improves.
#[derive(Debug, Clone, Default)]
pub struct ComplexityBudget {
    caps: Option<(f64, f64)>,
    window: VecDeque<f64>,
}

impl ComplexityBudget {
    pub fn caps(&self) -> Option<(f64, f64)> {
        self.caps
    }
}

impl<G> GenerationHook<G> for ComplexityBudget {
    fn name(&self) -> &'static str {
        "complexity_budget"
    }

    fn run(&mut self, ctx: &mut HookContext<'_, G>) {
        let config = &ctx.config.complexity_budget;
        if !config.enabled {
            ctx.control.node_cap = None;
            ctx.control.connection_cap = None;
            return;
        }
        let (nodes, conns) = match config.mode {
            BudgetMode::Linear => {
                let t = if config.horizon == 0 {
                    1.0
                } else {
                    (ctx.generation as f64 / config.horizon as f64).min(1.0)
                };
                (
                    config.nodes.start + (config.nodes.max - config.nodes.start) * t,
                    config.connections.start
                        + (config.connections.max - config.connections.start) * t,
                )
            }
            BudgetMode::Adaptive => {
                let (mut nodes, mut conns) = self
                    .caps
                    .unwrap_or((config.nodes.start, config.connections.start));
                self.window.push_back(ctx.best);
                while self.window.len() > config.window.max(2) {
                    self.window.pop_front();
                }
                if self.window.len() >= 2 {
                    let ys: Vec<f64> = self.window.iter().copied().collect();
                    let slope = ols_slope(&ys);
                    let improvement = ys[ys.len() - 1] - ys[0];
                    let factor = if slope > 0.0 && improvement > 0.0 {
                        let mean = ys.iter().sum::<f64>() / ys.len() as f64;
                        let strength =
                            (slope * ys.len() as f64 / mean.abs().max(f64::EPSILON)).min(1.0);
                        1.0 + config.increase * strength
                    } else {
                        1.0 - config.decrease
                    };
                    nodes *= factor;
                    conns *= factor;
                }
                (nodes, conns)
            }
        };
        let nodes = nodes.clamp(config.nodes.min, config.nodes.max);
        let conns = conns.clamp(config.connections.min, config.connections.max);
        if self.caps != Some((nodes, conns)) {
            debug!("Complexity budget: {nodes:.1} nodes, {conns:.1} connections");
        }
        self.caps = Some((nodes, conns));
        ctx.control.node_cap = Some(nodes.round() as usize);
        ctx.control.connection_cap = Some(conns.round() as usize);
    }
}

/// Alternates complexify and simplify phases.
#[derive(Debug, Clone, Default)]
pub struct PhaseController {
    phase: ComplexityPhase,
    last_toggle: Option<usize>,
}

impl<G> GenerationHook<G> for PhaseController {
    fn name(&self) -> &'static str {
        "phased_complexity"
    }

    fn run(&mut self, ctx: &mut HookContext<'_, G>) {
        let config = &ctx.config.phased_complexity;
        if !config.enabled || config.phase_length == 0 {
            ctx.control.phase = None;
            return;
        }
        let g = ctx.generation;
        if g > 0 && g % config.phase_length == 0 && self.last_toggle != Some(g) {
            self.phase = self.phase.toggled();
            self.last_toggle = Some(g);
            debug!("Generation {g}: entering {:?} phase", self.phase);
        }
        ctx.control.phase = Some(self.phase);
    }
}

/// Rejects members below an acceptance threshold that tracks a target
/// acceptance fraction.
#[derive(Debug, Clone, Default)]
pub struct MinimalCriterion {
    threshold: Option<f64>,
}

impl<G> GenerationHook<G> for MinimalCriterion {
    fn name(&self) -> &'static str {
        "minimal_criterion"
    }

    fn run(&mut self, ctx: &mut HookContext<'_, G>) {
        let config = &ctx.config.minimal_criterion;
        if !config.enabled || ctx.population.is_empty() {
            ctx.control.mc_threshold = None;
            return;
        }
        let threshold = match self.threshold.or(config.initial_threshold) {
            Some(t) => t,
            None => {
                let mut scores: Vec<f64> = ctx.population.iter().map(|m| m.fitness()).collect();
                scores.sort_by(f64::total_cmp);
                let q = (1.0 - config.target_acceptance).clamp(0.0, 1.0);
                scores[(q * (scores.len() - 1) as f64).floor() as usize]
            }
        };

        let accepted = reject_below(ctx.population, threshold);
        let acceptance = accepted as f64 / ctx.population.len() as f64;
        let step = config.adjust * threshold.abs().max(f64::EPSILON);
        let next = if acceptance > config.target_acceptance {
            threshold + step
        } else if acceptance < config.target_acceptance {
            threshold - step
        } else {
            threshold
        };
        debug!(
            "Minimal criterion: accepted {:.2}, threshold {:.4} -> {:.4}",
            acceptance, threshold, next
        );
        self.threshold = Some(next);
        ctx.control.mc_threshold = Some(threshold);
    }
}

/// Zero the score of every member whose raw score is below `threshold`.
/// Returns how many were accepted.
pub fn reject_below<G>(population: &mut [Member<G>], threshold: f64) -> usize {
    let mut accepted = 0;
    for member in population.iter_mut() {
        let raw = member.traits.raw_score.or(member.score).unwrap_or(0.0);
        if raw >= threshold {
            accepted += 1;
        } else {
            member.score = Some(0.0);
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(scores: &[f64]) -> Vec<Member<()>> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let mut m = Member::new(i as u64, ());
                m.score = Some(s);
                m
            })
            .collect()
    }

    fn run_hook(
        hook: &mut dyn GenerationHook<()>,
        config: &NeatConfig,
        generation: usize,
        best: f64,
        pop: &mut [Member<()>],
        control: &mut ControlState,
    ) {
        let mut ctx = HookContext {
            generation,
            population: pop,
            best,
            config,
            control,
        };
        hook.run(&mut ctx);
    }

    #[test]
    fn test_ols_slope() {
        assert!((ols_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert_eq!(ols_slope(&[5.0]), 0.0);
        assert!(ols_slope(&[3.0, 2.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_disabled_hooks_are_noops() {
        let config = NeatConfig::default();
        let mut pop = members(&[1.0, 2.0]);
        let mut control = ControlState::default();
        for mut hook in default_hooks::<()>() {
            run_hook(hook.as_mut(), &config, 3, 2.0, &mut pop, &mut control);
        }
        assert_eq!(control, ControlState::default());
        assert_eq!(pop[0].score, Some(1.0));
    }

    #[test]
    fn test_budget_grows_when_improving_and_shrinks_when_flat() {
        let mut config = NeatConfig::default();
        config.complexity_budget.enabled = true;
        let mut budget = ComplexityBudget::default();
        let mut pop = members(&[1.0]);
        let mut control = ControlState::default();
        for (g, best) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            run_hook(&mut budget, &config, g, best, &mut pop, &mut control);
        }
        let grown = budget.caps().unwrap().0;
        assert!(grown > config.complexity_budget.nodes.start);

        for g in 4..30 {
            run_hook(&mut budget, &config, g, 4.0, &mut pop, &mut control);
        }
        let (nodes, _) = budget.caps().unwrap();
        assert!(nodes < grown);
        assert!(nodes >= config.complexity_budget.nodes.min);
    }

    #[test]
    fn test_linear_budget_interpolates() {
        let mut config = NeatConfig::default();
        config.complexity_budget.enabled = true;
        config.complexity_budget.mode = BudgetMode::Linear;
        config.complexity_budget.horizon = 10;
        let mut budget = ComplexityBudget::default();
        let mut pop = members(&[1.0]);
        let mut control = ControlState::default();
        run_hook(&mut budget, &config, 5, 0.0, &mut pop, &mut control);
        let b = &config.complexity_budget.nodes;
        let expected = (b.start + (b.max - b.start) * 0.5).round() as usize;
        assert_eq!(control.node_cap, Some(expected));
        run_hook(&mut budget, &config, 50, 0.0, &mut pop, &mut control);
        assert_eq!(control.node_cap, Some(b.max.round() as usize));
    }

    #[test]
    fn test_phase_toggles() {
        let mut config = NeatConfig::default();
        config.phased_complexity.enabled = true;
        config.phased_complexity.phase_length = 2;
        let mut phase = PhaseController::default();
        let mut pop = members(&[1.0]);
        let mut control = ControlState::default();
        let mut seen = Vec::new();
        for g in 0..6 {
            run_hook(&mut phase, &config, g, 0.0, &mut pop, &mut control);
            // Repeated calls within a generation do not toggle again.
            run_hook(&mut phase, &config, g, 0.0, &mut pop, &mut control);
            seen.push(control.phase.unwrap());
        }
        use ComplexityPhase::*;
        assert_eq!(
            seen,
            vec![Complexify, Complexify, Simplify, Simplify, Complexify, Complexify]
        );
    }

    #[test]
    fn test_minimal_criterion_zeroes_and_adapts() {
        let mut config = NeatConfig::default();
        config.minimal_criterion.enabled = true;
        config.minimal_criterion.initial_threshold = Some(2.5);
        config.minimal_criterion.target_acceptance = 0.5;
        let mut mc = MinimalCriterion::default();
        let mut pop = members(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut control = ControlState::default();
        run_hook(&mut mc, &config, 0, 5.0, &mut pop, &mut control);
        assert_eq!(pop[0].score, Some(0.0));
        assert_eq!(pop[1].score, Some(0.0));
        assert_eq!(pop[2].score, Some(3.0));
        assert_eq!(control.mc_threshold, Some(2.5));
        // 3 of 5 accepted is above target, so the bar rises.
        assert!(mc.threshold.unwrap() > 2.5);
    }

    #[test]
    fn test_minimal_criterion_seeds_from_quantile() {
        let mut config = NeatConfig::default();
        config.minimal_criterion.enabled = true;
        config.minimal_criterion.target_acceptance = 0.5;
        let mut mc = MinimalCriterion::default();
        let mut pop = members(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        let mut control = ControlState::default();
        run_hook(&mut mc, &config, 0, 5.0, &mut pop, &mut control);
        assert_eq!(control.mc_threshold, Some(3.0));
    }
}
