//! Building the next generation: elites, provenance, breeding, repair,
//! scheduled pruning and mutation.

use std::collections::HashMap;

use log::{trace, warn};

use super::allocation::{age_multiplier, allocate};
use super::member::Member;
use super::operators::{OperatorConstraints, OperatorStats, select_operator};
use super::rng::EngineRng;
use super::species::Species;
use crate::network::{Genome, InnovationRegistry, MutationContext, MutationOp, NodeKind};
use crate::schema::{NeatConfig, PruningConfig, SelectionMethod, SpeciesAllocation};

/// The unevaluated next generation.
#[derive(Debug, Clone)]
pub struct Offspring<G> {
    pub members: Vec<Member<G>>,
    /// Leading members copied verbatim.
    pub elites: usize,
    /// Children whose two parents were the same member.
    pub inbreeding: usize,
    pub allocations: Vec<SpeciesAllocation>,
}

/// Shared state needed to create genomes.
pub struct Breeder<'a> {
    pub config: &'a NeatConfig,
    pub rng: &'a mut EngineRng,
    pub innovations: &'a mut InnovationRegistry,
    pub next_id: &'a mut u64,
}

impl Breeder<'_> {
    fn context(&mut self) -> MutationContext<'_> {
        MutationContext::new(self.rng, self.innovations).with_acyclic(self.config.limits.acyclic)
    }

    fn fresh_id(&mut self) -> u64 {
        let id = *self.next_id;
        *self.next_id += 1;
        id
    }

    /// A founder with a fresh minimal genome.
    pub fn fresh<G: Genome>(&mut self) -> Member<G> {
        let (input, output) = (self.config.input, self.config.output);
        let genome = G::minimal(input, output, &mut self.context());
        Member::new(self.fresh_id(), genome)
    }

    /// Produce `population.size` members from a scored generation.
    ///
    /// `order` lists population indices best first. `injected` fresh founders
    /// follow the elites and provenance slots.
    pub fn next_generation<G: Genome>(
        &mut self,
        population: &[Member<G>],
        order: &[usize],
        species: &[Species<G>],
        generation: usize,
        baseline: Option<&G>,
        injected: usize,
    ) -> Offspring<G> {
        let size = self.config.population.size;
        let mut members = Vec::with_capacity(size);

        let elites = self.config.population.elitism.min(size).min(order.len());
        members.extend(order[..elites].iter().map(|&i| population[i].clone()));

        let provenance = self.config.population.provenance.min(size - members.len());
        for _ in 0..provenance {
            let member = match baseline {
                Some(genome) => Member::new(self.fresh_id(), genome.clone()),
                None => self.fresh(),
            };
            members.push(member);
        }
        for _ in 0..injected.min(size - members.len()) {
            members.push(self.fresh());
        }

        let slots = size - members.len();
        let mut inbreeding = 0;
        let mut allocations = Vec::new();
        if population.is_empty() {
            for _ in 0..slots {
                members.push(self.fresh());
            }
        } else if self.config.speciation.enabled && !species.is_empty() {
            let index: HashMap<u64, usize> =
                population.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
            let pools: Vec<Vec<usize>> = species
                .iter()
                .map(|s| self.breeding_pool(population, &index, s))
                .collect();
            let shares: Vec<f64> = species
                .iter()
                .map(|s| {
                    let total: f64 = s
                        .members
                        .iter()
                        .filter_map(|id| index.get(id))
                        .map(|&i| population[i].fitness())
                        .sum();
                    total * age_multiplier(s.age(generation), &self.config.speciation.age)
                })
                .collect();
            let counts = allocate(&shares, slots, self.config.speciation.min_offspring);

            for (k, (s, &count)) in species.iter().zip(&counts).enumerate() {
                allocations.push(SpeciesAllocation {
                    id: s.id,
                    size: s.len(),
                    age: s.age(generation),
                    best: s.best_score,
                    offspring: count,
                });
                for _ in 0..count {
                    let Some(a) = self.pick(&pools[k]) else {
                        members.push(self.fresh());
                        continue;
                    };
                    let b = if pools.len() > 1
                        && self.rng.chance(self.config.speciation.interspecies_mating_rate)
                    {
                        let mut other = self.rng.index(pools.len() - 1);
                        if other >= k {
                            other += 1;
                        }
                        self.pick(&pools[other]).unwrap_or(a)
                    } else {
                        self.pick(&pools[k]).unwrap_or(a)
                    };
                    let (child, inbred) = self.breed(&population[a], &population[b]);
                    inbreeding += usize::from(inbred);
                    members.push(child);
                }
            }
        } else {
            let ranked: Vec<usize> = {
                let mut ranked: Vec<usize> = (0..population.len()).collect();
                ranked.sort_by(|&x, &y| {
                    population[y]
                        .fitness()
                        .total_cmp(&population[x].fitness())
                        .then(x.cmp(&y))
                });
                ranked
            };
            for _ in 0..slots {
                let a = self.select(population, &ranked);
                let b = self.select(population, &ranked);
                let (child, inbred) = self.breed(&population[a], &population[b]);
                inbreeding += usize::from(inbred);
                members.push(child);
            }
        }

        Offspring {
            members,
            elites,
            inbreeding,
            allocations,
        }
    }

    /// The top `survival_threshold` fraction of a species, at least one.
    fn breeding_pool<G>(
        &self,
        population: &[Member<G>],
        index: &HashMap<u64, usize>,
        species: &Species<G>,
    ) -> Vec<usize> {
        let mut pool: Vec<usize> = species
            .members
            .iter()
            .filter_map(|id| index.get(id).copied())
            .collect();
        pool.sort_by(|&a, &b| {
            population[b]
                .fitness()
                .total_cmp(&population[a].fitness())
                .then(a.cmp(&b))
        });
        let keep = ((pool.len() as f64) * self.config.population.survival_threshold).ceil() as usize;
        pool.truncate(keep.max(1));
        pool
    }

    fn pick(&mut self, pool: &[usize]) -> Option<usize> {
        if pool.is_empty() {
            None
        } else {
            Some(pool[self.rng.index(pool.len())])
        }
    }

    /// Parent index by the configured selection method. `ranked` is best first.
    fn select<G>(&mut self, population: &[Member<G>], ranked: &[usize]) -> usize {
        match self.config.population.selection {
            SelectionMethod::Tournament { size, probability } => {
                let mut entrants: Vec<usize> = (0..size.max(1))
                    .map(|_| self.rng.index(population.len()))
                    .collect();
                entrants.sort_by(|&a, &b| {
                    population[b]
                        .fitness()
                        .total_cmp(&population[a].fitness())
                        .then(a.cmp(&b))
                });
                let last = entrants.len() - 1;
                if probability >= 1.0 {
                    return entrants[0];
                }
                entrants[..last]
                    .iter()
                    .copied()
                    .find(|_| self.rng.chance(probability))
                    .unwrap_or(entrants[last])
            }
            SelectionMethod::FitnessProportionate => {
                let min = population
                    .iter()
                    .map(|m| m.fitness())
                    .fold(f64::INFINITY, f64::min);
                let shift = if min < 0.0 { -min } else { 0.0 };
                let total: f64 = population.iter().map(|m| m.fitness() + shift).sum();
                if total <= 0.0 {
                    return self.rng.index(population.len());
                }
                let target = self.rng.unit() * total;
                let mut cumulative = 0.0;
                for (i, member) in population.iter().enumerate() {
                    cumulative += member.fitness() + shift;
                    if cumulative >= target {
                        return i;
                    }
                }
                population.len() - 1
            }
            SelectionMethod::Power { exponent } => {
                let u = self.rng.unit().powf(exponent);
                let pos = ((u * ranked.len() as f64).floor() as usize).min(ranked.len() - 1);
                ranked[pos]
            }
        }
    }

    /// Crossover or clone. The child inherits self-adaptive traits from the
    /// fitter parent. Returns whether both parents were the same member.
    fn breed<G: Genome>(&mut self, a: &Member<G>, b: &Member<G>) -> (Member<G>, bool) {
        let (fitter, other) = if b.fitness() > a.fitness() { (b, a) } else { (a, b) };
        let id = self.fresh_id();
        let prefer_equal = self.config.population.prefer_equal_length_genes;
        let mut child = if self.rng.chance(self.config.population.crossover_rate) {
            let genome = G::crossover(&fitter.genome, &other.genome, prefer_equal, &mut self.context());
            Member::offspring(id, genome, &[fitter, other])
        } else {
            Member::offspring(id, fitter.genome.clone(), &[fitter])
        };
        child.traits.mutation_rate = fitter.traits.mutation_rate;
        child.traits.mutation_amount = fitter.traits.mutation_amount;
        let inbred = child.parents.len() == 2 && a.id == b.id;
        (child, inbred)
    }

    /// Enforce hidden-node minimums and wire dead ends. Returns whether the
    /// genome changed.
    pub fn repair<G: Genome>(&mut self, genome: &mut G) -> bool {
        let nodes = genome.nodes();
        let inputs: Vec<usize> = kind_indices(nodes, NodeKind::Input);
        let outputs: Vec<usize> = kind_indices(nodes, NodeKind::Output);
        if inputs.is_empty() || outputs.is_empty() {
            warn!("Skipping repair of a genome without inputs or outputs");
            return false;
        }

        let mut changed = false;
        let min_hidden = self.config.population.min_hidden;
        while genome.hidden_count() < min_hidden {
            let mut ctx = self.context();
            if genome.mutate(MutationOp::AddNode, &mut ctx) {
                changed = true;
                continue;
            }
            let from = inputs[ctx.rng.index(inputs.len())];
            let to = outputs[ctx.rng.index(outputs.len())];
            if genome.connect(from, to, None, &mut ctx).is_none() {
                break;
            }
            changed = true;
        }

        let hidden: Vec<usize> = kind_indices(genome.nodes(), NodeKind::Hidden);
        for node in hidden {
            let conns = genome.connections();
            let has_out = conns.iter().any(|c| c.enabled && c.from == node);
            let has_in = conns.iter().any(|c| c.enabled && c.to == node);
            let mut ctx = self.context();
            if !has_out {
                let to = outputs[ctx.rng.index(outputs.len())];
                changed |= genome.connect(node, to, None, &mut ctx).is_some();
            }
            if !has_in {
                let from = inputs[ctx.rng.index(inputs.len())];
                changed |= genome.connect(from, node, None, &mut ctx).is_some();
            }
        }
        changed
    }

    /// Sparsity pruning when the schedule fires this generation.
    pub fn prune<G: Genome>(&mut self, genome: &mut G, generation: usize) -> bool {
        let Some(target) = pruning_target(&self.config.pruning, generation) else {
            return false;
        };
        let before = genome.connection_count();
        genome.prune_to_sparsity(target, self.config.pruning.method, &mut self.context());
        genome.connection_count() != before
    }

    /// Possibly mutate a member, retrying with other operators when one has
    /// nothing to act on. Returns whether the genome changed.
    pub fn mutate<G: Genome>(
        &mut self,
        member: &mut Member<G>,
        stats: &mut OperatorStats,
        constraints: &OperatorConstraints,
    ) -> bool {
        let config = self.config;
        let rate = member.traits.mutation_rate.unwrap_or(config.mutation.rate);
        if !self.rng.chance(rate) {
            return false;
        }
        let amount = member
            .traits
            .mutation_amount
            .unwrap_or(config.mutation.amount);
        let rounds = (amount.round() as usize).max(1);
        let boost = if config.operator_adaptation.enabled {
            config.operator_adaptation.boost
        } else {
            0
        };
        let bandit = config
            .operator_bandit
            .enabled
            .then_some(&config.operator_bandit);

        let mut changed = false;
        for _ in 0..rounds {
            let pool = stats.pool(&config.mutation.operators, boost);
            let mut candidates = constraints.allowed(&member.genome, &pool);
            loop {
                let Some(op) = select_operator(&candidates, constraints, stats, bandit, self.rng)
                else {
                    trace!("No applicable mutation operator for member {}", member.id);
                    break;
                };
                let applied = member.genome.mutate(op, &mut self.context());
                stats.record(op, applied);
                if applied {
                    changed = true;
                    break;
                }
                candidates.retain(|&c| c != op);
            }
        }
        changed
    }
}

fn kind_indices(nodes: &[crate::network::NodeGene], kind: NodeKind) -> Vec<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind == kind)
        .map(|(i, _)| i)
        .collect()
}

/// Target sparsity for `generation`, ramping linearly from the start
/// generation, or `None` when pruning does not fire.
pub fn pruning_target(config: &PruningConfig, generation: usize) -> Option<f64> {
    if !config.enabled || generation < config.start_generation {
        return None;
    }
    let since = generation - config.start_generation;
    if config.interval > 1 && since % config.interval != 0 {
        return None;
    }
    let progress = if config.ramp_generations == 0 {
        1.0
    } else {
        ((since + 1) as f64 / config.ramp_generations as f64).min(1.0)
    };
    Some(config.target_sparsity * progress)
}
