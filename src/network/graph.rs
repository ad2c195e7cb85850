//! Reference genome: a directed graph of nodes and weighted connections.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    Activation, ConnectionGene, Genome, MutationContext, MutationOp, NodeGene, NodeKind,
    PruneMethod, innovation_of,
};

/// Standard deviation of weight and bias perturbations at `amount == 1`.
const PERTURB_SCALE: f64 = 0.5;

/// Probability that a gene disabled in either parent stays disabled.
const INHERIT_DISABLED: f64 = 0.75;

/// Node order is inputs, outputs, then hidden nodes in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    input: usize,
    output: usize,
    nodes: Vec<NodeGene>,
    connections: Vec<ConnectionGene>,
    /// Connection count before any sparsity pruning.
    #[serde(default)]
    baseline_connections: usize,
}

impl Network {
    pub fn input_size(&self) -> usize {
        self.input
    }

    pub fn output_size(&self) -> usize {
        self.output
    }

    /// Forward pass. Connections that close a cycle read the source node's
    /// value from earlier in the same pass (zero if not yet computed).
    pub fn activate(&self, inputs: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.nodes.len()];
        for (i, value) in inputs.iter().take(self.input).enumerate() {
            values[i] = *value;
        }

        let mut incoming: Vec<Vec<&ConnectionGene>> = vec![Vec::new(); self.nodes.len()];
        for conn in self.connections.iter().filter(|c| c.enabled) {
            incoming[conn.to].push(conn);
        }

        for idx in self.topological_order() {
            let node = &self.nodes[idx];
            if node.kind == NodeKind::Input {
                continue;
            }
            let sum: f64 = incoming[idx]
                .iter()
                .map(|c| values[c.from] * c.weight)
                .sum::<f64>()
                + node.bias;
            values[idx] = node.activation.apply(sum);
        }

        (self.input..self.input + self.output)
            .map(|i| values[i])
            .collect()
    }

    /// Kahn ordering over enabled connections; nodes caught in cycles are
    /// appended in index order.
    fn topological_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
        for conn in self.connections.iter().filter(|c| c.enabled) {
            if conn.from == conn.to {
                continue;
            }
            in_degree[conn.to] += 1;
            out[conn.from].push(conn.to);
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut head = 0;
        while head < queue.len() {
            let idx = queue[head];
            head += 1;
            order.push(idx);
            for &next in &out[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if order.len() < n {
            let placed: HashSet<usize> = order.iter().copied().collect();
            order.extend((0..n).filter(|i| !placed.contains(i)));
        }
        order
    }

    /// True if `to` can already reach `from`, so `from -> to` would close a cycle.
    fn creates_cycle(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![to];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(idx) = stack.pop() {
            if idx == from {
                return true;
            }
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.from == idx)
                    .map(|c| c.to),
            );
        }
        false
    }

    fn has_connection(&self, from: usize, to: usize) -> bool {
        self.connections
            .iter()
            .any(|c| c.from == from && c.to == to)
    }

    fn valid_endpoints(&self, from: usize, to: usize) -> bool {
        from < self.nodes.len()
            && to < self.nodes.len()
            && self.nodes[to].kind != NodeKind::Input
            && self.nodes[from].kind != NodeKind::Output
    }

    /// Whether removing connection `idx` keeps both endpoints attached.
    fn removable(&self, idx: usize) -> bool {
        let conn = &self.connections[idx];
        let other_in = self
            .connections
            .iter()
            .enumerate()
            .any(|(i, c)| i != idx && c.to == conn.to && c.enabled);
        let other_out = self
            .connections
            .iter()
            .enumerate()
            .any(|(i, c)| i != idx && c.from == conn.from && c.enabled);
        other_in && other_out
    }

    fn push_connection(
        &mut self,
        from: usize,
        to: usize,
        weight: f64,
        innovation: u64,
    ) -> usize {
        self.connections.push(ConnectionGene {
            from,
            to,
            weight,
            enabled: true,
            innovation: Some(innovation),
        });
        self.connections.len() - 1
    }

    /// Copy a parent gene into `self`, translating node ids to local indices.
    fn inherit(
        &mut self,
        index: &HashMap<u64, usize>,
        innovation: u64,
        (from_id, to_id): (u64, u64),
        gene: &ConnectionGene,
        disabled_elsewhere: bool,
        ctx: &mut MutationContext<'_>,
    ) {
        let (Some(&from), Some(&to)) = (index.get(&from_id), index.get(&to_id)) else {
            return;
        };
        if self.has_connection(from, to) || (ctx.acyclic && self.creates_cycle(from, to)) {
            return;
        }
        let enabled = if !gene.enabled || disabled_elsewhere {
            !ctx.rng.chance(INHERIT_DISABLED)
        } else {
            true
        };
        self.connections.push(ConnectionGene {
            from,
            to,
            weight: gene.weight,
            enabled,
            innovation: Some(innovation),
        });
    }

    fn add_node(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let enabled: Vec<usize> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled && c.from != c.to)
            .map(|(i, _)| i)
            .collect();
        if enabled.is_empty() {
            return false;
        }
        let idx = enabled[ctx.rng.index(enabled.len())];
        let (from, to, weight) = {
            let conn = &mut self.connections[idx];
            conn.enabled = false;
            (conn.from, conn.to, conn.weight)
        };
        let innovation = innovation_of(&*self, &self.connections[idx]);
        let from_id = self.nodes[from].id;
        let to_id = self.nodes[to].id;

        let mut record = ctx.innovations.split(innovation, from_id, to_id);
        if self.nodes.iter().any(|n| n.id == record.node_id) {
            // Same connection split twice in one lineage: mint a new node.
            let node_id = ctx.innovations.fresh_node();
            record.node_id = node_id;
            record.in_innovation = ctx.innovations.connection(from_id, node_id);
            record.out_innovation = ctx.innovations.connection(node_id, to_id);
        }

        self.nodes.push(NodeGene {
            id: record.node_id,
            kind: NodeKind::Hidden,
            bias: 0.0,
            activation: Activation::ALL[ctx.rng.index(Activation::ALL.len())],
        });
        let new_idx = self.nodes.len() - 1;
        self.push_connection(from, new_idx, 1.0, record.in_innovation);
        self.push_connection(new_idx, to, weight, record.out_innovation);
        true
    }

    fn sub_node(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let hidden: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].kind == NodeKind::Hidden)
            .collect();
        if hidden.is_empty() {
            return false;
        }
        let victim = hidden[ctx.rng.index(hidden.len())];

        let sources: Vec<usize> = self
            .connections
            .iter()
            .filter(|c| c.to == victim && c.from != victim && c.enabled)
            .map(|c| c.from)
            .collect();
        let targets: Vec<usize> = self
            .connections
            .iter()
            .filter(|c| c.from == victim && c.to != victim && c.enabled)
            .map(|c| c.to)
            .collect();

        self.connections
            .retain(|c| c.from != victim && c.to != victim);
        self.nodes.remove(victim);
        for conn in &mut self.connections {
            if conn.from > victim {
                conn.from -= 1;
            }
            if conn.to > victim {
                conn.to -= 1;
            }
        }
        let shift = |i: usize| if i > victim { i - 1 } else { i };

        // Bridge the gap so downstream nodes keep their inputs.
        for &s in &sources {
            for &t in &targets {
                let (s, t) = (shift(s), shift(t));
                if !self.has_connection(s, t) && !(ctx.acyclic && self.creates_cycle(s, t)) {
                    let innovation = ctx
                        .innovations
                        .connection(self.nodes[s].id, self.nodes[t].id);
                    let weight = ctx.rng.uniform(-1.0, 1.0);
                    self.push_connection(s, t, weight, innovation);
                }
            }
        }
        true
    }

    fn add_conn(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let n = self.nodes.len();
        let mut candidates = Vec::new();
        for from in 0..n {
            for to in 0..n {
                if from == to || !self.valid_endpoints(from, to) || self.has_connection(from, to) {
                    continue;
                }
                candidates.push((from, to));
            }
        }
        // Cycle checks are expensive; try candidates in random order.
        while !candidates.is_empty() {
            let pick = ctx.rng.index(candidates.len());
            let (from, to) = candidates.swap_remove(pick);
            if ctx.acyclic && self.creates_cycle(from, to) {
                continue;
            }
            let innovation = ctx
                .innovations
                .connection(self.nodes[from].id, self.nodes[to].id);
            let weight = ctx.rng.uniform(-1.0, 1.0);
            self.push_connection(from, to, weight, innovation);
            return true;
        }
        false
    }

    fn sub_conn(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let removable: Vec<usize> = (0..self.connections.len())
            .filter(|&i| self.removable(i))
            .collect();
        if removable.is_empty() {
            return false;
        }
        let idx = removable[ctx.rng.index(removable.len())];
        self.connections.remove(idx);
        true
    }

    fn mod_weight(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        if self.connections.is_empty() {
            return false;
        }
        let idx = ctx.rng.index(self.connections.len());
        let delta = ctx.rng.normal() * PERTURB_SCALE * ctx.amount.max(f64::EPSILON);
        self.connections[idx].weight += delta;
        true
    }

    fn mod_bias(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let candidates: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].kind != NodeKind::Input)
            .collect();
        if candidates.is_empty() {
            return false;
        }
        let idx = candidates[ctx.rng.index(candidates.len())];
        self.nodes[idx].bias += ctx.rng.normal() * PERTURB_SCALE * ctx.amount.max(f64::EPSILON);
        true
    }

    fn mod_activation(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let candidates: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].kind == NodeKind::Hidden)
            .collect();
        if candidates.is_empty() {
            return false;
        }
        let idx = candidates[ctx.rng.index(candidates.len())];
        let current = self.nodes[idx].activation;
        let choices: Vec<Activation> = Activation::ALL
            .iter()
            .copied()
            .filter(|a| *a != current)
            .collect();
        self.nodes[idx].activation = choices[ctx.rng.index(choices.len())];
        true
    }
}

impl Genome for Network {
    fn minimal(input: usize, output: usize, ctx: &mut MutationContext<'_>) -> Self {
        let mut nodes = Vec::with_capacity(input + output);
        for i in 0..input {
            nodes.push(NodeGene {
                id: i as u64,
                kind: NodeKind::Input,
                bias: 0.0,
                activation: Activation::Identity,
            });
        }
        for o in 0..output {
            nodes.push(NodeGene {
                id: (input + o) as u64,
                kind: NodeKind::Output,
                bias: ctx.rng.uniform(-0.1, 0.1),
                activation: Activation::Sigmoid,
            });
        }

        let mut network = Network {
            input,
            output,
            nodes,
            connections: Vec::with_capacity(input * output),
            baseline_connections: 0,
        };
        for i in 0..input {
            for o in input..input + output {
                let innovation = ctx.innovations.connection(i as u64, o as u64);
                let weight = ctx.rng.uniform(-1.0, 1.0);
                network.push_connection(i, o, weight, innovation);
            }
        }
        network.baseline_connections = network.connections.len();
        network
    }

    fn nodes(&self) -> &[NodeGene] {
        &self.nodes
    }

    fn connections(&self) -> &[ConnectionGene] {
        &self.connections
    }

    fn mutate(&mut self, op: MutationOp, ctx: &mut MutationContext<'_>) -> bool {
        match op {
            MutationOp::AddNode => self.add_node(ctx),
            MutationOp::SubNode => self.sub_node(ctx),
            MutationOp::AddConn => self.add_conn(ctx),
            MutationOp::SubConn => self.sub_conn(ctx),
            MutationOp::ModWeight => self.mod_weight(ctx),
            MutationOp::ModBias => self.mod_bias(ctx),
            MutationOp::ModActivation => self.mod_activation(ctx),
        }
    }

    fn crossover(
        fitter: &Self,
        other: &Self,
        prefer_equal_length: bool,
        ctx: &mut MutationContext<'_>,
    ) -> Self {
        // Nodes: all of the fitter parent, plus the other parent's when the
        // union is requested. Matching ids pick either parent's bias.
        let other_nodes: HashMap<u64, &NodeGene> =
            other.nodes.iter().map(|n| (n.id, n)).collect();
        let mut chosen: Vec<NodeGene> = fitter
            .nodes
            .iter()
            .map(|n| match other_nodes.get(&n.id) {
                Some(o) if ctx.rng.chance(0.5) => (*o).clone(),
                _ => n.clone(),
            })
            .collect();
        if prefer_equal_length {
            let present: HashSet<u64> = chosen.iter().map(|n| n.id).collect();
            chosen.extend(
                other
                    .nodes
                    .iter()
                    .filter(|n| n.kind == NodeKind::Hidden && !present.contains(&n.id))
                    .cloned(),
            );
        }
        let mut nodes: Vec<NodeGene> = chosen
            .iter()
            .filter(|n| n.kind == NodeKind::Input)
            .chain(chosen.iter().filter(|n| n.kind == NodeKind::Output))
            .cloned()
            .collect();
        nodes.extend(chosen.into_iter().filter(|n| n.kind == NodeKind::Hidden));
        let index: HashMap<u64, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let genes = |net: &Network| -> BTreeMap<u64, (u64, u64, ConnectionGene)> {
            net.connections
                .iter()
                .map(|c| {
                    (
                        innovation_of(net, c),
                        (net.nodes[c.from].id, net.nodes[c.to].id, c.clone()),
                    )
                })
                .collect()
        };
        let fitter_genes = genes(fitter);
        let other_genes = genes(other);

        let mut child = Network {
            input: fitter.input,
            output: fitter.output,
            nodes,
            connections: Vec::new(),
            baseline_connections: fitter.baseline_connections,
        };

        for (&innovation, (from_id, to_id, gene)) in &fitter_genes {
            match other_genes.get(&innovation) {
                Some((_, _, matching)) => {
                    let picked = if ctx.rng.chance(0.5) { gene } else { matching };
                    let disabled = !gene.enabled || !matching.enabled;
                    child.inherit(&index, innovation, (*from_id, *to_id), picked, disabled, ctx);
                }
                None => child.inherit(&index, innovation, (*from_id, *to_id), gene, false, ctx),
            }
        }
        if prefer_equal_length {
            for (&innovation, (from_id, to_id, gene)) in &other_genes {
                if !fitter_genes.contains_key(&innovation) {
                    child.inherit(&index, innovation, (*from_id, *to_id), gene, false, ctx);
                }
            }
        }
        child
    }

    fn connect(
        &mut self,
        from: usize,
        to: usize,
        weight: Option<f64>,
        ctx: &mut MutationContext<'_>,
    ) -> Option<usize> {
        if !self.valid_endpoints(from, to) || self.has_connection(from, to) {
            return None;
        }
        if ctx.acyclic && self.creates_cycle(from, to) {
            return None;
        }
        let innovation = ctx
            .innovations
            .connection(self.nodes[from].id, self.nodes[to].id);
        let weight = weight.unwrap_or_else(|| ctx.rng.uniform(-1.0, 1.0));
        Some(self.push_connection(from, to, weight, innovation))
    }

    fn disconnect(&mut self, from: usize, to: usize) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| !(c.from == from && c.to == to));
        self.connections.len() != before
    }

    fn prune_to_sparsity(
        &mut self,
        target_fraction: f64,
        method: PruneMethod,
        ctx: &mut MutationContext<'_>,
    ) {
        if self.baseline_connections == 0 {
            self.baseline_connections = self.connections.len();
        }
        let target = target_fraction.clamp(0.0, 1.0);
        let keep = ((self.baseline_connections as f64) * (1.0 - target)).ceil() as usize;
        let mut excess = self.connections.len().saturating_sub(keep);

        while excess > 0 {
            let mut order: Vec<usize> = (0..self.connections.len())
                .filter(|&i| self.removable(i))
                .collect();
            if order.is_empty() {
                break;
            }
            let idx = match method {
                PruneMethod::Magnitude => {
                    order.sort_by(|&a, &b| {
                        self.connections[a]
                            .weight
                            .abs()
                            .total_cmp(&self.connections[b].weight.abs())
                    });
                    order[0]
                }
                PruneMethod::Random => order[ctx.rng.index(order.len())],
            };
            self.connections.remove(idx);
            excess -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRng;
    use crate::network::InnovationRegistry;

    fn fixture() -> (EngineRng, InnovationRegistry) {
        (EngineRng::new(42), InnovationRegistry::new(2, 1))
    }

    #[test]
    fn test_minimal_network() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let net = Network::minimal(2, 1, &mut ctx);
        assert_eq!(net.nodes().len(), 3);
        assert_eq!(net.connections().len(), 2);
        assert_eq!(net.activate(&[0.5, -0.5]).len(), 1);
    }

    #[test]
    fn test_add_node_splits_connection() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut net = Network::minimal(2, 1, &mut ctx);
        assert!(net.mutate(MutationOp::AddNode, &mut ctx));
        assert_eq!(net.hidden_count(), 1);
        assert_eq!(net.connections().len(), 4);
        assert_eq!(net.enabled_connection_count(), 3);
    }

    #[test]
    fn test_sub_node_on_minimal_is_noop() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut net = Network::minimal(2, 1, &mut ctx);
        assert!(!net.mutate(MutationOp::SubNode, &mut ctx));
    }

    #[test]
    fn test_acyclic_connect_rejects_cycle() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut net = Network::minimal(2, 1, &mut ctx);
        net.mutate(MutationOp::AddNode, &mut ctx);
        net.mutate(MutationOp::AddNode, &mut ctx);
        // Hidden nodes sit at indices 3 and 4; wire 3 -> 4 then try 4 -> 3.
        let forward = net.connect(3, 4, Some(0.5), &mut ctx);
        let backward = net.connect(4, 3, Some(0.5), &mut ctx);
        assert!(forward.is_none() || backward.is_none());
        // Duplicate connections are refused.
        assert!(net.connect(0, 2, None, &mut ctx).is_none());
    }

    #[test]
    fn test_crossover_keeps_io() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut a = Network::minimal(2, 1, &mut ctx);
        let b = Network::minimal(2, 1, &mut ctx);
        a.mutate(MutationOp::AddNode, &mut ctx);
        let child = Network::crossover(&a, &b, false, &mut ctx);
        assert_eq!(child.input_size(), 2);
        assert_eq!(child.output_size(), 1);
        assert_eq!(child.hidden_count(), 1);
        let union = Network::crossover(&b, &a, true, &mut ctx);
        assert_eq!(union.hidden_count(), 1);
    }

    #[test]
    fn test_prune_to_sparsity_keeps_endpoints() {
        let mut rng = EngineRng::new(3);
        let mut reg = InnovationRegistry::new(3, 2);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut net = Network::minimal(3, 2, &mut ctx);
        net.prune_to_sparsity(0.5, PruneMethod::Magnitude, &mut ctx);
        assert!(net.connections().len() >= 3);
        assert!(net.connections().len() < 6);
        for o in 3..5 {
            assert!(net.connections().iter().any(|c| c.to == o));
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let (mut rng, mut reg) = fixture();
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let net = Network::minimal(2, 1, &mut ctx);
        let json = serde_json::to_string(&net).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
