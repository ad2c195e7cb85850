//! Genome collaborator - the contract the evolutionary engine consumes.
//!
//! The engine never looks inside a genome beyond the structural accessors
//! declared by [`Genome`]. Everything else (how a mutation changes a graph,
//! how crossover aligns genes, how a network is activated) belongs to the
//! implementor. [`Network`] is the reference implementation shipped with the
//! crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use neuroevo::engine::EngineRng;
//! use neuroevo::network::{Genome, InnovationRegistry, MutationContext, MutationOp, Network};
//!
//! let mut rng = EngineRng::new(7);
//! let mut innovations = InnovationRegistry::new(2, 1);
//! let mut ctx = MutationContext::new(&mut rng, &mut innovations);
//!
//! let mut net = Network::minimal(2, 1, &mut ctx);
//! net.mutate(MutationOp::AddNode, &mut ctx);
//! println!("{} nodes, {} connections", net.nodes().len(), net.connections().len());
//! ```

mod graph;
mod innovation;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::EngineRng;

pub use graph::Network;
pub use innovation::{InnovationRegistry, SplitRecord};

/// Role of a node in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Input,
    Hidden,
    Output,
}

/// Activation (squash) function of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Sigmoid,
    Tanh,
    Relu,
    Identity,
    Gaussian,
}

impl Activation {
    pub const ALL: [Activation; 5] = [
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Relu,
        Activation::Identity,
        Activation::Gaussian,
    ];

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::Identity => x,
            Activation::Gaussian => (-x * x).exp(),
        }
    }
}

/// A node gene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeGene {
    /// Historical identifier, shared by every genome that owns the same node.
    pub id: u64,
    pub kind: NodeKind,
    pub bias: f64,
    #[serde(default)]
    pub activation: Activation,
}

/// A connection gene. `from` and `to` are indices into the node list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionGene {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    pub enabled: bool,
    /// Innovation number. Genomes built outside the registry may omit it.
    #[serde(default)]
    pub innovation: Option<u64>,
}

/// Mutation operators the engine schedules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationOp {
    AddNode,
    SubNode,
    AddConn,
    SubConn,
    ModWeight,
    ModBias,
    ModActivation,
}

impl MutationOp {
    pub const ALL: [MutationOp; 7] = [
        MutationOp::AddNode,
        MutationOp::SubNode,
        MutationOp::AddConn,
        MutationOp::SubConn,
        MutationOp::ModWeight,
        MutationOp::ModBias,
        MutationOp::ModActivation,
    ];

    /// Operators that grow the graph.
    pub fn is_growth(self) -> bool {
        matches!(self, MutationOp::AddNode | MutationOp::AddConn)
    }

    /// Operators that shrink the graph.
    pub fn is_shrink(self) -> bool {
        matches!(self, MutationOp::SubNode | MutationOp::SubConn)
    }

    /// Whether the operator changes topology (invalidates structural caches).
    pub fn is_structural(self) -> bool {
        self.is_growth() || self.is_shrink()
    }

    pub fn name(self) -> &'static str {
        match self {
            MutationOp::AddNode => "ADD_NODE",
            MutationOp::SubNode => "SUB_NODE",
            MutationOp::AddConn => "ADD_CONN",
            MutationOp::SubConn => "SUB_CONN",
            MutationOp::ModWeight => "MOD_WEIGHT",
            MutationOp::ModBias => "MOD_BIAS",
            MutationOp::ModActivation => "MOD_ACTIVATION",
        }
    }
}

/// Connection selection rule for sparsity pruning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PruneMethod {
    /// Remove the smallest-magnitude weights first.
    #[default]
    Magnitude,
    /// Remove uniformly random connections.
    Random,
}

/// Shared engine state a genome may touch while changing structure.
pub struct MutationContext<'a> {
    pub rng: &'a mut EngineRng,
    pub innovations: &'a mut InnovationRegistry,
    /// Perturbation scale for weight and bias operators.
    pub amount: f64,
    /// Reject connections that would close a cycle.
    pub acyclic: bool,
}

impl<'a> MutationContext<'a> {
    pub fn new(rng: &'a mut EngineRng, innovations: &'a mut InnovationRegistry) -> Self {
        Self {
            rng,
            innovations,
            amount: 1.0,
            acyclic: true,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_acyclic(mut self, acyclic: bool) -> Self {
        self.acyclic = acyclic;
        self
    }
}

/// The genome collaborator contract.
///
/// Cloning is a deep copy; serialization must round-trip.
pub trait Genome: Clone + Serialize + DeserializeOwned {
    /// Fresh random genome wired input to output.
    fn minimal(input: usize, output: usize, ctx: &mut MutationContext<'_>) -> Self;

    fn nodes(&self) -> &[NodeGene];

    fn connections(&self) -> &[ConnectionGene];

    /// Apply one operator. Returns `false` when the operator had nothing to act on.
    fn mutate(&mut self, op: MutationOp, ctx: &mut MutationContext<'_>) -> bool;

    /// Offspring of two parents; `fitter` donates disjoint and excess genes
    /// unless `prefer_equal_length` asks for the union of both.
    fn crossover(
        fitter: &Self,
        other: &Self,
        prefer_equal_length: bool,
        ctx: &mut MutationContext<'_>,
    ) -> Self;

    /// Add a connection between node indices. `None` for duplicates, invalid
    /// endpoints, or cycles under an acyclic context.
    fn connect(
        &mut self,
        from: usize,
        to: usize,
        weight: Option<f64>,
        ctx: &mut MutationContext<'_>,
    ) -> Option<usize>;

    fn disconnect(&mut self, from: usize, to: usize) -> bool;

    fn prune_to_sparsity(
        &mut self,
        target_fraction: f64,
        method: PruneMethod,
        ctx: &mut MutationContext<'_>,
    );

    fn node_count(&self) -> usize {
        self.nodes().len()
    }

    fn connection_count(&self) -> usize {
        self.connections().len()
    }

    fn hidden_count(&self) -> usize {
        self.nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::Hidden)
            .count()
    }

    fn enabled_connection_count(&self) -> usize {
        self.connections().iter().filter(|c| c.enabled).count()
    }
}

/// Deterministic stand-in for a missing innovation number (Cantor pairing of
/// the endpoint node ids).
pub fn structural_innovation(from_id: u64, to_id: u64) -> u64 {
    let sum = from_id.wrapping_add(to_id);
    (sum.wrapping_mul(sum.wrapping_add(1)) / 2).wrapping_add(to_id)
}

/// Innovation of a connection, falling back to the structural hash.
pub fn innovation_of<G: Genome>(genome: &G, conn: &ConnectionGene) -> u64 {
    conn.innovation.unwrap_or_else(|| {
        let nodes = genome.nodes();
        let from = nodes.get(conn.from).map_or(conn.from as u64, |n| n.id);
        let to = nodes.get(conn.to).map_or(conn.to as u64, |n| n.id);
        structural_innovation(from, to)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_innovation_is_ordered_pair() {
        assert_ne!(structural_innovation(1, 2), structural_innovation(2, 1));
        assert_eq!(structural_innovation(3, 5), structural_innovation(3, 5));
    }

    #[test]
    fn test_operator_classes() {
        assert!(MutationOp::AddNode.is_growth());
        assert!(MutationOp::SubConn.is_shrink());
        assert!(!MutationOp::ModWeight.is_structural());
    }

    #[test]
    fn test_activation_ranges() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert!((Activation::Gaussian.apply(0.0) - 1.0).abs() < 1e-12);
    }
}
