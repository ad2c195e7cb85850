//! Neuroevo - Speciated multi-objective neuroevolution.
//!
//! This crate evolves populations of graph-structured genomes with a
//! NEAT-style genetic algorithm: compatibility-based speciation with a
//! self-tuning threshold, fitness sharing, Pareto ranking over dynamic
//! objectives, and a set of adaptive controllers (complexity budget,
//! mutation self-adaptation, operator bandit, novelty archive, lineage
//! pressure).
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration, persisted state and telemetry records
//! - `network`: The genome contract and the reference `Network` genome
//! - `engine`: The generation loop and everything it drives
//!
//! # Example
//!
//! ```rust,no_run
//! use neuroevo::{engine::Neat, network::Network, schema::NeatConfig};
//!
//! let mut config = NeatConfig::new(2, 1);
//! config.population.size = 100;
//! config.population.seed = Some(42);
//!
//! let xor = [([0.0, 0.0], 0.0), ([0.0, 1.0], 1.0), ([1.0, 0.0], 1.0), ([1.0, 1.0], 0.0)];
//! let fitness = move |net: &Network| {
//!     4.0 - xor
//!         .iter()
//!         .map(|(input, expected)| (net.activate(input)[0] - expected).powi(2))
//!         .sum::<f64>()
//! };
//!
//! let mut neat = Neat::<Network>::new(config, fitness).unwrap();
//! let summary = neat.run(200, Some(3.9)).unwrap();
//! println!("Best fitness {:?} after {} generations", summary.best.score, summary.generations);
//! ```

pub mod engine;
pub mod network;
pub mod schema;

// Re-export commonly used types
pub use engine::{Neat, NeatError};
pub use network::{Genome, Network};
pub use schema::NeatConfig;
