//! Persisted engine state: meta-state and full export bundles.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{ConfigError, NeatConfig};
use crate::engine::RngState;
use crate::network::SplitRecord;

/// Current bundle format version.
pub const STATE_VERSION: u32 = 1;

/// Everything but the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaState {
    pub input: usize,
    pub output: usize,
    pub generation: usize,
    pub options: NeatConfig,
    /// `(split connection innovation, record)` pairs.
    pub node_split_innovation_registry: Vec<(u64, SplitRecord)>,
    /// `(from node id, to node id, innovation)` triples.
    pub connection_innovation_registry: Vec<(u64, u64, u64)>,
    pub next_global_innovation_counter: u64,
}

/// Serialized population member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord<G> {
    pub id: u64,
    pub genome: G,
    #[serde(default)]
    pub parents: Vec<u64>,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Meta-state bundled with the serialized population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle<G> {
    pub version: u32,
    pub meta: MetaState,
    pub population: Vec<MemberRecord<G>>,
    #[serde(default)]
    pub rng: Option<RngState>,
}

/// Persisted state errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Malformed state: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("Meta-state shape {input}x{output} does not match options {opt_input}x{opt_output}")]
    ShapeMismatch {
        input: usize,
        output: usize,
        opt_input: usize,
        opt_output: usize,
    },
    #[error("Population has {found} members, options require {expected}")]
    PopulationSize { expected: usize, found: usize },
    #[error("Duplicate genome id {0} in population")]
    DuplicateId(u64),
    #[error("Invalid options: {0}")]
    Options(#[from] ConfigError),
}

impl MetaState {
    pub fn validate(&self) -> Result<(), StateError> {
        if self.input != self.options.input || self.output != self.options.output {
            return Err(StateError::ShapeMismatch {
                input: self.input,
                output: self.output,
                opt_input: self.options.input,
                opt_output: self.options.output,
            });
        }
        self.options.validate()?;
        Ok(())
    }
}

impl<G> ExportBundle<G> {
    /// Check the bundle is complete and consistent before anything is applied.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.version != STATE_VERSION {
            return Err(StateError::Version {
                found: self.version,
                expected: STATE_VERSION,
            });
        }
        self.meta.validate()?;
        let expected = self.meta.options.population.size;
        if self.population.len() != expected {
            return Err(StateError::PopulationSize {
                expected,
                found: self.population.len(),
            });
        }
        let mut seen = HashSet::with_capacity(self.population.len());
        for member in &self.population {
            if !seen.insert(member.id) {
                return Err(StateError::DuplicateId(member.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MetaState {
        MetaState {
            input: 2,
            output: 1,
            generation: 3,
            options: NeatConfig::new(2, 1),
            node_split_innovation_registry: Vec::new(),
            connection_innovation_registry: vec![(0, 2, 3)],
            next_global_innovation_counter: 4,
        }
    }

    #[test]
    fn test_meta_state_keys() {
        let value = serde_json::to_value(meta()).unwrap();
        for key in [
            "input",
            "output",
            "generation",
            "options",
            "nodeSplitInnovationRegistry",
            "connectionInnovationRegistry",
            "nextGlobalInnovationCounter",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_missing_field_fails() {
        let mut value = serde_json::to_value(meta()).unwrap();
        value.as_object_mut().unwrap().remove("generation");
        let err = serde_json::from_value::<MetaState>(value).unwrap_err();
        assert!(err.to_string().contains("generation"));
    }

    #[test]
    fn test_bundle_size_mismatch() {
        let bundle: ExportBundle<u8> = ExportBundle {
            version: STATE_VERSION,
            meta: meta(),
            population: vec![MemberRecord {
                id: 1,
                genome: 0,
                parents: Vec::new(),
                depth: 0,
                score: None,
            }],
            rng: None,
        };
        assert!(matches!(
            bundle.validate(),
            Err(StateError::PopulationSize { .. })
        ));
    }
}
