//! Export and import of engine state.
//!
//! A bundle carries the meta-state (shape, generation, options, innovation
//! registries), the population and optionally the generator state. Imports
//! validate the whole bundle before touching the engine, so a rejected
//! bundle leaves it unchanged.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;

use super::NeatError;
use super::member::Member;
use super::population::Neat;
use crate::network::{Genome, InnovationRegistry};
use crate::schema::{ExportBundle, MemberRecord, MetaState, STATE_VERSION, StateError};

impl<G: Genome> Neat<G> {
    /// Everything but the population.
    pub fn meta_state(&self) -> MetaState {
        MetaState {
            input: self.config.input,
            output: self.config.output,
            generation: self.generation,
            options: self.config.clone(),
            node_split_innovation_registry: self.innovations.split_entries(),
            connection_innovation_registry: self.innovations.connection_entries(),
            next_global_innovation_counter: self.innovations.next_innovation(),
        }
    }

    pub fn export_state(&self) -> ExportBundle<G> {
        ExportBundle {
            version: STATE_VERSION,
            meta: self.meta_state(),
            population: self.export_population(),
            rng: Some(self.rng.snapshot()),
        }
    }

    pub fn export_state_json(&self) -> Result<String, NeatError> {
        Ok(serde_json::to_string(&self.export_state())?)
    }

    /// Replace options, registries, population and generation from `bundle`.
    /// Derived state (species, caches, controllers, archives) starts over.
    pub fn import_state(&mut self, bundle: ExportBundle<G>) -> Result<(), NeatError> {
        bundle.validate()?;
        let ExportBundle {
            meta,
            population,
            rng,
            ..
        } = bundle;

        self.innovations = InnovationRegistry::from_entries(
            &meta.connection_innovation_registry,
            &meta.node_split_innovation_registry,
            meta.next_global_innovation_counter,
        );
        self.config = meta.options;
        self.population = population.into_iter().map(Member::from).collect();
        if let Some(state) = rng.as_ref() {
            self.rng.restore(state);
        }
        self.generation = meta.generation;
        self.reset_derived_state();
        info!(
            "Imported state at generation {} ({} members)",
            self.generation,
            self.population.len()
        );
        Ok(())
    }

    pub fn import_state_json(&mut self, json: &str) -> Result<(), NeatError> {
        let bundle: ExportBundle<G> = serde_json::from_str(json).map_err(StateError::from)?;
        self.import_state(bundle)
    }

    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<(), NeatError> {
        fs::write(path, self.export_state_json()?)?;
        Ok(())
    }

    pub fn load_state(&mut self, path: impl AsRef<Path>) -> Result<(), NeatError> {
        let json = fs::read_to_string(path)?;
        self.import_state_json(&json)
    }

    pub fn export_population(&self) -> Vec<MemberRecord<G>> {
        self.population.iter().map(Member::to_record).collect()
    }

    /// Replace the population only; options and registries are kept.
    pub fn import_population(&mut self, records: Vec<MemberRecord<G>>) -> Result<(), NeatError> {
        let expected = self.config.population.size;
        if records.len() != expected {
            return Err(StateError::PopulationSize {
                expected,
                found: records.len(),
            }
            .into());
        }
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id) {
                return Err(StateError::DuplicateId(record.id).into());
            }
        }
        self.population = records.into_iter().map(Member::from).collect();
        self.reset_derived_state();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::schema::NeatConfig;

    fn fitness(net: &Network) -> f64 {
        net.activate(&[1.0, 0.5])[0]
    }

    fn engine(seed: u64) -> Neat<Network> {
        let mut config = NeatConfig::new(2, 1);
        config.population.size = 12;
        config.population.seed = Some(seed);
        Neat::<Network>::new(config, fitness).unwrap()
    }

    #[test]
    fn test_meta_state_mirrors_engine() {
        let mut neat = engine(1);
        neat.evolve().unwrap();
        neat.evolve().unwrap();
        let meta = neat.meta_state();
        assert_eq!(meta.generation, 2);
        assert_eq!((meta.input, meta.output), (2, 1));
        assert_eq!(meta.options.population.size, 12);
        assert!(!meta.connection_innovation_registry.is_empty());
        assert!(meta.next_global_innovation_counter > 0);
    }

    #[test]
    fn test_round_trip_replays_identically() {
        let mut source = engine(3);
        for _ in 0..3 {
            source.evolve().unwrap();
        }
        let json = source.export_state_json().unwrap();

        let mut a = engine(100);
        let mut b = engine(200);
        a.import_state_json(&json).unwrap();
        b.import_state_json(&json).unwrap();
        assert_eq!(a.generation(), 3);
        let ids = |n: &Neat<Network>| n.population().iter().map(|m| m.id).collect::<Vec<_>>();
        let scores =
            |n: &Neat<Network>| n.population().iter().map(|m| m.score).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&source));
        assert_eq!(scores(&a), scores(&source));

        for _ in 0..3 {
            let x = a.evolve().unwrap();
            let y = b.evolve().unwrap();
            assert_eq!(x.id, y.id);
            assert_eq!(x.fitness(), y.fitness());
            assert_eq!(scores(&a), scores(&b));
        }
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_malformed_state_rejected_without_changes() {
        let mut source = engine(4);
        source.evolve().unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&source.export_state_json().unwrap()).unwrap();
        value["meta"].as_object_mut().unwrap().remove("generation");

        let mut target = engine(5);
        let before: Vec<u64> = target.population().iter().map(|m| m.id).collect();
        let err = target.import_state_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, NeatError::State(StateError::Malformed(_))));
        assert_eq!(target.generation(), 0);
        let after: Vec<u64> = target.population().iter().map(|m| m.id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_population_size_mismatch_rejected() {
        let source = engine(6);
        let mut bundle = source.export_state();
        bundle.population.pop();
        let mut target = engine(7);
        assert!(matches!(
            target.import_state(bundle),
            Err(NeatError::State(StateError::PopulationSize { expected: 12, found: 11 }))
        ));

        let mut records = source.export_population();
        records.truncate(3);
        assert!(target.import_population(records).is_err());
    }

    #[test]
    fn test_population_round_trip_keeps_ids_unique() {
        let mut source = engine(8);
        source.evolve().unwrap();
        let records = source.export_population();
        let top = records.iter().map(|r| r.id).max().unwrap();

        let mut target = engine(9);
        target.import_population(records.clone()).unwrap();
        for (member, record) in target.population().iter().zip(&records) {
            assert_eq!(member.id, record.id);
            assert_eq!(member.score, record.score);
        }
        target.evolve().unwrap();
        let fresh = target.population().iter().filter(|m| m.id > top).count();
        let elites = target.config().population.elitism;
        assert_eq!(fresh, 12 - elites);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut source = engine(10);
        source.evolve().unwrap();
        source.save_state(&path).unwrap();

        let mut target = engine(11);
        target.load_state(&path).unwrap();
        assert_eq!(target.generation(), 1);
        assert_eq!(
            target.meta_state().connection_innovation_registry,
            source.meta_state().connection_innovation_registry
        );
    }
}
