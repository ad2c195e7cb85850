//! Historical markings shared across the whole run.

use std::collections::BTreeMap;

/// Innovations created when a connection is split by a new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SplitRecord {
    pub node_id: u64,
    pub in_innovation: u64,
    pub out_innovation: u64,
}

/// Registry of connection and node-split innovations.
///
/// Node ids and connection innovations come from one global counter. Input
/// and output nodes own the first `input + output` ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InnovationRegistry {
    connections: BTreeMap<(u64, u64), u64>,
    splits: BTreeMap<u64, SplitRecord>,
    next: u64,
}

impl InnovationRegistry {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            splits: BTreeMap::new(),
            next: (input + output) as u64,
        }
    }

    /// Innovation for the connection between two node ids, assigned on first use.
    pub fn connection(&mut self, from_id: u64, to_id: u64) -> u64 {
        if let Some(&innovation) = self.connections.get(&(from_id, to_id)) {
            return innovation;
        }
        let innovation = self.bump();
        self.connections.insert((from_id, to_id), innovation);
        innovation
    }

    /// Split record for a connection innovation, created on first use.
    pub fn split(&mut self, connection: u64, from_id: u64, to_id: u64) -> SplitRecord {
        if let Some(record) = self.splits.get(&connection) {
            return *record;
        }
        let node_id = self.bump();
        let record = SplitRecord {
            node_id,
            in_innovation: self.connection(from_id, node_id),
            out_innovation: self.connection(node_id, to_id),
        };
        self.splits.insert(connection, record);
        record
    }

    /// A node id never handed out before.
    pub fn fresh_node(&mut self) -> u64 {
        self.bump()
    }

    pub fn next_innovation(&self) -> u64 {
        self.next
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Connection registry as plain `(from, to, innovation)` entries.
    pub fn connection_entries(&self) -> Vec<(u64, u64, u64)> {
        self.connections
            .iter()
            .map(|(&(from, to), &innovation)| (from, to, innovation))
            .collect()
    }

    /// Split registry as plain `(connection, record)` entries.
    pub fn split_entries(&self) -> Vec<(u64, SplitRecord)> {
        self.splits.iter().map(|(&k, &v)| (k, v)).collect()
    }

    /// Rebuild from exported entries.
    pub fn from_entries(
        connections: &[(u64, u64, u64)],
        splits: &[(u64, SplitRecord)],
        next: u64,
    ) -> Self {
        let connections: BTreeMap<_, _> = connections
            .iter()
            .map(|&(from, to, innovation)| ((from, to), innovation))
            .collect();
        let splits: BTreeMap<_, _> = splits.iter().copied().collect();
        let floor = connections
            .values()
            .copied()
            .chain(splits.values().map(|r| r.node_id))
            .max()
            .map_or(0, |m| m + 1);
        Self {
            connections,
            splits,
            next: next.max(floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_reuse() {
        let mut reg = InnovationRegistry::new(2, 1);
        let a = reg.connection(0, 2);
        let b = reg.connection(1, 2);
        assert_eq!(a, 3);
        assert_eq!(b, 4);
        assert_eq!(reg.connection(0, 2), a);
    }

    #[test]
    fn test_split_reuse() {
        let mut reg = InnovationRegistry::new(2, 1);
        let conn = reg.connection(0, 2);
        let first = reg.split(conn, 0, 2);
        let second = reg.split(conn, 0, 2);
        assert_eq!(first, second);
        assert_eq!(reg.connection(0, first.node_id), first.in_innovation);
    }

    #[test]
    fn test_entries_roundtrip() {
        let mut reg = InnovationRegistry::new(3, 2);
        let conn = reg.connection(0, 3);
        reg.split(conn, 0, 3);
        let rebuilt = InnovationRegistry::from_entries(
            &reg.connection_entries(),
            &reg.split_entries(),
            reg.next_innovation(),
        );
        assert_eq!(rebuilt, reg);
    }
}
