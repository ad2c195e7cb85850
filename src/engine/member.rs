//! Population members and their engine-owned per-generation fields.

use crate::schema::MemberRecord;

/// Fields the engine attaches to a member. Nothing here is persisted; a
/// freshly imported member starts with the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberTraits {
    /// Self-adaptive mutation probability, seeded lazily.
    pub mutation_rate: Option<f64>,
    /// Self-adaptive perturbation scale, seeded lazily.
    pub mutation_amount: Option<f64>,
    pub pareto_rank: usize,
    pub crowding: f64,
    pub novelty: Option<f64>,
    /// Counts of sampled node triples by number of edges among them (0..=3).
    pub motif_signature: Option<[u32; 4]>,
    /// Score as returned by the fitness function, before any adjustment.
    pub raw_score: Option<f64>,
}

/// One genome in the population arena.
#[derive(Debug, Clone)]
pub struct Member<G> {
    pub id: u64,
    pub genome: G,
    /// Zero, one or two parent ids.
    pub parents: Vec<u64>,
    pub depth: usize,
    pub score: Option<f64>,
    pub traits: MemberTraits,
}

impl<G> Member<G> {
    /// A founder: no parents, depth 0.
    pub fn new(id: u64, genome: G) -> Self {
        Self {
            id,
            genome,
            parents: Vec::new(),
            depth: 0,
            score: None,
            traits: MemberTraits::default(),
        }
    }

    /// An offspring of `parents`; depth is one past the deepest parent.
    pub fn offspring(id: u64, genome: G, parents: &[&Member<G>]) -> Self {
        let depth = parents.iter().map(|p| p.depth).max().map_or(0, |d| d + 1);
        Self {
            id,
            genome,
            parents: parents.iter().map(|p| p.id).collect(),
            depth,
            score: None,
            traits: MemberTraits::default(),
        }
    }

    /// Score with unscored members treated as zero.
    pub fn fitness(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}

impl<G: Clone> Member<G> {
    pub fn to_record(&self) -> MemberRecord<G> {
        MemberRecord {
            id: self.id,
            genome: self.genome.clone(),
            parents: self.parents.clone(),
            depth: self.depth,
            score: self.score,
        }
    }
}

impl<G> From<MemberRecord<G>> for Member<G> {
    fn from(record: MemberRecord<G>) -> Self {
        Self {
            id: record.id,
            genome: record.genome,
            parents: record.parents,
            depth: record.depth,
            score: record.score,
            traits: MemberTraits {
                raw_score: record.score,
                ..MemberTraits::default()
            },
        }
    }
}
