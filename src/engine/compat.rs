//! Compatibility distance between genomes.
//!
//! Genes are aligned by innovation number. The distance is
//! `c_e * E / N + c_d * D / N + c_w * W`, with `E` excess genes, `D`
//! disjoint genes, `W` the mean absolute weight difference of matching genes
//! and `N` the longer gene count (1 when both genomes are small).
//!
//! The alignment result is memoised per unordered id pair, and the sorted
//! gene list per genome id. Both caches are scoped to one generation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::network::{Genome, innovation_of};
use crate::schema::SpeciationConfig;

/// Coefficients of the distance formula. Excess and disjoint weights are
/// auto-tuned by speciation, so they live outside the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompatibilityParams {
    pub excess: f64,
    pub disjoint: f64,
    pub weight: f64,
    /// Gene count below which `N` is fixed at 1.
    pub normalize_threshold: usize,
}

impl CompatibilityParams {
    pub fn from_config(config: &SpeciationConfig) -> Self {
        Self {
            excess: config.excess_coeff,
            disjoint: config.disjoint_coeff,
            weight: config.weight_coeff,
            normalize_threshold: config.normalize_threshold,
        }
    }
}

/// Coefficient-free alignment of two gene lists.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Alignment {
    excess: usize,
    disjoint: usize,
    mean_weight_diff: f64,
    norm: f64,
}

impl Alignment {
    fn distance(&self, params: &CompatibilityParams) -> f64 {
        params.excess * self.excess as f64 / self.norm
            + params.disjoint * self.disjoint as f64 / self.norm
            + params.weight * self.mean_weight_diff
    }
}

type GeneList = Rc<Vec<(u64, f64)>>;

/// Per-generation memo of gene lists and pairwise alignments.
#[derive(Debug, Default)]
pub struct CompatibilityCache {
    generation: Option<usize>,
    genes: HashMap<u64, GeneList>,
    alignments: HashMap<(u64, u64), Alignment>,
}

impl CompatibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything when the generation changes.
    pub fn begin_generation(&mut self, generation: usize) {
        if self.generation != Some(generation) {
            self.clear();
            self.generation = Some(generation);
        }
    }

    pub fn clear(&mut self) {
        self.genes.clear();
        self.alignments.clear();
    }

    /// Forget a genome whose structure changed.
    pub fn invalidate(&mut self, id: u64) {
        self.genes.remove(&id);
        self.alignments.retain(|&(a, b), _| a != id && b != id);
    }

    pub fn cached_pairs(&self) -> usize {
        self.alignments.len()
    }

    /// Distance between two identified genomes.
    pub fn distance<G: Genome>(
        &mut self,
        a_id: u64,
        a: &G,
        b_id: u64,
        b: &G,
        params: &CompatibilityParams,
    ) -> f64 {
        if a_id == b_id {
            return 0.0;
        }
        let key = (a_id.min(b_id), a_id.max(b_id));
        if let Some(alignment) = self.alignments.get(&key) {
            return alignment.distance(params);
        }
        let genes_a = self.genes_of(a_id, a);
        let genes_b = self.genes_of(b_id, b);
        let alignment = align(&genes_a, &genes_b, params.normalize_threshold);
        self.alignments.insert(key, alignment);
        alignment.distance(params)
    }

    fn genes_of<G: Genome>(&mut self, id: u64, genome: &G) -> GeneList {
        Rc::clone(
            self.genes
                .entry(id)
                .or_insert_with(|| Rc::new(sorted_genes(genome))),
        )
    }
}

/// Uncached distance, for callers without stable ids.
pub fn compatibility<G: Genome>(a: &G, b: &G, params: &CompatibilityParams) -> f64 {
    align(&sorted_genes(a), &sorted_genes(b), params.normalize_threshold).distance(params)
}

fn sorted_genes<G: Genome>(genome: &G) -> Vec<(u64, f64)> {
    let mut genes: Vec<(u64, f64)> = genome
        .connections()
        .iter()
        .map(|c| (innovation_of(genome, c), c.weight))
        .collect();
    genes.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.total_cmp(&y.1)));
    genes
}

fn align(a: &[(u64, f64)], b: &[(u64, f64)], normalize_threshold: usize) -> Alignment {
    let max_a = a.last().map(|g| g.0);
    let max_b = b.last().map(|g| g.0);

    let (mut i, mut j) = (0, 0);
    let mut excess = 0;
    let mut disjoint = 0;
    let mut matching = 0usize;
    let mut weight_diff = 0.0;

    // Unmatched gene beyond the other genome's last innovation is excess.
    let classify = |innovation: u64, other_max: Option<u64>| match other_max {
        Some(max) if innovation <= max => false,
        _ => true,
    };

    while i < a.len() && j < b.len() {
        let (ia, wa) = a[i];
        let (ib, wb) = b[j];
        if ia == ib {
            matching += 1;
            weight_diff += (wa - wb).abs();
            i += 1;
            j += 1;
        } else if ia < ib {
            if classify(ia, max_b) {
                excess += 1;
            } else {
                disjoint += 1;
            }
            i += 1;
        } else {
            if classify(ib, max_a) {
                excess += 1;
            } else {
                disjoint += 1;
            }
            j += 1;
        }
    }
    for &(ia, _) in &a[i..] {
        if classify(ia, max_b) {
            excess += 1;
        } else {
            disjoint += 1;
        }
    }
    for &(ib, _) in &b[j..] {
        if classify(ib, max_a) {
            excess += 1;
        } else {
            disjoint += 1;
        }
    }

    let longest = a.len().max(b.len());
    let norm = if a.len() < normalize_threshold && b.len() < normalize_threshold {
        1.0
    } else {
        longest.max(1) as f64
    };
    Alignment {
        excess,
        disjoint,
        mean_weight_diff: if matching > 0 {
            weight_diff / matching as f64
        } else {
            0.0
        },
        norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRng;
    use crate::network::{InnovationRegistry, MutationContext, MutationOp, Network};
    use proptest::prelude::*;

    fn params() -> CompatibilityParams {
        CompatibilityParams::from_config(&SpeciationConfig::default())
    }

    fn evolved(seed: u64, steps: usize) -> (Network, Network) {
        let mut rng = EngineRng::new(seed);
        let mut reg = InnovationRegistry::new(3, 2);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let mut a = Network::minimal(3, 2, &mut ctx);
        let mut b = Network::minimal(3, 2, &mut ctx);
        for step in 0..steps {
            let op = MutationOp::ALL[step % MutationOp::ALL.len()];
            a.mutate(op, &mut ctx);
            if step % 2 == 0 {
                b.mutate(MutationOp::ALL[(step + 3) % MutationOp::ALL.len()], &mut ctx);
            }
        }
        (a, b)
    }

    #[test]
    fn test_self_distance_zero() {
        let (a, _) = evolved(1, 6);
        let mut cache = CompatibilityCache::new();
        assert_eq!(cache.distance(1, &a, 1, &a, &params()), 0.0);
        assert_eq!(compatibility(&a, &a, &params()), 0.0);
    }

    #[test]
    fn test_excess_and_disjoint_counts() {
        let a = [(1, 0.5), (2, 0.5), (4, 1.0)];
        let b = [(1, 0.0), (3, 0.0), (4, 0.0), (6, 0.0), (7, 0.0)];
        let al = align(&a, &b, 20);
        assert_eq!(al.excess, 2);
        assert_eq!(al.disjoint, 2);
        assert!((al.mean_weight_diff - 0.75).abs() < 1e-12);
        assert_eq!(al.norm, 1.0);
    }

    #[test]
    fn test_large_genomes_normalise() {
        let a: Vec<(u64, f64)> = (0..30).map(|i| (i, 0.0)).collect();
        let b: Vec<(u64, f64)> = (0..25).map(|i| (i, 0.0)).collect();
        let al = align(&a, &b, 20);
        assert_eq!(al.excess, 5);
        assert_eq!(al.norm, 30.0);
    }

    #[test]
    fn test_invalidate_drops_pairs() {
        let (a, b) = evolved(2, 4);
        let mut cache = CompatibilityCache::new();
        cache.begin_generation(0);
        cache.distance(1, &a, 2, &b, &params());
        assert_eq!(cache.cached_pairs(), 1);
        cache.invalidate(2);
        assert_eq!(cache.cached_pairs(), 0);
        cache.distance(1, &a, 2, &b, &params());
        cache.begin_generation(1);
        assert_eq!(cache.cached_pairs(), 0);
    }

    #[test]
    fn test_coefficients_apply_after_caching() {
        let (a, b) = evolved(3, 8);
        let mut cache = CompatibilityCache::new();
        let p = params();
        let before = cache.distance(1, &a, 2, &b, &p);
        let doubled = CompatibilityParams {
            excess: p.excess * 2.0,
            disjoint: p.disjoint * 2.0,
            weight: p.weight * 2.0,
            ..p
        };
        let after = cache.distance(1, &a, 2, &b, &doubled);
        assert!((after - 2.0 * before).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(seed in 0u64..500, steps in 0usize..20) {
            let (a, b) = evolved(seed, steps);
            let p = params();
            let mut forward = CompatibilityCache::new();
            let mut backward = CompatibilityCache::new();
            let ab = forward.distance(1, &a, 2, &b, &p);
            let ba = backward.distance(2, &b, 1, &a, &p);
            prop_assert!((ab - ba).abs() < 1e-12);
            prop_assert!(ab >= 0.0);
            prop_assert!((compatibility(&b, &a, &p) - ab).abs() < 1e-12);
        }
    }
}
