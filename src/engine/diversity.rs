//! Sampled population diversity statistics.

use std::collections::HashMap;

use super::compat::{CompatibilityCache, CompatibilityParams};
use super::member::Member;
use super::rng::EngineRng;
use crate::network::Genome;
use crate::schema::DiversityStats;

/// Shannon entropy of the node degree distribution over enabled connections.
pub fn structural_entropy<G: Genome>(genome: &G) -> f64 {
    let n = genome.node_count();
    if n == 0 {
        return 0.0;
    }
    let mut degree = vec![0usize; n];
    for conn in genome.connections().iter().filter(|c| c.enabled) {
        if conn.from < n {
            degree[conn.from] += 1;
        }
        if conn.to < n {
            degree[conn.to] += 1;
        }
    }
    let mut histogram: HashMap<usize, usize> = HashMap::new();
    for d in degree {
        *histogram.entry(d).or_insert(0) += 1;
    }
    shannon(histogram.values().copied(), n)
}

fn shannon(counts: impl Iterator<Item = usize>, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    counts
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

/// Structural entropy memo scoped to one generation.
#[derive(Debug, Default)]
pub struct EntropyCache {
    generation: Option<usize>,
    values: HashMap<u64, f64>,
}

impl EntropyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_generation(&mut self, generation: usize) {
        if self.generation != Some(generation) {
            self.values.clear();
            self.generation = Some(generation);
        }
    }

    pub fn invalidate(&mut self, id: u64) {
        self.values.remove(&id);
    }

    pub fn get<G: Genome>(&mut self, id: u64, genome: &G) -> f64 {
        *self
            .values
            .entry(id)
            .or_insert_with(|| structural_entropy(genome))
    }
}

/// Counts of random node triples by the number of connected node pairs
/// among them.
pub fn motif_signature<G: Genome>(genome: &G, samples: usize, rng: &mut EngineRng) -> [u32; 4] {
    let mut signature = [0u32; 4];
    let n = genome.node_count();
    if n < 3 {
        return signature;
    }
    let linked = |a: usize, b: usize| {
        genome
            .connections()
            .iter()
            .any(|c| c.enabled && ((c.from == a && c.to == b) || (c.from == b && c.to == a)))
    };
    for _ in 0..samples {
        let a = rng.index(n);
        let mut b = rng.index(n - 1);
        if b >= a {
            b += 1;
        }
        let mut c = rng.index(n - 2);
        for taken in [a.min(b), a.max(b)] {
            if c >= taken {
                c += 1;
            }
        }
        let edges = linked(a, b) as usize + linked(b, c) as usize + linked(a, c) as usize;
        signature[edges] += 1;
    }
    signature
}

/// Entropy of the pooled motif class distribution.
pub fn motif_entropy<'a>(signatures: impl Iterator<Item = &'a [u32; 4]>) -> f64 {
    let mut pooled = [0usize; 4];
    for sig in signatures {
        for (slot, &count) in pooled.iter_mut().zip(sig) {
            *slot += count as usize;
        }
    }
    let total = pooled.iter().sum();
    shannon(pooled.into_iter(), total)
}

/// Up to `limit` index pairs; every pair when that is no more than `limit`.
pub fn sample_pairs(n: usize, limit: usize, rng: &mut EngineRng) -> Vec<(usize, usize)> {
    if n < 2 || limit == 0 {
        return Vec::new();
    }
    let all = n * (n - 1) / 2;
    if all <= limit {
        return (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
    }
    (0..limit)
        .map(|_| {
            let i = rng.index(n);
            let mut j = rng.index(n - 1);
            if j >= i {
                j += 1;
            }
            (i.min(j), i.max(j))
        })
        .collect()
}

/// Mean and population variance.
pub fn mean_var(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

/// Inputs to one diversity snapshot.
pub struct DiversitySampler<'a> {
    pub cache: &'a mut CompatibilityCache,
    pub params: &'a CompatibilityParams,
    pub entropy: &'a mut EntropyCache,
    pub rng: &'a mut EngineRng,
    pub pairs: usize,
    pub motif_samples: usize,
}

impl DiversitySampler<'_> {
    /// Compute the snapshot and record motif signatures on the members.
    pub fn sample<G: Genome>(&mut self, population: &mut [Member<G>]) -> DiversityStats {
        let pairs = sample_pairs(population.len(), self.pairs, self.rng);

        let distances: Vec<f64> = pairs
            .iter()
            .map(|&(i, j)| {
                let (a, b) = (&population[i], &population[j]);
                self.cache
                    .distance(a.id, &a.genome, b.id, &b.genome, self.params)
            })
            .collect();
        let (mean_compat, var_compat) = mean_var(&distances);

        let entropies: Vec<f64> = population
            .iter()
            .map(|m| self.entropy.get(m.id, &m.genome))
            .collect();
        let (mean_entropy, var_entropy) = mean_var(&entropies);

        for member in population.iter_mut() {
            let signature = motif_signature(&member.genome, self.motif_samples, self.rng);
            member.traits.motif_signature = Some(signature);
        }
        let graphlet_entropy =
            motif_entropy(population.iter().filter_map(|m| m.traits.motif_signature.as_ref()));

        let depths: Vec<f64> = population.iter().map(|m| m.depth as f64).collect();
        let (lineage_mean_depth, _) = mean_var(&depths);
        let gaps: Vec<f64> = pairs
            .iter()
            .map(|&(i, j)| (depths[i] - depths[j]).abs())
            .collect();
        let (lineage_mean_pair_dist, _) = mean_var(&gaps);

        DiversityStats {
            mean_compat,
            var_compat,
            mean_entropy,
            var_entropy,
            graphlet_entropy,
            lineage_mean_depth,
            lineage_mean_pair_dist,
            species_turnover: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{InnovationRegistry, MutationContext, MutationOp, Network};
    use crate::schema::SpeciationConfig;

    #[test]
    fn test_uniform_degrees_have_zero_entropy() {
        let mut rng = EngineRng::new(0);
        let mut reg = InnovationRegistry::new(1, 1);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        // One input wired to one output: both nodes have degree 1.
        let net = Network::minimal(1, 1, &mut ctx);
        assert_eq!(structural_entropy(&net), 0.0);

        let mut grown = Network::minimal(2, 1, &mut ctx);
        grown.mutate(MutationOp::AddNode, &mut ctx);
        assert!(structural_entropy(&grown) > 0.0);
    }

    #[test]
    fn test_motif_signature_counts_samples() {
        let mut rng = EngineRng::new(1);
        let mut reg = InnovationRegistry::new(3, 2);
        let mut ctx = MutationContext::new(&mut rng, &mut reg);
        let net = Network::minimal(3, 2, &mut ctx);
        let sig = motif_signature(&net, 20, ctx.rng);
        assert_eq!(sig.iter().sum::<u32>(), 20);
        // Inputs are never linked to each other, so no triple is a triangle.
        assert_eq!(sig[3], 0);
    }

    #[test]
    fn test_sample_pairs_exhaustive_when_small() {
        let mut rng = EngineRng::new(2);
        assert_eq!(sample_pairs(4, 10, &mut rng).len(), 6);
        let sampled = sample_pairs(50, 10, &mut rng);
        assert_eq!(sampled.len(), 10);
        assert!(sampled.iter().all(|(i, j)| i < j));
        assert!(sample_pairs(1, 10, &mut rng).is_empty());
    }

    #[test]
    fn test_sampler_fills_stats() {
        let mut rng = EngineRng::new(3);
        let mut reg = InnovationRegistry::new(2, 2);
        let mut pop: Vec<Member<Network>> = {
            let mut ctx = MutationContext::new(&mut rng, &mut reg);
            (0..8)
                .map(|i| {
                    let mut net = Network::minimal(2, 2, &mut ctx);
                    if i % 2 == 0 {
                        net.mutate(MutationOp::AddNode, &mut ctx);
                    }
                    let mut m = Member::new(i, net);
                    m.depth = i as usize;
                    m
                })
                .collect()
        };
        let params = CompatibilityParams::from_config(&SpeciationConfig::default());
        let mut cache = CompatibilityCache::new();
        let mut entropy = EntropyCache::new();
        let stats = DiversitySampler {
            cache: &mut cache,
            params: &params,
            entropy: &mut entropy,
            rng: &mut rng,
            pairs: 100,
            motif_samples: 6,
        }
        .sample(&mut pop);
        assert!(stats.mean_compat > 0.0);
        assert!((stats.lineage_mean_depth - 3.5).abs() < 1e-12);
        assert!(stats.lineage_mean_pair_dist > 0.0);
        assert!(pop.iter().all(|m| m.traits.motif_signature.is_some()));
    }
}
