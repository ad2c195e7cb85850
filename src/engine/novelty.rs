//! Novelty archive for behaviour-space exploration.

use std::collections::VecDeque;

use log::debug;
use rayon::prelude::*;

use super::member::Member;
use crate::schema::{ArchivePrune, NoveltyConfig};

/// Maps a genome to its behaviour descriptor.
pub type DescriptorFn<G> = Box<dyn Fn(&G) -> Vec<f64> + Send + Sync>;

/// An archived behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub id: u64,
    pub generation: usize,
    pub descriptor: Vec<f64>,
}

/// Archive of novel behaviours, oldest first.
#[derive(Debug, Clone)]
pub struct NoveltyArchive {
    entries: VecDeque<ArchiveEntry>,
    threshold: f64,
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl NoveltyArchive {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Mean distance from each descriptor to its `k` nearest neighbours in
    /// the current batch plus the archive.
    pub fn novelty(&self, descriptors: &[Vec<f64>], k: usize) -> Vec<f64> {
        descriptors
            .par_iter()
            .enumerate()
            .map(|(i, d)| {
                let mut distances: Vec<f64> = descriptors
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, other)| euclidean(d, other))
                    .chain(self.entries.iter().map(|e| euclidean(d, &e.descriptor)))
                    .collect();
                if distances.is_empty() {
                    return 0.0;
                }
                distances.sort_by(f64::total_cmp);
                let take = k.min(distances.len()).max(1);
                distances[..take].iter().sum::<f64>() / take as f64
            })
            .collect()
    }

    /// Score a generation, archive the novel members, adapt the threshold and
    /// enforce the cap. Returns novelty per descriptor.
    pub fn update(
        &mut self,
        ids: &[u64],
        descriptors: &[Vec<f64>],
        generation: usize,
        config: &NoveltyConfig,
    ) -> Vec<f64> {
        let scores = self.novelty(descriptors, config.k);
        let mut inserted = 0usize;
        for ((&id, descriptor), &score) in ids.iter().zip(descriptors).zip(&scores) {
            if score > self.threshold {
                self.entries.push_back(ArchiveEntry {
                    id,
                    generation,
                    descriptor: descriptor.clone(),
                });
                inserted += 1;
            }
        }

        if config.adaptive_threshold && !descriptors.is_empty() {
            let rate = inserted as f64 / descriptors.len() as f64;
            if rate > config.target_insertion_rate {
                self.threshold *= 1.0 + config.adjust;
            } else if rate < config.target_insertion_rate {
                self.threshold *= 1.0 - config.adjust;
            }
        }
        self.prune(config.archive_cap, config.prune);
        debug!(
            "Novelty archive: {} inserted, size {}, threshold {:.4}",
            inserted,
            self.entries.len(),
            self.threshold
        );
        scores
    }

    fn prune(&mut self, cap: usize, policy: ArchivePrune) {
        match policy {
            ArchivePrune::Fifo => {
                while self.entries.len() > cap {
                    self.entries.pop_front();
                }
            }
            ArchivePrune::Sparse => {
                while self.entries.len() > cap {
                    let Some(victim) = self.closest_pair_victim() else {
                        break;
                    };
                    self.entries.remove(victim);
                }
            }
        }
    }

    /// Later entry of the closest pair.
    fn closest_pair_victim(&self) -> Option<usize> {
        let n = self.entries.len();
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            for j in i + 1..n {
                let d = euclidean(&self.entries[i].descriptor, &self.entries[j].descriptor);
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((j, d));
                }
            }
        }
        match best {
            Some((j, _)) => Some(j),
            None if n > 0 => Some(0),
            None => None,
        }
    }
}

/// Replace each score by `(1 - w) * score + w * novelty`.
pub fn blend_scores<G>(population: &mut [Member<G>], novelty: &[f64], weight: f64) {
    for (member, &n) in population.iter_mut().zip(novelty) {
        member.traits.novelty = Some(n);
        member.score = Some((1.0 - weight) * member.fitness() + weight * n);
    }
}
