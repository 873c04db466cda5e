use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;

use crate::algorithm::consensus::ConsensusBuilder;
use crate::algorithm::filter::{PeakFilter, Precursor};
use crate::config::check_threshold;
use crate::data::cluster::{Cluster, ClusterComparator};
use crate::data::peak::Peak;
use crate::engine::traits::{check_members, ClusteringEngine};
use crate::error::{Error, Result};
use crate::similarity::checker::SimilarityChecker;

struct Entry {
    cluster: Cluster,
    comparison_peaks: Vec<Peak>,
}

/// All-pairs engine for small or unsorted inputs.
///
/// Each scan scores every pair of held clusters and merges the qualifying pairs, highest score
/// first, ties by the lower creation sequences; a cluster takes part in at most one merge per
/// scan and the earlier created side absorbs the other. Scans repeat until none merges.
pub struct BatchClusteringEngine {
    checker: Arc<dyn SimilarityChecker>,
    comparator: Arc<dyn ClusterComparator>,
    consensus_builder: Arc<dyn ConsensusBuilder>,
    comparison_filter: Arc<dyn PeakFilter>,
    similarity_threshold: f64,
    retain_threshold: f64,
    entries: Vec<Entry>,
    queued: Vec<Cluster>,
    next_sequence: u64,
}

impl BatchClusteringEngine {
    pub fn new(
        checker: Arc<dyn SimilarityChecker>,
        comparator: Arc<dyn ClusterComparator>,
        consensus_builder: Arc<dyn ConsensusBuilder>,
        comparison_filter: Arc<dyn PeakFilter>,
        similarity_threshold: f64,
        retain_threshold: f64,
    ) -> Result<Self> {
        check_threshold("similarity_threshold", similarity_threshold)?;
        check_threshold("retain_threshold", retain_threshold)?;
        Ok(BatchClusteringEngine {
            checker,
            comparator,
            consensus_builder,
            comparison_filter,
            similarity_threshold,
            retain_threshold,
            entries: Vec::new(),
            queued: Vec::new(),
            next_sequence: 0,
        })
    }

    /// Consumes the engine, returning held and queued clusters in comparator order.
    pub fn into_clusters(self) -> Vec<Cluster> {
        let comparator = self.comparator;
        let mut clusters: Vec<Cluster> = self.entries
            .into_iter()
            .map(|e| e.cluster)
            .chain(self.queued)
            .collect();
        clusters.sort_by(|a, b| comparator.compare(a, b));
        clusters
    }

    fn entry(&self, cluster: Cluster) -> Entry {
        let consensus = cluster.consensus();
        let comparison_peaks = self.comparison_filter
            .apply(consensus.peaks().to_vec(), Precursor::of(consensus));
        Entry { cluster, comparison_peaks }
    }

    // Qualifying pairs as (score, i, j), best first.
    fn qualifying_pairs(&self) -> Vec<(f64, usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.entries.len() {
            for j in (i + 1)..self.entries.len() {
                let score = self.checker.score(
                    &self.entries[i].comparison_peaks,
                    &self.entries[j].comparison_peaks,
                );
                if score.value >= self.similarity_threshold {
                    pairs.push((score.value, i, j));
                }
            }
        }

        let sequences = |i: usize, j: usize| {
            let a = self.entries[i].cluster.creation_sequence();
            let b = self.entries[j].cluster.creation_sequence();
            (a.min(b), a.max(b))
        };
        pairs.sort_by(|x, y| {
            y.0.partial_cmp(&x.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| sequences(x.1, x.2).cmp(&sequences(y.1, y.2)))
        });
        pairs
    }

    // One scan; returns the number of merges.
    fn merge_scan(&mut self) -> usize {
        let pairs = self.qualifying_pairs();
        if pairs.is_empty() {
            return 0;
        }

        // Step 1: pick disjoint pairs, earlier created side first
        let mut used = vec![false; self.entries.len()];
        let mut merges = Vec::new();
        for (_, i, j) in pairs {
            if used[i] || used[j] {
                continue;
            }
            used[i] = true;
            used[j] = true;
            let (seq_i, seq_j) = (
                self.entries[i].cluster.creation_sequence(),
                self.entries[j].cluster.creation_sequence(),
            );
            if seq_i <= seq_j {
                merges.push((i, j));
            } else {
                merges.push((j, i));
            }
        }

        // Step 2: apply on owned slots
        let mut slots: Vec<Option<Entry>> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(Some)
            .collect();
        for &(keeper, absorbed) in &merges {
            let pair = (slots[keeper].take(), slots[absorbed].take());
            let (Some(mut kept), Some(other)) = pair else {
                continue;
            };
            kept.cluster.absorb(other.cluster, self.consensus_builder.as_ref());
            slots[keeper] = Some(self.entry(kept.cluster));
        }
        self.entries = slots.into_iter().flatten().collect();
        merges.len()
    }
}

impl ClusteringEngine for BatchClusteringEngine {
    fn similarity_checker(&self) -> &dyn SimilarityChecker {
        self.checker.as_ref()
    }

    fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    fn retain_threshold(&self) -> f64 {
        self.retain_threshold
    }

    fn clusters(&self) -> Vec<&Cluster> {
        let mut clusters: Vec<&Cluster> = self.entries.iter().map(|e| &e.cluster).collect();
        clusters.sort_by(|a, b| self.comparator.compare(a, b));
        clusters
    }

    /// Queues clusters in any order; creation sequences follow the queueing order.
    fn add_clusters(&mut self, clusters: Vec<Cluster>) -> Result<()> {
        check_members(&clusters)?;
        if let Some(empty) = clusters.iter().find(|c| c.consensus().is_empty()) {
            return Err(Error::EmptySpectrum { id: empty.id().to_string() });
        }
        for mut cluster in clusters {
            cluster.set_creation_sequence(self.next_sequence);
            self.next_sequence += 1;
            self.queued.push(cluster);
        }
        Ok(())
    }

    /// Merges until a full scan finds no qualifying pair.
    fn process_clusters(&mut self) -> Result<bool> {
        let added = !self.queued.is_empty();
        for cluster in std::mem::take(&mut self.queued) {
            let entry = self.entry(cluster);
            self.entries.push(entry);
        }

        let mut scans = 0;
        let mut merged = 0;
        loop {
            let merges = self.merge_scan();
            scans += 1;
            if merges == 0 {
                break;
            }
            merged += merges;
            debug!("batch scan {} merged {} pairs, {} clusters left",
                   scans, merges, self.entries.len());
        }
        Ok(added || merged > 0)
    }

    fn size(&self) -> usize {
        self.entries.len() + self.queued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::consensus::AveragingConsensusBuilder;
    use crate::algorithm::filter::FilterPipeline;
    use crate::data::cluster::MzThenIdComparator;
    use crate::data::spectrum::Spectrum;
    use crate::similarity::dot_product::FrankEtAlDotProduct;

    fn engine(threshold: f64) -> BatchClusteringEngine {
        BatchClusteringEngine::new(
            Arc::new(FrankEtAlDotProduct::new(0.5, 15).unwrap()),
            Arc::new(MzThenIdComparator),
            Arc::new(AveragingConsensusBuilder::new(0.5, 150)),
            Arc::new(FilterPipeline::new()),
            threshold,
            0.6,
        ).unwrap()
    }

    fn cluster(id: &str, mz: f64, values: &[(f64, f64)]) -> Cluster {
        let peaks = values.iter().map(|&(m, i)| Peak::new(m, i)).collect();
        Cluster::from_spectrum(Spectrum::new(id, mz, 2, peaks))
    }

    #[test]
    fn test_merges_to_fixed_point() {
        let mut engine = engine(0.9);
        engine.add_clusters(vec![
            cluster("a", 400.0, &[(100.0, 1.0), (200.0, 2.0)]),
            cluster("b", 401.0, &[(100.0, 1.0), (200.0, 2.0)]),
            cluster("c", 402.0, &[(100.0, 1.0), (200.0, 2.0)]),
            cluster("d", 402.0, &[(300.0, 1.0)]),
        ]).unwrap();
        assert_eq!(engine.size(), 4);

        assert!(engine.process_clusters().unwrap());
        let clusters = engine.clusters();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id(), "a");
        assert_eq!(clusters[0].members(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(clusters[1].id(), "d");
    }

    #[test]
    fn test_second_process_is_unchanged() {
        let mut engine = engine(0.9);
        engine.add_clusters(vec![
            cluster("a", 400.0, &[(100.0, 1.0)]),
            cluster("b", 900.0, &[(100.0, 1.0)]),
        ]).unwrap();
        assert!(engine.process_clusters().unwrap());
        assert!(!engine.process_clusters().unwrap());
        // no window: distant precursors still merge
        assert_eq!(engine.clusters().len(), 1);
    }

    #[test]
    fn test_unmergeable_input_still_changes() {
        let mut engine = engine(0.9);
        engine.add_clusters(vec![cluster("a", 400.0, &[(100.0, 1.0)])]).unwrap();
        assert!(engine.process_clusters().unwrap());
        assert!(!engine.process_clusters().unwrap());
        assert_eq!(engine.size(), 1);
    }

    #[test]
    fn test_rejects_empty_members() {
        let json = r#"{"id":"e","members":[],"consensus":{"id":"e","precursor_mz":400.0,"charge":2,
            "peaks":[{"mz":100.0,"intensity":1.0}],"total_intensity":1.0},"creation_sequence":0}"#;
        let empty: Cluster = serde_json::from_str(json).unwrap();
        let mut engine = engine(0.9);
        let result = engine.add_clusters(vec![cluster("a", 400.0, &[(100.0, 1.0)]), empty]);
        assert!(matches!(result, Err(Error::EmptyCluster { .. })));
        assert_eq!(engine.size(), 0);
    }
}
