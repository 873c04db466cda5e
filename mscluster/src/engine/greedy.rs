//! Windowed greedy clustering over a precursor-sorted stream.
//!
//! Every arrival is compared with the open clusters whose precursor m/z lies within the window
//! of its own, joins the best one scoring at or above the threshold, or opens a new cluster.
//! Open clusters falling more than one window below the latest arrival can no longer be
//! reached and are handed back to the caller.

use std::sync::Arc;

use log::{debug, trace};

use crate::algorithm::consensus::ConsensusBuilder;
use crate::algorithm::filter::{PeakFilter, Precursor};
use crate::config::{check_threshold, check_window_size};
use crate::data::cluster::{Cluster, ClusterComparator};
use crate::data::peak::Peak;
use crate::engine::traits::{check_members, ClusteringEngine, IncrementalClusteringEngine};
use crate::error::{Error, Result};
use crate::similarity::cdf::CumulativeDistributionFunction;
use crate::similarity::checker::{SimilarityChecker, SimilarityScore};
use crate::similarity::matching::share_major_peak;

// An open cluster with the comparison-filtered peaks of its current consensus.
struct WindowEntry {
    cluster: Cluster,
    comparison_peaks: Vec<Peak>,
}

/// Best candidate of one scan.
struct Candidate {
    index: usize,
    score: SimilarityScore,
    creation_sequence: u64,
}

/// Greedy incremental engine.
///
/// Input must arrive in non-decreasing precursor m/z order; a lower m/z than the previous
/// arrival is rejected with [`Error::OutOfOrder`] and leaves the engine untouched. Members
/// admitted to a cluster are never removed.
pub struct GreedyIncrementalClusteringEngine {
    checker: Arc<dyn SimilarityChecker>,
    comparator: Arc<dyn ClusterComparator>,
    consensus_builder: Arc<dyn ConsensusBuilder>,
    comparison_filter: Arc<dyn PeakFilter>,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
    window_size: f64,
    similarity_threshold: f64,
    retain_threshold: f64,
    min_comparisons: usize,
    major_peak_count: Option<usize>,
    // sorted by `comparator`
    active: Vec<WindowEntry>,
    queued: Vec<Cluster>,
    finalized: Vec<Cluster>,
    arrivals: u64,
    last_mz: Option<f64>,
}

impl GreedyIncrementalClusteringEngine {
    /// Creates an engine without calibration or major-peak pre-screen.
    ///
    /// # Arguments
    ///
    /// * `checker` - Similarity checker.
    /// * `comparator` - Order of the open window and of returned clusters.
    /// * `consensus_builder` - Merges the consensus of joining clusters.
    /// * `comparison_filter` - Filter applied to consensus peaks before every comparison.
    /// * `window_size` - Precursor m/z window, non-negative.
    /// * `similarity_threshold` - Join threshold in [0, 1].
    /// * `retain_threshold` - Stored and reported, in [0, 1].
    pub fn new(
        checker: Arc<dyn SimilarityChecker>,
        comparator: Arc<dyn ClusterComparator>,
        consensus_builder: Arc<dyn ConsensusBuilder>,
        comparison_filter: Arc<dyn PeakFilter>,
        window_size: f64,
        similarity_threshold: f64,
        retain_threshold: f64,
    ) -> Result<Self> {
        check_window_size(window_size)?;
        check_threshold("similarity_threshold", similarity_threshold)?;
        check_threshold("retain_threshold", retain_threshold)?;

        Ok(GreedyIncrementalClusteringEngine {
            checker,
            comparator,
            consensus_builder,
            comparison_filter,
            cdf: None,
            window_size,
            similarity_threshold,
            retain_threshold,
            min_comparisons: 0,
            major_peak_count: None,
            active: Vec::new(),
            queued: Vec::new(),
            finalized: Vec::new(),
            arrivals: 0,
            last_mz: None,
        })
    }

    /// Calibrates the best raw score of each arrival against `cdf` once at least
    /// `min_comparisons` clusters were scored.
    pub fn with_cdf(mut self, cdf: Arc<CumulativeDistributionFunction>) -> Self {
        self.cdf = Some(cdf);
        self
    }

    /// Number of scored clusters below which raw scores are used as is (default: 0).
    pub fn with_min_comparisons(mut self, min_comparisons: usize) -> Self {
        self.min_comparisons = min_comparisons;
        self
    }

    /// Only scores clusters sharing at least one of their `count` most intense peaks.
    pub fn with_major_peak_prescreen(mut self, count: usize) -> Self {
        self.major_peak_count = Some(count);
        self
    }

    pub fn window_size(&self) -> f64 {
        self.window_size
    }

    /// Clusters still open for new members, in window order.
    pub fn open_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.active.iter().map(|e| &e.cluster)
    }

    /// Evicts every open cluster, e.g. at the end of the input stream.
    pub fn flush(&mut self) -> Vec<Cluster> {
        let flushed: Vec<Cluster> = self.active.drain(..).map(|e| e.cluster).collect();
        debug!("flushed {} open clusters", flushed.len());
        flushed
    }

    /// Consumes the engine, returning retained and open clusters in comparator order.
    pub fn into_clusters(mut self) -> Vec<Cluster> {
        let mut clusters = std::mem::take(&mut self.finalized);
        clusters.extend(self.flush());
        let comparator = Arc::clone(&self.comparator);
        clusters.sort_by(|a, b| comparator.compare(a, b));
        clusters
    }

    // State-free checks of one arrival.
    fn check_arrival(&self, cluster: &Cluster) -> Result<()> {
        if cluster.members().is_empty() {
            return Err(Error::EmptyCluster { id: cluster.id().to_string() });
        }
        if cluster.consensus().is_empty() {
            return Err(Error::EmptySpectrum { id: cluster.id().to_string() });
        }
        if !cluster.precursor_mz().is_finite() {
            return Err(Error::InvalidInput(format!(
                "cluster {} has a non-finite precursor m/z",
                cluster.id()
            )));
        }
        Ok(())
    }

    fn check_order(&self, cluster: &Cluster) -> Result<()> {
        match self.last_mz {
            Some(previous) if cluster.precursor_mz() < previous => Err(Error::OutOfOrder {
                id: cluster.id().to_string(),
                previous,
                current: cluster.precursor_mz(),
            }),
            _ => Ok(()),
        }
    }

    fn comparison_peaks(&self, cluster: &Cluster) -> Vec<Peak> {
        let consensus = cluster.consensus();
        self.comparison_filter.apply(consensus.peaks().to_vec(), Precursor::of(consensus))
    }

    // Highest scoring open cluster within the window, ties to the earliest created one.
    fn best_candidate(&self, mz: f64, peaks: &[Peak]) -> (Option<Candidate>, usize) {
        let mut best: Option<Candidate> = None;
        let mut compared = 0;

        for (index, entry) in self.active.iter().enumerate() {
            if (entry.cluster.precursor_mz() - mz).abs() > self.window_size {
                continue;
            }
            if let Some(count) = self.major_peak_count {
                let tolerance = self.checker.fragment_tolerance();
                if !share_major_peak(&entry.comparison_peaks, peaks, count, tolerance) {
                    continue;
                }
            }

            let score = self.checker.score(&entry.comparison_peaks, peaks);
            compared += 1;

            let creation_sequence = entry.cluster.creation_sequence();
            let better = match &best {
                None => true,
                Some(b) => score.value > b.score.value
                    || (score.value == b.score.value && creation_sequence < b.creation_sequence),
            };
            if better {
                best = Some(Candidate { index, score, creation_sequence });
            }
        }
        (best, compared)
    }

    fn calibrated(&self, raw: f64, compared: usize) -> f64 {
        match &self.cdf {
            Some(cdf) if compared >= self.min_comparisons => 1.0 - cdf.calibrate(raw, compared),
            _ => raw,
        }
    }

    fn insert_sorted(&mut self, entry: WindowEntry) {
        let comparator = &self.comparator;
        let position = self.active
            .binary_search_by(|e| comparator.compare(&e.cluster, &entry.cluster))
            .unwrap_or_else(|p| p);
        self.active.insert(position, entry);
    }

    // Removes every open cluster lying more than one window below `mz`.
    fn evict_below(&mut self, mz: f64) -> Vec<Cluster> {
        let boundary = mz - self.window_size;
        if self.active.iter().all(|e| e.cluster.precursor_mz() >= boundary) {
            return Vec::new();
        }
        let (evicted, kept): (Vec<WindowEntry>, Vec<WindowEntry>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|e| e.cluster.precursor_mz() < boundary);
        self.active = kept;

        debug!("evicted {} clusters below precursor m/z {:.4}, {} open",
               evicted.len(), boundary, self.active.len());
        evicted.into_iter().map(|e| e.cluster).collect()
    }
}

impl IncrementalClusteringEngine for GreedyIncrementalClusteringEngine {
    fn add_incremental(&mut self, mut cluster: Cluster) -> Result<Vec<Cluster>> {
        // Step 1: reject before touching any state
        self.check_arrival(&cluster)?;
        self.check_order(&cluster)?;

        let mz = cluster.precursor_mz();
        self.last_mz = Some(mz);
        cluster.set_creation_sequence(self.arrivals);
        self.arrivals += 1;

        // Step 2: best match inside the window
        let peaks = self.comparison_peaks(&cluster);
        let (best, compared) = self.best_candidate(mz, &peaks);

        // Step 3: join or open
        let joined = best.filter(|c| {
            self.calibrated(c.score.value, compared) >= self.similarity_threshold
        });
        match joined {
            Some(candidate) => {
                let mut entry = self.active.remove(candidate.index);
                trace!("{} joins {} (score {:.4}, {} compared)",
                       cluster.id(), entry.cluster.id(), candidate.score.value, compared);
                entry.cluster.absorb(cluster, self.consensus_builder.as_ref());
                entry.comparison_peaks = self.comparison_peaks(&entry.cluster);
                self.insert_sorted(entry);
            }
            None => {
                trace!("{} opens a new cluster ({} compared)", cluster.id(), compared);
                self.insert_sorted(WindowEntry { cluster, comparison_peaks: peaks });
            }
        }

        // Step 4: eviction on current masses
        Ok(self.evict_below(mz))
    }
}

impl ClusteringEngine for GreedyIncrementalClusteringEngine {
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
        let mut clusters: Vec<&Cluster> = self.finalized
            .iter()
            .chain(self.open_clusters())
            .collect();
        clusters.sort_by(|a, b| self.comparator.compare(a, b));
        clusters
    }

    fn add_clusters(&mut self, clusters: Vec<Cluster>) -> Result<()> {
        check_members(&clusters)?;
        self.queued.extend(clusters);
        Ok(())
    }

    /// Feeds the queued clusters in ascending precursor m/z; clusters finalized on the way
    /// are retained and reported by [`ClusteringEngine::clusters`].
    fn process_clusters(&mut self) -> Result<bool> {
        if self.queued.is_empty() {
            return Ok(false);
        }
        let comparator = Arc::clone(&self.comparator);
        self.queued.sort_by(|a, b| {
            a.precursor_mz()
                .total_cmp(&b.precursor_mz())
                .then_with(|| comparator.compare(a, b))
        });

        // all checks up front so a failure keeps the queue
        for cluster in &self.queued {
            self.check_arrival(cluster)?;
        }
        if let Some(first) = self.queued.first() {
            self.check_order(first)?;
        }

        for cluster in std::mem::take(&mut self.queued) {
            let evicted = self.add_incremental(cluster)?;
            self.finalized.extend(evicted);
        }
        Ok(true)
    }

    fn size(&self) -> usize {
        self.active.len() + self.queued.len()
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

    fn engine(threshold: f64) -> GreedyIncrementalClusteringEngine {
        GreedyIncrementalClusteringEngine::new(
            Arc::new(FrankEtAlDotProduct::new(0.5, 15).unwrap()),
            Arc::new(MzThenIdComparator),
            Arc::new(AveragingConsensusBuilder::new(0.5, 150)),
            Arc::new(FilterPipeline::new()),
            4.0,
            threshold,
            0.6,
        ).unwrap()
    }

    fn cluster(id: &str, mz: f64, values: &[(f64, f64)]) -> Cluster {
        let peaks = values.iter().map(|&(m, i)| Peak::new(m, i)).collect();
        Cluster::from_spectrum(Spectrum::new(id, mz, 2, peaks))
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let checker: Arc<dyn SimilarityChecker> = Arc::new(FrankEtAlDotProduct::new(0.5, 15).unwrap());
        let build = |window: f64, threshold: f64, retain: f64| {
            GreedyIncrementalClusteringEngine::new(
                Arc::clone(&checker),
                Arc::new(MzThenIdComparator),
                Arc::new(AveragingConsensusBuilder::new(0.5, 150)),
                Arc::new(FilterPipeline::new()),
                window,
                threshold,
                retain,
            )
        };
        assert!(build(-1.0, 0.9, 0.6).is_err());
        assert!(build(4.0, 1.2, 0.6).is_err());
        assert!(build(4.0, -0.1, 0.6).is_err());
        assert!(build(4.0, 0.9, 2.0).is_err());
        assert!(build(0.0, 0.9, 0.6).is_ok());

        let engine = build(4.0, 0.9, 0.4).unwrap();
        assert!((engine.retain_threshold() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_eviction_boundary() {
        let mut engine = engine(0.9);
        assert!(engine.add_incremental(cluster("s1", 400.0, &[(100.0, 1.0)])).unwrap().is_empty());
        // exactly one window above: s1 stays open
        assert!(engine.add_incremental(cluster("s2", 404.0, &[(200.0, 1.0)])).unwrap().is_empty());
        assert_eq!(engine.size(), 2);

        let evicted = engine.add_incremental(cluster("s3", 404.5, &[(300.0, 1.0)])).unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id(), "s1");
        assert_eq!(engine.size(), 2);
    }

    #[test]
    fn test_eviction_uses_merged_mass() {
        let mut engine = engine(0.9);
        engine.add_incremental(cluster("s1", 400.0, &[(100.0, 1.0)])).unwrap();
        engine.add_incremental(cluster("s2", 403.9, &[(100.0, 1.0)])).unwrap();
        let open: Vec<&Cluster> = engine.open_clusters().collect();
        assert_eq!(open.len(), 1);
        assert!((open[0].precursor_mz() - 401.95).abs() < 1e-9);

        // 405 - 4 = 401 lies below the merged mass
        let evicted = engine.add_incremental(cluster("s3", 405.0, &[(300.0, 1.0)])).unwrap();
        assert!(evicted.is_empty());
        assert_eq!(engine.size(), 2);
    }

    #[test]
    fn test_ties_go_to_earliest_cluster() {
        let mut engine = engine(0.7);
        // same mass, "z" created first but ordered after "a" in the window
        engine.add_incremental(cluster("z", 400.0, &[(100.0, 1.0)])).unwrap();
        engine.add_incremental(cluster("a", 400.0, &[(200.0, 1.0)])).unwrap();
        engine.add_incremental(cluster("n", 400.0, &[(100.0, 1.0), (200.0, 1.0)])).unwrap();

        let clusters = engine.clusters();
        assert_eq!(clusters.len(), 2);
        let z = clusters.iter().find(|c| c.id() == "z").unwrap();
        assert_eq!(z.members(), &["z".to_string(), "n".to_string()]);
    }

    #[test]
    fn test_out_of_order_leaves_state_untouched() {
        let mut engine = engine(0.9);
        engine.add_incremental(cluster("s1", 401.0, &[(100.0, 1.0)])).unwrap();
        let result = engine.add_incremental(cluster("s2", 400.0, &[(100.0, 1.0)]));
        assert!(matches!(result, Err(Error::OutOfOrder { .. })));
        assert_eq!(engine.size(), 1);
        assert_eq!(engine.clusters()[0].size(), 1);

        // equal masses are in order
        assert!(engine.add_incremental(cluster("s3", 401.0, &[(100.0, 1.0)])).is_ok());
    }

    #[test]
    fn test_calibration_needs_min_comparisons() {
        let cdf = CumulativeDistributionFunction::new(vec![0.7, 1.0], vec![0.9, 0.99]).unwrap();
        let cdf = Arc::new(cdf);
        let a = || cluster("a", 400.0, &[(100.0, 4.0), (200.0, 3.0)]);
        let b = || cluster("b", 400.5, &[(100.0, 4.0), (300.0, 3.0)]);

        // raw 0.64 calibrates to 0.9
        let mut calibrated = engine(0.85).with_cdf(Arc::clone(&cdf));
        calibrated.add_incremental(a()).unwrap();
        calibrated.add_incremental(b()).unwrap();
        assert_eq!(calibrated.size(), 1);

        let mut raw = engine(0.85).with_cdf(cdf).with_min_comparisons(2);
        raw.add_incremental(a()).unwrap();
        raw.add_incremental(b()).unwrap();
        assert_eq!(raw.size(), 2);
    }

    #[test]
    fn test_major_peak_prescreen() {
        let a = || cluster("a", 400.0, &[(100.0, 5.0), (200.0, 4.0), (300.0, 1.0)]);
        let b = || cluster("b", 400.5, &[(100.0, 1.0), (200.0, 4.0), (300.0, 5.0)]);

        let mut plain = engine(0.1);
        plain.add_incremental(a()).unwrap();
        plain.add_incremental(b()).unwrap();
        assert_eq!(plain.size(), 1);

        let mut screened = engine(0.1).with_major_peak_prescreen(1);
        screened.add_incremental(a()).unwrap();
        screened.add_incremental(b()).unwrap();
        assert_eq!(screened.size(), 2);
    }

    #[test]
    fn test_process_clusters_sorts_queue() {
        let mut engine = engine(0.9);
        engine.add_clusters(vec![
            cluster("c", 420.0, &[(100.0, 1.0)]),
            cluster("a", 400.0, &[(100.0, 1.0)]),
            cluster("b", 401.0, &[(100.0, 1.0)]),
        ]).unwrap();
        assert_eq!(engine.size(), 3);

        assert!(engine.process_clusters().unwrap());
        let clusters = engine.clusters();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members(), &["a".to_string(), "b".to_string()]);
        assert_eq!(clusters[1].id(), "c");
        assert!(!engine.process_clusters().unwrap());
    }

    #[test]
    fn test_flush_and_into_clusters() {
        let mut engine = engine(0.9);
        engine.add_incremental(cluster("s1", 400.0, &[(100.0, 1.0)])).unwrap();
        engine.add_incremental(cluster("s2", 402.0, &[(200.0, 1.0)])).unwrap();
        let flushed = engine.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(engine.size(), 0);

        let mut engine = self::engine(0.9);
        engine.add_incremental(cluster("s2", 410.0, &[(200.0, 1.0)])).unwrap();
        engine.add_incremental(cluster("s1", 412.0, &[(100.0, 1.0)])).unwrap();
        let ids: Vec<String> = engine.into_clusters().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }
}
