use crate::data::cluster::Cluster;
use crate::error::Result;
use crate::similarity::checker::SimilarityChecker;

/// Common contract of all clustering engines.
///
/// An engine owns its clusters exclusively; it is `Send` but not meant to be shared between
/// threads without external synchronization.
pub trait ClusteringEngine: Send {
    fn similarity_checker(&self) -> &dyn SimilarityChecker;

    /// Score at or above which two clusters are merged.
    fn similarity_threshold(&self) -> f64;

    /// Score below which a non-greedy engine would drop members; never applied by engines
    /// that only hold member identifiers.
    fn retain_threshold(&self) -> f64;

    /// All clusters held by the engine, sorted by precursor m/z then id.
    fn clusters(&self) -> Vec<&Cluster>;

    /// Queues clusters for the next [`ClusteringEngine::process_clusters`] call.
    ///
    /// Fails without queueing anything if one of the clusters has no members.
    fn add_clusters(&mut self, clusters: Vec<Cluster>) -> Result<()>;

    /// Processes the queued clusters; returns whether the held clusters changed.
    fn process_clusters(&mut self) -> Result<bool>;

    /// Open clusters plus queued, unprocessed ones.
    fn size(&self) -> usize;
}

/// Engine accepting one cluster at a time in non-decreasing precursor m/z order.
pub trait IncrementalClusteringEngine: ClusteringEngine {
    /// Adds one cluster and returns the clusters finalized by its arrival, in window order.
    fn add_incremental(&mut self, cluster: Cluster) -> Result<Vec<Cluster>>;
}

/// Rejects the first cluster without members.
pub(crate) fn check_members(clusters: &[Cluster]) -> Result<()> {
    match clusters.iter().find(|c| c.members().is_empty()) {
        Some(c) => Err(crate::error::Error::EmptyCluster { id: c.id().to_string() }),
        None => Ok(()),
    }
}
