use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::algorithm::consensus::ConsensusBuilder;
use crate::data::spectrum::Spectrum;
use crate::error::{Error, Result};

/// A group of spectra represented by a consensus spectrum.
///
/// Members are spectrum identifiers in arrival order. The precursor m/z of a cluster is
/// the precursor m/z of its consensus spectrum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    id: String,
    members: Vec<String>,
    consensus: Spectrum,
    creation_sequence: u64,
}

impl Cluster {
    /// Creates a cluster from existing members and their consensus.
    ///
    /// # Arguments
    ///
    /// * `id` - Cluster identifier.
    /// * `members` - Spectrum identifiers, must not be empty.
    /// * `consensus` - Consensus spectrum of the members.
    pub fn new(id: impl Into<String>, members: Vec<String>, consensus: Spectrum) -> Result<Self> {
        let id = id.into();
        if members.is_empty() {
            return Err(Error::EmptyCluster { id });
        }
        Ok(Cluster { id, members, consensus, creation_sequence: 0 })
    }

    /// Wraps a single spectrum as a one-member cluster.
    pub fn from_spectrum(spectrum: Spectrum) -> Self {
        Cluster {
            id: spectrum.id().to_string(),
            members: vec![spectrum.id().to_string()],
            consensus: spectrum,
            creation_sequence: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn consensus(&self) -> &Spectrum {
        &self.consensus
    }

    pub fn precursor_mz(&self) -> f64 {
        self.consensus.precursor_mz()
    }

    pub fn charge(&self) -> i32 {
        self.consensus.charge()
    }

    /// Number of member spectra.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Arrival order assigned by the engine that owns this cluster.
    pub fn creation_sequence(&self) -> u64 {
        self.creation_sequence
    }

    pub(crate) fn set_creation_sequence(&mut self, sequence: u64) {
        self.creation_sequence = sequence;
    }

    /// Merges `other` into this cluster: members are appended and the consensus is
    /// updated with both sides weighted by their member counts.
    pub(crate) fn absorb(&mut self, other: Cluster, builder: &dyn ConsensusBuilder) {
        let consensus = builder.merge_weighted(
            &self.consensus,
            self.size(),
            &other.consensus,
            other.size(),
        );
        self.consensus = consensus.with_id(self.id.clone());
        self.members.extend(other.members);
    }
}

impl Display for Cluster {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Cluster({}, precursor: {:.4}, members: {}, consensus peaks: {})",
               self.id, self.precursor_mz(), self.members.len(), self.consensus.peaks().len())
    }
}

/// Total order over clusters used for sorted output and window maintenance.
pub trait ClusterComparator: Send + Sync {
    fn compare(&self, a: &Cluster, b: &Cluster) -> Ordering;
}

/// Orders clusters by precursor m/z, ties broken by id.
#[derive(Clone, Copy, Debug, Default)]
pub struct MzThenIdComparator;

impl ClusterComparator for MzThenIdComparator {
    fn compare(&self, a: &Cluster, b: &Cluster) -> Ordering {
        a.precursor_mz()
            .total_cmp(&b.precursor_mz())
            .then_with(|| a.id().cmp(b.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::consensus::AveragingConsensusBuilder;
    use crate::data::peak::Peak;

    fn spectrum(id: &str, mz: f64) -> Spectrum {
        Spectrum::new(id, mz, 2, vec![Peak::new(150.0, 10.0), Peak::new(250.0, 20.0)])
    }

    #[test]
    fn test_empty_members_rejected() {
        let result = Cluster::new("c1", vec![], spectrum("c1", 400.0));
        assert!(matches!(result, Err(Error::EmptyCluster { .. })));
    }

    #[test]
    fn test_from_spectrum() {
        let cluster = Cluster::from_spectrum(spectrum("s1", 400.0));
        assert_eq!(cluster.id(), "s1");
        assert_eq!(cluster.members(), &["s1".to_string()]);
        assert_eq!(cluster.size(), 1);
        assert!((cluster.precursor_mz() - 400.0).abs() < 1e-12);
    }

    #[test]
    fn test_absorb_keeps_id_and_appends_members() {
        let builder = AveragingConsensusBuilder::new(0.5, 150);
        let mut cluster = Cluster::from_spectrum(spectrum("s1", 400.0));
        cluster.absorb(Cluster::from_spectrum(spectrum("s2", 401.0)), &builder);

        assert_eq!(cluster.id(), "s1");
        assert_eq!(cluster.consensus().id(), "s1");
        assert_eq!(cluster.members(), &["s1".to_string(), "s2".to_string()]);
        assert!((cluster.precursor_mz() - 400.5).abs() < 1e-12);
    }

    #[test]
    fn test_comparator_orders_by_mz_then_id() {
        let a = Cluster::from_spectrum(spectrum("b", 400.0));
        let b = Cluster::from_spectrum(spectrum("a", 400.0));
        let c = Cluster::from_spectrum(spectrum("c", 399.0));
        let mut clusters = vec![a, b, c];
        clusters.sort_by(|x, y| MzThenIdComparator.compare(x, y));
        let ids: Vec<&str> = clusters.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
