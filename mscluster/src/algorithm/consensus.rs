//! Incremental consensus spectra.
//!
//! The consensus of a cluster is the member-weighted mean spectrum: peaks falling within the
//! fragment tolerance of each other share a bin whose intensity is the mean over all members
//! (absent members contribute zero) and whose m/z is the intensity-weighted centroid.

use std::cmp::Reverse;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::config::ClusteringParams;
use crate::data::peak::Peak;
use crate::data::spectrum::Spectrum;

/// Strategy merging a spectrum (or another consensus) into a running consensus.
pub trait ConsensusBuilder: Send + Sync {
    /// Merges `incoming`, standing for `incoming_count` members, into `consensus`, standing for
    /// `consensus_count` members. The returned spectrum carries the member-weighted mean
    /// precursor m/z and the identifier of `consensus`.
    fn merge_weighted(
        &self,
        consensus: &Spectrum,
        consensus_count: usize,
        incoming: &Spectrum,
        incoming_count: usize,
    ) -> Spectrum;

    /// Merges a single new spectrum into a consensus built from `member_count` spectra.
    fn merge(&self, consensus: &Spectrum, member_count: usize, spectrum: &Spectrum) -> Spectrum {
        self.merge_weighted(consensus, member_count, spectrum, 1)
    }

    /// Folds all spectra into one consensus, in order.
    fn build(&self, spectra: &[Spectrum]) -> Option<Spectrum> {
        let (first, rest) = spectra.split_first()?;
        let consensus = rest.iter()
            .enumerate()
            .fold(first.clone(), |consensus, (i, s)| self.merge(&consensus, i + 1, s));
        Some(consensus)
    }
}

/// Running weighted-average consensus with a cap on stored peaks.
#[derive(Clone, Debug)]
pub struct AveragingConsensusBuilder {
    pub fragment_tolerance: f64,
    pub max_peaks: usize,
}

impl AveragingConsensusBuilder {
    pub fn new(fragment_tolerance: f64, max_peaks: usize) -> Self {
        AveragingConsensusBuilder { fragment_tolerance, max_peaks }
    }
}

impl ConsensusBuilder for AveragingConsensusBuilder {
    fn merge_weighted(
        &self,
        consensus: &Spectrum,
        consensus_count: usize,
        incoming: &Spectrum,
        incoming_count: usize,
    ) -> Spectrum {
        let w_c = consensus_count.max(1) as f64;
        let w_i = incoming_count.max(1) as f64;
        let total = w_c + w_i;

        let a = consensus.peaks();
        let b = incoming.peaks();
        let mut merged = Vec::with_capacity(a.len() + b.len());

        // single sweep over both mass-sorted lists
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let (pa, pb) = (a[i], b[j]);
            if (pa.mz - pb.mz).abs() <= self.fragment_tolerance {
                let weight_a = w_c * pa.intensity;
                let weight_b = w_i * pb.intensity;
                let mz = if weight_a + weight_b > 0.0 {
                    (weight_a * pa.mz + weight_b * pb.mz) / (weight_a + weight_b)
                } else {
                    (w_c * pa.mz + w_i * pb.mz) / total
                };
                merged.push(Peak::new(mz, (weight_a + weight_b) / total));
                i += 1;
                j += 1;
            } else if pa.mz < pb.mz {
                merged.push(Peak::new(pa.mz, w_c * pa.intensity / total));
                i += 1;
            } else {
                merged.push(Peak::new(pb.mz, w_i * pb.intensity / total));
                j += 1;
            }
        }
        merged.extend(a[i..].iter().map(|p| Peak::new(p.mz, w_c * p.intensity / total)));
        merged.extend(b[j..].iter().map(|p| Peak::new(p.mz, w_i * p.intensity / total)));

        let precursor_mz = (w_c * consensus.precursor_mz() + w_i * incoming.precursor_mz()) / total;
        let charge = if consensus.charge() != 0 { consensus.charge() } else { incoming.charge() };

        Spectrum::new(consensus.id(), precursor_mz, charge, cap_peaks(merged, self.max_peaks))
    }
}

/// Default consensus strategy for the given parameters.
pub fn consensus_builder(params: &ClusteringParams) -> Arc<dyn ConsensusBuilder> {
    Arc::new(AveragingConsensusBuilder::new(params.fragment_tolerance, params.max_stored_peaks))
}

/// Builds the consensus of all spectra at once.
///
/// All peaks are pooled, sorted by m/z and grouped while within `fragment_tolerance` of the
/// running group centroid. Incremental merges with [`AveragingConsensusBuilder`] converge to
/// the same peaks when the members' peaks are well separated.
pub fn batch_consensus(
    spectra: &[Spectrum],
    fragment_tolerance: f64,
    max_peaks: usize,
) -> Option<Spectrum> {
    let first = spectra.first()?;
    let n = spectra.len() as f64;

    let mut pooled: Vec<Peak> = spectra.iter().flat_map(|s| s.peaks().iter().copied()).collect();
    pooled.sort_by(|a, b| a.cmp_mz(b));

    let mut peaks = Vec::new();
    let mut group_intensity = 0.0;
    let mut group_moment = 0.0;
    let mut group_mz_sum = 0.0;
    let mut group_len = 0usize;

    let centroid = |intensity: f64, moment: f64, mz_sum: f64, len: usize| {
        if intensity > 0.0 { moment / intensity } else { mz_sum / len as f64 }
    };

    for p in pooled {
        if group_len > 0 {
            let center = centroid(group_intensity, group_moment, group_mz_sum, group_len);
            if (p.mz - center).abs() > fragment_tolerance {
                peaks.push(Peak::new(center, group_intensity / n));
                group_intensity = 0.0;
                group_moment = 0.0;
                group_mz_sum = 0.0;
                group_len = 0;
            }
        }
        group_intensity += p.intensity;
        group_moment += p.intensity * p.mz;
        group_mz_sum += p.mz;
        group_len += 1;
    }
    if group_len > 0 {
        let center = centroid(group_intensity, group_moment, group_mz_sum, group_len);
        peaks.push(Peak::new(center, group_intensity / n));
    }

    let precursor_mz = spectra.iter().map(|s| s.precursor_mz()).sum::<f64>() / n;
    Some(Spectrum::new(first.id(), precursor_mz, first.charge(), cap_peaks(peaks, max_peaks)))
}

/// Drops the least intense peaks beyond `max_peaks`.
fn cap_peaks(mut peaks: Vec<Peak>, max_peaks: usize) -> Vec<Peak> {
    if peaks.len() > max_peaks {
        peaks.sort_by_key(|p| (Reverse(OrderedFloat(p.intensity)), OrderedFloat(p.mz)));
        peaks.truncate(max_peaks);
        peaks.sort_by(|a, b| a.cmp_mz(b));
    }
    peaks
}
