#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use mscluster::algorithm::consensus::AveragingConsensusBuilder;
use mscluster::algorithm::filter::{FilterPipeline, FractionTicPeaks};
use mscluster::similarity::combined::CombinedFisherIntensityTest;
use mscluster::{Cluster, GreedyIncrementalClusteringEngine, MzThenIdComparator, Peak, Spectrum};

pub const FAMILIES: usize = 26;
pub const REPLICATES: usize = 4;
const WEAK_PEAKS: usize = 9;

/// Replicate spectra of 26 peptide families with precursors spread over 400-404 m/z, sorted
/// by precursor.
///
/// Every spectrum carries one shared peak at 110 m/z (intensity 1.2), three peaks unique to its
/// family (intensity 1.0) and nine weak family peaks (intensity 0.4), with small deterministic
/// m/z and intensity jitter. The four strong peaks carry just over half of the total ion current,
/// so the comparison filter keeps exactly those. Replicates
/// of one family score close to 1.0; spectra of different families score between 0.6 and 0.95.
pub fn replicate_families() -> Vec<Spectrum> {
    let n = FAMILIES * REPLICATES;
    let mut spectra = Vec::with_capacity(n);

    for family in 0..FAMILIES {
        for replicate in 0..REPLICATES {
            let k = family * REPLICATES + replicate;
            let precursor_mz = 400.0 + 4.0 * ((k * 37) % n) as f64 / n as f64;

            let base = 300.0 + 20.0 * family as f64;
            let weak = 830.0 + 12.0 * family as f64;
            let mut positions = vec![(110.0, 1.2), (base, 1.0), (base + 7.0, 1.0), (base + 13.0, 1.0)];
            positions.extend((0..WEAK_PEAKS).map(|q| (weak + q as f64, 0.4)));

            let peaks = positions.iter()
                .enumerate()
                .map(|(i, &(mz, intensity))| {
                    let mz_jitter = (((k * 13 + i * 7) % 11) as f64 - 5.0) * 0.01;
                    let intensity_jitter = 1.0 + (((k * 5 + i * 3) % 9) as f64 - 4.0) * 0.02;
                    Peak::new(mz + mz_jitter, intensity * intensity_jitter)
                })
                .collect();

            spectra.push(Spectrum::new(format!("f{:02}-r{}", family, replicate), precursor_mz, 3, peaks));
        }
    }
    spectra.sort_by(|a, b| a.precursor_mz().total_cmp(&b.precursor_mz()));
    spectra
}

/// Family prefix of a replicate id, e.g. "f07".
pub fn family_of(id: &str) -> &str {
    &id[..3]
}

/// Greedy engine with the combined test, a 4 m/z window and the default comparison filter
/// (half the total ion current, at most 20 peaks).
pub fn combined_engine(threshold: f64) -> GreedyIncrementalClusteringEngine {
    GreedyIncrementalClusteringEngine::new(
        Arc::new(CombinedFisherIntensityTest::new(0.5).unwrap()),
        Arc::new(MzThenIdComparator),
        Arc::new(AveragingConsensusBuilder::new(0.5, 150)),
        Arc::new(FilterPipeline::new().then(FractionTicPeaks { fraction: 0.5, max_peaks: 20 })),
        4.0,
        threshold,
        0.6,
    )
    .unwrap()
}

pub fn singletons(spectra: &[Spectrum]) -> Vec<Cluster> {
    spectra.iter().cloned().map(Cluster::from_spectrum).collect()
}

/// Every member id over all clusters; panics on duplicates.
pub fn member_set<'a>(clusters: impl IntoIterator<Item = &'a Cluster>) -> BTreeSet<String> {
    let mut members = BTreeSet::new();
    for cluster in clusters {
        for id in cluster.members() {
            assert!(members.insert(id.clone()), "member {} appears twice", id);
        }
    }
    members
}
