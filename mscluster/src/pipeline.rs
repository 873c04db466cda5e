//! End-to-end clustering runs: ingestion filtering, greedy passes, reclustering and sharding.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::algorithm::filter::{prepare_spectrum, storage_filter};
use crate::config::ClusteringParams;
use crate::data::cluster::{Cluster, ClusterComparator, MzThenIdComparator};
use crate::data::spectrum::Spectrum;
use crate::engine::factory::build_greedy_engine;
use crate::engine::traits::IncrementalClusteringEngine;
use crate::error::{Error, Result};
use crate::similarity::cdf::CumulativeDistributionFunction;

/// A spectrum rejected at the filter boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedSpectrum {
    pub id: String,
    pub reason: String,
}

/// Final clusters of a run and the spectra that never reached an engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    pub clusters: Vec<Cluster>,
    pub skipped: Vec<SkippedSpectrum>,
}

impl ClusteringOutcome {
    /// Total number of member spectra over all clusters.
    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(|c| c.size()).sum()
    }
}

/// Applies the storage filter and wraps each surviving spectrum as a singleton cluster.
///
/// Malformed spectra and spectra emptied by the filter are reported as skipped.
pub fn prepare_clusters(
    spectra: &[Spectrum],
    params: &ClusteringParams,
) -> (Vec<Cluster>, Vec<SkippedSpectrum>) {
    let filter = storage_filter(params);
    let mut clusters = Vec::with_capacity(spectra.len());
    let mut skipped = Vec::new();

    for spectrum in spectra {
        match prepare_spectrum(spectrum, &filter) {
            Ok(filtered) => clusters.push(Cluster::from_spectrum(filtered)),
            Err(e) => {
                warn!("skipping spectrum {}: {}", spectrum.id(), e);
                skipped.push(SkippedSpectrum {
                    id: spectrum.id().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    (clusters, skipped)
}

/// One full greedy pass: sorts by precursor m/z, feeds a fresh engine and flushes it.
pub fn run_incremental_pass(
    mut clusters: Vec<Cluster>,
    params: &ClusteringParams,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
) -> Result<Vec<Cluster>> {
    let mut engine = build_greedy_engine(params, cdf)?;
    sort_clusters(&mut clusters);

    let mut finalized = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        finalized.extend(engine.add_incremental(cluster)?);
    }
    finalized.extend(engine.flush());
    sort_clusters(&mut finalized);
    Ok(finalized)
}

/// Runs the initial pass and the configured reclustering passes.
pub fn run_passes(
    clusters: Vec<Cluster>,
    params: &ClusteringParams,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
) -> Result<Vec<Cluster>> {
    let input = clusters.len();
    let mut clusters = run_incremental_pass(clusters, params, cdf.clone())?;
    info!("initial pass: {} clusters from {} inputs", clusters.len(), input);

    for pass in 1..=params.reclustering_passes {
        let before = clusters.len();
        clusters = run_incremental_pass(clusters, params, cdf.clone())?;
        info!("reclustering pass {}: {} -> {} clusters", pass, before, clusters.len());
    }
    Ok(clusters)
}

/// Clusters a set of spectra in a single thread.
///
/// # Arguments
///
/// * `spectra` - Raw spectra in any order.
/// * `params` - Clustering parameters.
/// * `cdf` - Optional null-score distribution for calibration.
///
/// # Returns
///
/// Clusters sorted by precursor m/z, plus the spectra skipped at ingestion.
pub fn cluster_spectra(
    spectra: &[Spectrum],
    params: &ClusteringParams,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
) -> Result<ClusteringOutcome> {
    params.validate()?;
    let (clusters, skipped) = prepare_clusters(spectra, params);
    let clusters = run_passes(clusters, params, cdf)?;

    info!("clustered {} spectra into {} clusters ({} skipped, {} reclustering passes)",
          spectra.len() - skipped.len(), clusters.len(), skipped.len(), params.reclustering_passes);
    Ok(ClusteringOutcome { clusters, skipped })
}

/// Clusters a set of spectra in disjoint precursor shards of `large_binning_region` m/z, each
/// run by its own engine on a pool of `num_threads` workers.
///
/// Clusters within one window of a shard boundary go through a final greedy pass together,
/// so pairs split by a boundary can still merge.
pub fn cluster_spectra_sharded(
    spectra: &[Spectrum],
    params: &ClusteringParams,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
    num_threads: usize,
) -> Result<ClusteringOutcome> {
    params.validate()?;
    let (clusters, skipped) = prepare_clusters(spectra, params);

    // Step 1: disjoint shards
    let mut shards: BTreeMap<i64, Vec<Cluster>> = BTreeMap::new();
    for cluster in clusters {
        let key = (cluster.precursor_mz() / params.large_binning_region).floor() as i64;
        shards.entry(key).or_default().push(cluster);
    }
    let shards: Vec<(i64, Vec<Cluster>)> = shards.into_iter().collect();
    info!("clustering {} shards on {} threads", shards.len(), num_threads);

    // Step 2: independent engines per shard
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let sharded: Vec<Vec<Cluster>> = pool.install(|| {
        shards.into_par_iter()
            .map(|(key, shard)| {
                debug!("shard {}: {} clusters", key, shard.len());
                run_passes(shard, params, cdf.clone())
            })
            .collect::<Result<Vec<_>>>()
    })?;

    // Step 3: boundary pass
    let region = params.large_binning_region;
    let window = params.precursor_tolerance;
    let (near, mut clusters): (Vec<Cluster>, Vec<Cluster>) = sharded.into_iter()
        .flatten()
        .partition(|c| near_shard_boundary(c.precursor_mz(), region, window));
    let near_count = near.len();
    let merged = run_incremental_pass(near, params, cdf)?;
    debug!("boundary pass: {} -> {} clusters", near_count, merged.len());
    clusters.extend(merged);
    sort_clusters(&mut clusters);

    info!("clustered {} spectra into {} clusters ({} skipped)",
          spectra.len() - skipped.len(), clusters.len(), skipped.len());
    Ok(ClusteringOutcome { clusters, skipped })
}

/// Whether `mz` lies within `window` of a multiple of `region`.
fn near_shard_boundary(mz: f64, region: f64, window: f64) -> bool {
    let offset = mz.rem_euclid(region);
    offset <= window || region - offset <= window
}

fn sort_clusters(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| MzThenIdComparator.compare(a, b));
}
