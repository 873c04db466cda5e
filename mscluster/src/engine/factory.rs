use std::sync::Arc;

use crate::algorithm::consensus::consensus_builder;
use crate::algorithm::filter::comparison_filter;
use crate::config::ClusteringParams;
use crate::data::cluster::MzThenIdComparator;
use crate::engine::batch::BatchClusteringEngine;
use crate::engine::greedy::GreedyIncrementalClusteringEngine;
use crate::error::Result;
use crate::similarity::cdf::CumulativeDistributionFunction;
use crate::similarity::checker::similarity_checker;

/// Builds a greedy engine from validated parameters.
///
/// # Arguments
///
/// * `params` - Clustering parameters; validated first.
/// * `cdf` - Optional null-score distribution for calibration.
///
/// # Example
///
/// ```rust
/// # use mscluster::config::ClusteringParams;
/// # use mscluster::engine::factory::build_greedy_engine;
/// # use mscluster::ClusteringEngine;
/// let params = ClusteringParams { precursor_tolerance: 4.0, similarity_threshold: 0.95, ..Default::default() };
/// let engine = build_greedy_engine(&params, None).unwrap();
/// assert_eq!(engine.size(), 0);
/// assert_eq!(engine.similarity_threshold(), 0.95);
/// ```
pub fn build_greedy_engine(
    params: &ClusteringParams,
    cdf: Option<Arc<CumulativeDistributionFunction>>,
) -> Result<GreedyIncrementalClusteringEngine> {
    params.validate()?;

    let mut engine = GreedyIncrementalClusteringEngine::new(
        similarity_checker(params)?,
        Arc::new(MzThenIdComparator),
        consensus_builder(params),
        Arc::new(comparison_filter(params)),
        params.precursor_tolerance,
        params.similarity_threshold,
        params.retain_threshold,
    )?
    .with_min_comparisons(params.min_comparisons);

    if params.major_peak_prescreen {
        engine = engine.with_major_peak_prescreen(params.major_peak_count);
    }
    if let Some(cdf) = cdf {
        engine = engine.with_cdf(cdf);
    }
    Ok(engine)
}

/// Builds a batch engine from validated parameters.
pub fn build_batch_engine(params: &ClusteringParams) -> Result<BatchClusteringEngine> {
    params.validate()?;
    BatchClusteringEngine::new(
        similarity_checker(params)?,
        Arc::new(MzThenIdComparator),
        consensus_builder(params),
        Arc::new(comparison_filter(params)),
        params.similarity_threshold,
        params.retain_threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::traits::ClusteringEngine;
    use crate::error::Error;

    #[test]
    fn test_engines_carry_params() {
        let params = ClusteringParams { similarity_threshold: 0.9, retain_threshold: 0.4, ..Default::default() };

        let greedy = build_greedy_engine(&params, None).unwrap();
        assert!((greedy.similarity_threshold() - 0.9).abs() < 1e-12);
        assert!((greedy.retain_threshold() - 0.4).abs() < 1e-12);
        assert!((greedy.window_size() - 2.0).abs() < 1e-12);
        assert_eq!(greedy.similarity_checker().name(), "combined_fisher_intensity");

        let batch = build_batch_engine(&params).unwrap();
        assert!((batch.similarity_threshold() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_params_fail_construction() {
        let params = ClusteringParams { precursor_tolerance: -2.0, ..Default::default() };
        assert!(matches!(build_greedy_engine(&params, None), Err(Error::InvalidParameter { .. })));

        let params = ClusteringParams { similarity_threshold: 1.01, ..Default::default() };
        assert!(build_batch_engine(&params).is_err());
    }
}
