use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ClusteringParams, SimilarityKind};
use crate::data::peak::Peak;
use crate::error::Result;
use crate::similarity::combined::CombinedFisherIntensityTest;
use crate::similarity::dot_product::FrankEtAlDotProduct;
use crate::similarity::fisher::FisherExactTest;

/// Upper bound of every score produced by the checkers in this crate.
pub const MAX_SIMILARITY: f64 = 1.0;

/// Similarity of two peak lists in [0, 1]; higher is more similar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub value: f64,
    /// Number of matched peak pairs the score is based on.
    pub matched_peaks: usize,
}

impl SimilarityScore {
    pub fn new(value: f64, matched_peaks: usize) -> Self {
        SimilarityScore { value, matched_peaks }
    }

    pub fn zero() -> Self {
        SimilarityScore { value: 0.0, matched_peaks: 0 }
    }
}

impl PartialOrd for SimilarityScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

/// Pairwise similarity of two mass-sorted peak lists.
pub trait SimilarityChecker: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Maximum m/z difference for two peaks to match.
    fn fragment_tolerance(&self) -> f64;

    /// Scores `a` against `b`. Comparing a list with itself yields [`MAX_SIMILARITY`].
    fn score(&self, a: &[Peak], b: &[Peak]) -> SimilarityScore;

    /// Whether the score of `a` against `b` reaches `threshold`.
    fn is_similar(&self, a: &[Peak], b: &[Peak], threshold: f64) -> bool {
        self.score(a, b).value >= threshold
    }
}

/// Builds the checker selected in `params`.
pub fn similarity_checker(params: &ClusteringParams) -> Result<Arc<dyn SimilarityChecker>> {
    let checker: Arc<dyn SimilarityChecker> = match params.similarity {
        SimilarityKind::CombinedFisherIntensity => {
            Arc::new(CombinedFisherIntensityTest::new(params.fragment_tolerance)?)
        }
        SimilarityKind::FisherExact => Arc::new(FisherExactTest::new(params.fragment_tolerance)?),
        SimilarityKind::FrankDotProduct => Arc::new(FrankEtAlDotProduct::new(
            params.fragment_tolerance,
            params.number_compared_peaks,
        )?),
    };
    Ok(checker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_from_params() {
        for (kind, name) in [
            (SimilarityKind::CombinedFisherIntensity, "combined_fisher_intensity"),
            (SimilarityKind::FisherExact, "fisher_exact"),
            (SimilarityKind::FrankDotProduct, "frank_dot_product"),
        ] {
            let params = ClusteringParams { similarity: kind, ..Default::default() };
            let checker = similarity_checker(&params).unwrap();
            assert_eq!(checker.name(), name);
            assert!((checker.fragment_tolerance() - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_is_similar_uses_call_threshold() {
        let params = ClusteringParams { similarity: SimilarityKind::FrankDotProduct, ..Default::default() };
        let checker = similarity_checker(&params).unwrap();
        let a = vec![Peak::new(100.0, 4.0), Peak::new(200.0, 3.0)];
        let b = vec![Peak::new(100.0, 4.0), Peak::new(300.0, 3.0)];
        // cosine = 16 / 25
        assert!(checker.is_similar(&a, &b, 0.6));
        assert!(!checker.is_similar(&a, &b, 0.95));
    }

    #[test]
    fn test_score_ordering() {
        assert!(SimilarityScore::new(0.7, 3) > SimilarityScore::new(0.6, 9));
        assert_eq!(SimilarityScore::zero().matched_peaks, 0);
    }
}
