//! Combined peak-overlap and intensity test.
//!
//! Two independent p-values are merged with Fisher's method:
//!
//! * the hypergeometric tail of the matched-peak count, see [`hypergeometric_tail`]
//! * the disagreement of matched intensities, `1 - cosine`
//!
//! `-2 (ln p1 + ln p2)` follows a chi-squared distribution with 4 degrees of freedom under
//! the null hypothesis; its CDF is the similarity.

use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::config::check_fragment_tolerance;
use crate::data::peak::Peak;
use crate::error::{Error, Result};
use crate::similarity::checker::{SimilarityChecker, SimilarityScore};
use crate::similarity::dot_product::intensity_cosine;
use crate::similarity::fisher::{hypergeometric_tail, mass_axis_bins};
use crate::similarity::matching::match_peaks;

/// Fisher's method combines two p-values, each with 2 degrees of freedom.
const COMBINED_DEGREES_OF_FREEDOM: f64 = 4.0;

#[derive(Clone, Debug)]
pub struct CombinedFisherIntensityTest {
    fragment_tolerance: f64,
    chi_squared: ChiSquared,
}

impl CombinedFisherIntensityTest {
    pub fn new(fragment_tolerance: f64) -> Result<Self> {
        check_fragment_tolerance(fragment_tolerance)?;
        let chi_squared = ChiSquared::new(COMBINED_DEGREES_OF_FREEDOM)
            .map_err(|e| Error::Statistics(e.to_string()))?;
        Ok(CombinedFisherIntensityTest { fragment_tolerance, chi_squared })
    }

    /// Fisher's combined statistic for two p-values; zeros are floored to the smallest
    /// positive double so the statistic stays finite.
    pub fn combined_statistic(p_overlap: f64, p_intensity: f64) -> f64 {
        let p1 = p_overlap.max(f64::MIN_POSITIVE);
        let p2 = p_intensity.max(f64::MIN_POSITIVE);
        -2.0 * (p1.ln() + p2.ln())
    }
}

impl SimilarityChecker for CombinedFisherIntensityTest {
    fn name(&self) -> &'static str {
        "combined_fisher_intensity"
    }

    fn fragment_tolerance(&self) -> f64 {
        self.fragment_tolerance
    }

    fn score(&self, a: &[Peak], b: &[Peak]) -> SimilarityScore {
        if a.is_empty() || b.is_empty() {
            return SimilarityScore::zero();
        }
        let pairs = match_peaks(a, b, self.fragment_tolerance);
        if pairs.is_empty() {
            return SimilarityScore::zero();
        }

        // Step 1: overlap significance
        let bins = mass_axis_bins(a, b, self.fragment_tolerance);
        let (n_a, n_b, matched) = (a.len() as u64, b.len() as u64, pairs.len() as u64);
        let p_overlap = hypergeometric_tail(bins, n_a, n_b, matched);

        // Step 2: intensity agreement of the matched peaks
        let cosine = intensity_cosine(a, b, &pairs);
        let p_intensity = (1.0 - cosine).max(0.0);

        // Step 3: combine
        let statistic = Self::combined_statistic(p_overlap, p_intensity);
        let value = self.chi_squared.cdf(statistic).clamp(0.0, 1.0);

        SimilarityScore::new(value, pairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peaks(values: &[(f64, f64)]) -> Vec<Peak> {
        values.iter().map(|&(mz, i)| Peak::new(mz, i)).collect()
    }

    #[test]
    fn test_self_similarity_is_maximal() {
        let test = CombinedFisherIntensityTest::new(0.5).unwrap();
        let a = peaks(&[(100.0, 10.0), (175.3, 3.0), (250.1, 40.0), (399.9, 7.5)]);
        let score = test.score(&a, &a);
        assert!((score.value - 1.0).abs() < 1e-9);
        assert_eq!(score.matched_peaks, 4);
    }

    #[test]
    fn test_disjoint_peaks_score_zero() {
        let test = CombinedFisherIntensityTest::new(0.5).unwrap();
        let a = peaks(&[(100.0, 10.0), (200.0, 20.0)]);
        let b = peaks(&[(150.0, 10.0), (250.0, 20.0)]);
        let score = test.score(&a, &b);
        assert_eq!(score.value, 0.0);
        assert_eq!(score.matched_peaks, 0);
    }

    #[test]
    fn test_empty_side_scores_zero() {
        let test = CombinedFisherIntensityTest::new(0.5).unwrap();
        let a = peaks(&[(100.0, 10.0)]);
        assert_eq!(test.score(&a, &[]).value, 0.0);
        assert_eq!(test.score(&[], &a).value, 0.0);
    }

    #[test]
    fn test_partial_overlap_between_bounds() {
        let test = CombinedFisherIntensityTest::new(0.5).unwrap();
        let a = peaks(&[(100.0, 10.0), (200.0, 20.0), (300.0, 30.0), (400.0, 5.0)]);
        let b = peaks(&[(100.1, 30.0), (200.0, 10.0), (333.0, 30.0), (444.0, 5.0)]);
        let score = test.score(&a, &b);
        assert_eq!(score.matched_peaks, 2);
        assert!(score.value > 0.0);
        assert!(score.value < 1.0);
        assert!(test.score(&a, &a).value >= score.value);
    }

    #[test]
    fn test_combined_statistic() {
        // p1 = p2 = e^-1 gives -2 * (-2) = 4
        let p = (-1.0_f64).exp();
        assert!((CombinedFisherIntensityTest::combined_statistic(p, p) - 4.0).abs() < 1e-12);
        assert!(CombinedFisherIntensityTest::combined_statistic(0.0, 0.0).is_finite());
    }
}
