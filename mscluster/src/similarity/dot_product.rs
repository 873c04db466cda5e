use crate::config::check_fragment_tolerance;
use crate::data::peak::Peak;
use crate::error::{Error, Result};
use crate::similarity::checker::{SimilarityChecker, SimilarityScore};
use crate::similarity::matching::{major_peaks, match_peaks};

/// Normalized dot product over the most intense peaks of both spectra (Frank et al., 2008).
#[derive(Clone, Debug)]
pub struct FrankEtAlDotProduct {
    fragment_tolerance: f64,
    number_compared_peaks: usize,
}

impl FrankEtAlDotProduct {
    /// # Arguments
    ///
    /// * `fragment_tolerance` - Maximum m/z difference of matched peaks.
    /// * `number_compared_peaks` - Most intense peaks taken from each side (default: 15).
    pub fn new(fragment_tolerance: f64, number_compared_peaks: usize) -> Result<Self> {
        check_fragment_tolerance(fragment_tolerance)?;
        if number_compared_peaks == 0 {
            return Err(Error::invalid("number_compared_peaks", "must be at least 1"));
        }
        Ok(FrankEtAlDotProduct { fragment_tolerance, number_compared_peaks })
    }
}

impl SimilarityChecker for FrankEtAlDotProduct {
    fn name(&self) -> &'static str {
        "frank_dot_product"
    }

    fn fragment_tolerance(&self) -> f64 {
        self.fragment_tolerance
    }

    fn score(&self, a: &[Peak], b: &[Peak]) -> SimilarityScore {
        let a = major_peaks(a, self.number_compared_peaks);
        let b = major_peaks(b, self.number_compared_peaks);
        let pairs = match_peaks(&a, &b, self.fragment_tolerance);
        if pairs.is_empty() {
            return SimilarityScore::zero();
        }
        SimilarityScore::new(intensity_cosine(&a, &b, &pairs).clamp(0.0, 1.0), pairs.len())
    }
}

/// Cosine of the intensity vectors of `a` and `b`, counting only the matched `pairs` in the
/// numerator and all peaks in the norms.
///
/// Comparing a list with itself yields exactly 1.0: numerator and norms sum the same
/// products in the same order.
pub fn intensity_cosine(a: &[Peak], b: &[Peak], pairs: &[(usize, usize)]) -> f64 {
    let dot: f64 = pairs.iter().map(|&(i, j)| a[i].intensity * b[j].intensity).sum();
    let norm_a: f64 = a.iter().map(|p| p.intensity * p.intensity).sum();
    let norm_b: f64 = b.iter().map(|p| p.intensity * p.intensity).sum();

    let norm = (norm_a * norm_b).sqrt();
    if norm > 0.0 { dot / norm } else { 0.0 }
}
