use statrs::function::factorial::ln_binomial;

use crate::config::check_fragment_tolerance;
use crate::data::peak::Peak;
use crate::error::Result;
use crate::similarity::checker::{SimilarityChecker, SimilarityScore, MAX_SIMILARITY};
use crate::similarity::matching::match_peaks;

/// Peak-overlap significance: how unlikely is the observed number of matching peaks if both
/// spectra had their peaks placed at random on a shared mass axis.
#[derive(Clone, Debug)]
pub struct FisherExactTest {
    fragment_tolerance: f64,
}

impl FisherExactTest {
    pub fn new(fragment_tolerance: f64) -> Result<Self> {
        check_fragment_tolerance(fragment_tolerance)?;
        Ok(FisherExactTest { fragment_tolerance })
    }

    /// Tail probability of observing at least `matched` shared peaks by chance.
    pub fn p_value(&self, a: &[Peak], b: &[Peak], matched: usize) -> f64 {
        let bins = mass_axis_bins(a, b, self.fragment_tolerance);
        hypergeometric_tail(bins, a.len() as u64, b.len() as u64, matched as u64)
    }
}

impl SimilarityChecker for FisherExactTest {
    fn name(&self) -> &'static str {
        "fisher_exact"
    }

    fn fragment_tolerance(&self) -> f64 {
        self.fragment_tolerance
    }

    fn score(&self, a: &[Peak], b: &[Peak]) -> SimilarityScore {
        if a.is_empty() || b.is_empty() {
            return SimilarityScore::zero();
        }
        let matched = match_peaks(a, b, self.fragment_tolerance).len();
        // every peak on both sides paired: identical up to tolerance
        if matched == a.len() && matched == b.len() {
            return SimilarityScore::new(MAX_SIMILARITY, matched);
        }
        SimilarityScore::new((1.0 - self.p_value(a, b, matched)).clamp(0.0, 1.0), matched)
    }
}

/// Number of tolerance-wide bins on the mass axis shared by two spectra.
///
/// The axis spans up to the highest peak of either list with bins of twice the fragment
/// tolerance; it never holds fewer bins than there are peaks.
pub fn mass_axis_bins(a: &[Peak], b: &[Peak], fragment_tolerance: f64) -> u64 {
    let max_mz = a.iter().chain(b.iter()).map(|p| p.mz).fold(0.0_f64, f64::max);
    let bins = (max_mz / (2.0 * fragment_tolerance)).ceil();
    let bins = if bins.is_finite() && bins > 0.0 { bins as u64 } else { 0 };
    bins.max((a.len() + b.len()) as u64)
}

/// P(X >= observed) for X ~ Hypergeometric(population, successes, draws).
///
/// # Arguments
///
/// * `population` - Number of bins on the mass axis.
/// * `successes` - Peaks of the first spectrum.
/// * `draws` - Peaks of the second spectrum.
/// * `observed` - Matched peaks.
pub fn hypergeometric_tail(population: u64, successes: u64, draws: u64, observed: u64) -> f64 {
    if observed == 0 {
        return 1.0;
    }
    let upper = successes.min(draws);
    // draws - x may not exceed the failures available
    let lower = observed.max(draws.saturating_sub(population.saturating_sub(successes)));
    if lower > upper || successes > population || draws > population {
        return 0.0;
    }

    let ln_total = ln_binomial(population, draws);
    let tail: f64 = (lower..=upper)
        .map(|x| {
            let ln_p = ln_binomial(successes, x)
                + ln_binomial(population - successes, draws - x)
                - ln_total;
            ln_p.exp()
        })
        .sum();
    tail.clamp(0.0, 1.0)
}
