use std::cmp::Reverse;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::data::peak::Peak;

/// Pairs peaks of two mass-sorted lists whose m/z differ by no more than `tolerance`.
///
/// A single two-pointer sweep: each peak takes part in at most one pair, so the number of
/// pairs never exceeds the shorter list. Comparing a list with itself pairs every peak with
/// itself.
///
/// # Arguments
///
/// * `a` - Peaks sorted by m/z.
/// * `b` - Peaks sorted by m/z.
/// * `tolerance` - Maximum m/z difference of a pair.
///
/// # Returns
///
/// Index pairs `(i, j)` into `a` and `b`, ascending in both.
pub fn match_peaks(a: &[Peak], b: &[Peak], tolerance: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let delta = a[i].mz - b[j].mz;
        if delta.abs() <= tolerance {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if delta < 0.0 {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// The `n` most intense peaks, sorted by m/z.
pub fn major_peaks(peaks: &[Peak], n: usize) -> Vec<Peak> {
    peaks.iter()
        .copied()
        .sorted_by_key(|p| (Reverse(OrderedFloat(p.intensity)), OrderedFloat(p.mz)))
        .take(n)
        .sorted_by(|a, b| a.cmp_mz(b))
        .collect()
}

/// Whether the `n` most intense peaks of both lists have at least one peak in common.
pub fn share_major_peak(a: &[Peak], b: &[Peak], n: usize, tolerance: f64) -> bool {
    !match_peaks(&major_peaks(a, n), &major_peaks(b, n), tolerance).is_empty()
}
