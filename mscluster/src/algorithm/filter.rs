//! Peak filters applied before storage and before comparison.
//!
//! Every filter is a pure transform over a mass-sorted peak list and returns a mass-sorted
//! peak list. Filters compose by chaining them in a [`FilterPipeline`].

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::config::ClusteringParams;
use crate::data::peak::Peak;
use crate::data::spectrum::{singly_charged_mass, Spectrum};
use crate::error::{Error, Result};

/// Monoisotopic mass of water
const WATER_MASS: f64 = 18.010565;
/// Monoisotopic mass of ammonia
const AMMONIA_MASS: f64 = 17.026549;

/// Precursor context handed to each filter stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Precursor {
    pub mz: f64,
    pub charge: i32,
}

impl Precursor {
    pub fn of(spectrum: &Spectrum) -> Self {
        Precursor { mz: spectrum.precursor_mz(), charge: spectrum.charge() }
    }
}

/// A pure peak-list transform.
pub trait PeakFilter: Send + Sync {
    fn apply(&self, peaks: Vec<Peak>, precursor: Precursor) -> Vec<Peak>;
}

/// Removes peaks above the singly-charged precursor mass plus a margin.
#[derive(Clone, Debug)]
pub struct RemoveImpossiblyHighPeaks {
    pub margin: f64,
}

impl PeakFilter for RemoveImpossiblyHighPeaks {
    fn apply(&self, mut peaks: Vec<Peak>, precursor: Precursor) -> Vec<Peak> {
        let max_mz = singly_charged_mass(precursor.mz, precursor.charge) + self.margin;
        peaks.retain(|p| p.mz <= max_mz);
        peaks
    }
}

/// Removes unfragmented precursor remnants and their water / ammonia losses.
#[derive(Clone, Debug)]
pub struct RemovePrecursorPeaks {
    pub tolerance: f64,
}

impl PeakFilter for RemovePrecursorPeaks {
    fn apply(&self, mut peaks: Vec<Peak>, precursor: Precursor) -> Vec<Peak> {
        let charge = precursor.charge.max(1) as f64;
        let remnants = [
            precursor.mz,
            precursor.mz - WATER_MASS / charge,
            precursor.mz - AMMONIA_MASS / charge,
        ];
        peaks.retain(|p| remnants.iter().all(|&r| (p.mz - r).abs() > self.tolerance));
        peaks
    }
}

/// Keeps the `n` most intense peaks.
#[derive(Clone, Debug)]
pub struct HighestNPeaks {
    pub n: usize,
}

impl PeakFilter for HighestNPeaks {
    fn apply(&self, peaks: Vec<Peak>, _precursor: Precursor) -> Vec<Peak> {
        if peaks.len() <= self.n {
            return peaks;
        }
        let mut indices = indices_by_intensity(&peaks);
        indices.truncate(self.n);
        select_sorted(&peaks, indices)
    }
}

/// Keeps the most intense peaks until `fraction` of the total ion current is covered,
/// never more than `max_peaks`.
#[derive(Clone, Debug)]
pub struct FractionTicPeaks {
    pub fraction: f64,
    pub max_peaks: usize,
}

impl PeakFilter for FractionTicPeaks {
    fn apply(&self, peaks: Vec<Peak>, _precursor: Precursor) -> Vec<Peak> {
        let total: f64 = peaks.iter().map(|p| p.intensity).sum();
        let target = total * self.fraction;

        let mut kept = Vec::new();
        let mut covered = 0.0;
        for i in indices_by_intensity(&peaks) {
            if kept.len() >= self.max_peaks || (covered >= target && !kept.is_empty()) {
                break;
            }
            covered += peaks[i].intensity;
            kept.push(i);
        }
        select_sorted(&peaks, kept)
    }
}

/// Keeps the `n` most intense peaks in each m/z bin; consecutive bins overlap by `overlap`.
#[derive(Clone, Debug)]
pub struct BinnedHighestNPeaks {
    pub n: usize,
    pub bin_size: f64,
    pub overlap: f64,
}

impl PeakFilter for BinnedHighestNPeaks {
    fn apply(&self, peaks: Vec<Peak>, _precursor: Precursor) -> Vec<Peak> {
        let (first, last) = match (peaks.first(), peaks.last()) {
            (Some(f), Some(l)) => (f.mz, l.mz),
            _ => return peaks,
        };
        // a non-advancing window would never terminate
        let step = (self.bin_size - self.overlap).max(self.bin_size * 0.5).max(f64::EPSILON);

        let mut keep = vec![false; peaks.len()];
        let mut start = first;
        while start <= last {
            let end = start + self.bin_size;
            let lo = peaks.partition_point(|p| p.mz < start);
            let hi = peaks.partition_point(|p| p.mz < end);

            let mut in_bin: Vec<usize> = (lo..hi).collect();
            in_bin.sort_by_key(|&i| Reverse(OrderedFloat(peaks[i].intensity)));
            for &i in in_bin.iter().take(self.n) {
                keep[i] = true;
            }
            start += step;
        }

        peaks.into_iter()
            .zip(keep)
            .filter_map(|(p, k)| if k { Some(p) } else { None })
            .collect()
    }
}

/// Ordered chain of filters, each stage receiving the previous stage's output.
#[derive(Default)]
pub struct FilterPipeline {
    stages: Vec<Box<dyn PeakFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        FilterPipeline { stages: Vec::new() }
    }

    /// Appends a stage at the end of the chain.
    pub fn then<F: PeakFilter + 'static>(mut self, stage: F) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl PeakFilter for FilterPipeline {
    fn apply(&self, peaks: Vec<Peak>, precursor: Precursor) -> Vec<Peak> {
        self.stages.iter().fold(peaks, |peaks, stage| stage.apply(peaks, precursor))
    }
}

/// Filter applied once at ingestion: impossible peaks, precursor remnants, the optional per-bin
/// cap and the top-N cap.
pub fn storage_filter(params: &ClusteringParams) -> FilterPipeline {
    let mut pipeline = FilterPipeline::new()
        .then(RemoveImpossiblyHighPeaks { margin: params.impossible_peak_margin })
        .then(RemovePrecursorPeaks { tolerance: params.fragment_tolerance });

    if let Some(n) = params.storage_peaks_per_bin {
        pipeline = pipeline.then(BinnedHighestNPeaks {
            n,
            bin_size: params.storage_bin_size,
            overlap: params.storage_bin_overlap,
        });
    }
    pipeline.then(HighestNPeaks { n: params.max_stored_peaks })
}

/// Filter applied to both sides right before a similarity check.
pub fn comparison_filter(params: &ClusteringParams) -> FilterPipeline {
    FilterPipeline::new()
        .then(FractionTicPeaks {
            fraction: params.comparison_tic_fraction,
            max_peaks: params.comparison_max_peaks,
        })
}

/// Runs the storage filter over a spectrum, rejecting malformed or emptied spectra.
///
/// # Arguments
///
/// * `spectrum` - Raw spectrum from the parsing layer.
/// * `filter` - Storage-time filter.
///
/// # Returns
///
/// The filtered spectrum, or an input error if the spectrum cannot enter an engine.
pub fn prepare_spectrum(spectrum: &Spectrum, filter: &dyn PeakFilter) -> Result<Spectrum> {
    if !spectrum.precursor_mz().is_finite() {
        return Err(Error::InvalidInput(format!(
            "spectrum {} has a non-finite precursor m/z",
            spectrum.id()
        )));
    }
    if spectrum.peaks().iter().any(|p| !p.is_finite()) {
        return Err(Error::InvalidInput(format!("spectrum {} has non-finite peaks", spectrum.id())));
    }

    let peaks = filter.apply(spectrum.peaks().to_vec(), Precursor::of(spectrum));
    if peaks.is_empty() {
        return Err(Error::EmptySpectrum { id: spectrum.id().to_string() });
    }
    Ok(spectrum.with_peaks(peaks))
}

// Indices sorted by descending intensity, ties by ascending m/z.
fn indices_by_intensity(peaks: &[Peak]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..peaks.len()).collect();
    indices.sort_by_key(|&i| {
        (Reverse(OrderedFloat(peaks[i].intensity)), OrderedFloat(peaks[i].mz))
    });
    indices
}

fn select_sorted(peaks: &[Peak], mut indices: Vec<usize>) -> Vec<Peak> {
    indices.sort_unstable();
    indices.into_iter().map(|i| peaks[i]).collect()
}
