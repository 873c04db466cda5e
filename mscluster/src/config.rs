//! Clustering configuration.
//!
//! A single immutable value built once (from defaults or JSON) and passed by reference
//! into every filter, scorer and engine constructor.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Similarity checker used to compare two peak lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    /// Fisher's method over peak-overlap significance and intensity agreement.
    CombinedFisherIntensity,
    /// Hypergeometric tail of the matched-peak count only.
    FisherExact,
    /// Normalized dot product over the most intense peaks.
    FrankDotProduct,
}

impl Default for SimilarityKind {
    fn default() -> Self {
        SimilarityKind::CombinedFisherIntensity
    }
}

/// Configuration for spectrum filtering, scoring and clustering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    /// Maximum m/z difference for two fragment peaks to match (default: 0.5)
    pub fragment_tolerance: f64,
    /// Precursor m/z window of the incremental engine (default: 2.0)
    pub precursor_tolerance: f64,
    /// Similarity at or above which a spectrum joins a cluster (default: 0.99)
    pub similarity_threshold: f64,
    /// Similarity below which non-greedy engines would drop members (default: 0.6)
    pub retain_threshold: f64,
    /// Additional full passes over the clusters of the previous pass (default: 2)
    pub reclustering_passes: usize,
    /// Comparisons needed before CDF calibration applies (default: 0)
    pub min_comparisons: usize,
    /// Number of most intense peaks used by the major-peak pre-screen (default: 5)
    pub major_peak_count: usize,
    /// Skip scoring when two clusters share no major peak (default: false)
    pub major_peak_prescreen: bool,
    /// Precursor m/z width of one shard in sharded runs (default: 1000.0)
    pub large_binning_region: f64,
    /// Peaks compared by the dot-product scorer (default: 15)
    pub number_compared_peaks: usize,
    /// Storage-time peak cap, also the consensus peak cap (default: 150)
    pub max_stored_peaks: usize,
    /// Margin above the singly-charged precursor mass for impossible peaks (default: 3.0)
    pub impossible_peak_margin: f64,
    /// Fraction of total ion current retained by the comparison filter (default: 0.5)
    pub comparison_tic_fraction: f64,
    /// Peak cap of the comparison filter (default: 20)
    pub comparison_max_peaks: usize,
    /// Most intense peaks kept per m/z bin at storage time; `None` disables binning (default: None)
    pub storage_peaks_per_bin: Option<usize>,
    /// Width of one storage bin in m/z (default: 100.0)
    pub storage_bin_size: f64,
    /// Overlap of consecutive storage bins in m/z (default: 50.0)
    pub storage_bin_overlap: f64,
    /// Similarity checker kind (default: combined Fisher / intensity test)
    pub similarity: SimilarityKind,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        ClusteringParams {
            fragment_tolerance: 0.5,
            precursor_tolerance: 2.0,
            similarity_threshold: 0.99,
            retain_threshold: 0.6,
            reclustering_passes: 2,
            min_comparisons: 0,
            major_peak_count: 5,
            major_peak_prescreen: false,
            large_binning_region: 1000.0,
            number_compared_peaks: 15,
            max_stored_peaks: 150,
            impossible_peak_margin: 3.0,
            comparison_tic_fraction: 0.5,
            comparison_max_peaks: 20,
            storage_peaks_per_bin: None,
            storage_bin_size: 100.0,
            storage_bin_overlap: 50.0,
            similarity: SimilarityKind::default(),
        }
    }
}

impl ClusteringParams {
    /// Parse parameters from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: ClusteringParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Read and validate parameters from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check every value; nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        check_fragment_tolerance(self.fragment_tolerance)?;
        check_window_size(self.precursor_tolerance)?;
        check_threshold("similarity_threshold", self.similarity_threshold)?;
        check_threshold("retain_threshold", self.retain_threshold)?;

        if !self.large_binning_region.is_finite() || self.large_binning_region <= 0.0 {
            let message = format!("must be positive, got {}", self.large_binning_region);
            return Err(Error::invalid("large_binning_region", message));
        }
        if !self.impossible_peak_margin.is_finite() || self.impossible_peak_margin < 0.0 {
            let message = format!("must be non-negative, got {}", self.impossible_peak_margin);
            return Err(Error::invalid("impossible_peak_margin", message));
        }
        if !(self.comparison_tic_fraction > 0.0 && self.comparison_tic_fraction <= 1.0) {
            let message = format!("must be in (0, 1], got {}", self.comparison_tic_fraction);
            return Err(Error::invalid("comparison_tic_fraction", message));
        }
        if let Some(per_bin) = self.storage_peaks_per_bin {
            if per_bin == 0 {
                return Err(Error::invalid("storage_peaks_per_bin", "must be at least 1"));
            }
            if !self.storage_bin_size.is_finite() || self.storage_bin_size <= 0.0 {
                let message = format!("must be positive, got {}", self.storage_bin_size);
                return Err(Error::invalid("storage_bin_size", message));
            }
            let (size, overlap) = (self.storage_bin_size, self.storage_bin_overlap);
            if !(overlap >= 0.0 && overlap < size) {
                let message = format!("must be in [0, {}), got {}", size, overlap);
                return Err(Error::invalid("storage_bin_overlap", message));
            }
        }
        for (name, value) in [
            ("max_stored_peaks", self.max_stored_peaks),
            ("comparison_max_peaks", self.comparison_max_peaks),
            ("number_compared_peaks", self.number_compared_peaks),
            ("major_peak_count", self.major_peak_count),
        ] {
            if value == 0 {
                return Err(Error::invalid(name, "must be at least 1"));
            }
        }
        Ok(())
    }
}

pub(crate) fn check_fragment_tolerance(tolerance: f64) -> Result<()> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        let message = format!("must be positive, got {}", tolerance);
        return Err(Error::invalid("fragment_tolerance", message));
    }
    Ok(())
}

pub(crate) fn check_window_size(window: f64) -> Result<()> {
    if !window.is_finite() || window < 0.0 {
        let message = format!("must be non-negative, got {}", window);
        return Err(Error::invalid("precursor_tolerance", message));
    }
    Ok(())
}

pub(crate) fn check_threshold(name: &'static str, threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::invalid(name, format!("must be in [0, 1], got {}", threshold)));
    }
    Ok(())
}
