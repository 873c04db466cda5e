//! Empirical cumulative distribution of raw similarity scores between unrelated spectra,
//! used to turn a best-of-n raw score into a calibrated probability.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Step function over ascending score limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CumulativeDistributionFunction {
    score_limits: Vec<f64>,
    cumulative: Vec<f64>,
}

impl CumulativeDistributionFunction {
    /// # Arguments
    ///
    /// * `score_limits` - Strictly ascending upper score limit of each step.
    /// * `cumulative` - Non-decreasing probability in [0, 1] of a score at or below each limit.
    pub fn new(score_limits: Vec<f64>, cumulative: Vec<f64>) -> Result<Self> {
        if score_limits.is_empty() {
            return Err(Error::InvalidInput("distribution table is empty".to_string()));
        }
        if score_limits.len() != cumulative.len() {
            return Err(Error::InvalidInput(format!(
                "distribution table has {} limits but {} probabilities",
                score_limits.len(),
                cumulative.len()
            )));
        }
        let ascending = score_limits.windows(2).all(|w| w[0] < w[1]);
        if score_limits.iter().any(|s| !s.is_finite()) || !ascending {
            return Err(Error::InvalidInput(
                "score limits must be finite and strictly ascending".to_string(),
            ));
        }
        let non_decreasing = cumulative.windows(2).all(|w| w[0] <= w[1]);
        if cumulative.iter().any(|p| !(0.0..=1.0).contains(p)) || !non_decreasing {
            return Err(Error::InvalidInput(
                "cumulative probabilities must be non-decreasing in [0, 1]".to_string(),
            ));
        }
        Ok(CumulativeDistributionFunction { score_limits, cumulative })
    }

    /// Parses a tab- or whitespace-separated table: score limit, then cumulative probability.
    /// Blank lines, `#` comments and a non-numeric header line are skipped; extra columns
    /// are ignored.
    pub fn from_tsv(text: &str) -> Result<Self> {
        let mut score_limits = Vec::new();
        let mut cumulative = Vec::new();

        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut columns = line.split_whitespace();
            let limit = columns.next().and_then(|c| c.parse::<f64>().ok());
            let probability = columns.next().and_then(|c| c.parse::<f64>().ok());
            match (limit, probability) {
                (Some(limit), Some(probability)) => {
                    score_limits.push(limit);
                    cumulative.push(probability);
                }
                // header
                _ if score_limits.is_empty() => continue,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "distribution table line {} is malformed: {}",
                        line_number + 1,
                        line
                    )))
                }
            }
        }
        Self::new(score_limits, cumulative)
    }

    /// Parses `{"score_limits": [...], "cumulative": [...]}` and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: CumulativeDistributionFunction = serde_json::from_str(json)?;
        Self::new(table.score_limits, table.cumulative)
    }

    /// Reads a table from disk; `.json` files are parsed as JSON, anything else as TSV.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_tsv(&text),
        }
    }

    pub fn len(&self) -> usize {
        self.score_limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.score_limits.is_empty()
    }

    /// Probability that an unrelated comparison scores at or below `score`: the value of the
    /// first step whose limit reaches `score`, 1.0 past the last limit.
    pub fn probability(&self, score: f64) -> f64 {
        let index = self.score_limits.partition_point(|&limit| limit < score);
        self.cumulative.get(index).copied().unwrap_or(1.0)
    }

    /// Probability that the best of `n_compared` unrelated comparisons scores above `raw`.
    ///
    /// Low values mean the raw score is unlikely to be a chance hit.
    pub fn calibrate(&self, raw: f64, n_compared: usize) -> f64 {
        let n = n_compared.max(1) as f64;
        1.0 - self.probability(raw).powf(n)
    }
}
