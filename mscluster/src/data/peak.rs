use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// A single fragment peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Peak { mz, intensity }
    }

    /// Order by m/z, ties by intensity.
    pub fn cmp_mz(&self, other: &Peak) -> Ordering {
        self.mz.total_cmp(&other.mz).then_with(|| self.intensity.total_cmp(&other.intensity))
    }

    pub fn is_finite(&self) -> bool {
        self.mz.is_finite() && self.intensity.is_finite()
    }
}

impl Display for Peak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Peak({:.4}, {:.1})", self.mz, self.intensity)
    }
}

/// Sort peaks in place by ascending m/z.
pub fn sort_by_mz(peaks: &mut [Peak]) {
    peaks.sort_by(|a, b| a.cmp_mz(b));
}

/// Sum of all peak intensities.
pub fn total_intensity(peaks: &[Peak]) -> f64 {
    peaks.iter().map(|p| p.intensity).sum()
}
