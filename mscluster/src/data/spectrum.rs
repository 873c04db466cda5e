use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::data::peak::{self, Peak};

/// Represents a fragment spectrum with its precursor and a mass-sorted peak list.
///
/// Consensus spectra of clusters use the same shape, their precursor m/z being the
/// representative mass of the cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    id: String,
    precursor_mz: f64,
    charge: i32,
    peaks: Vec<Peak>,
    total_intensity: f64,
}

impl Spectrum {
    /// Constructs a new `Spectrum`, sorting the peaks by m/z.
    ///
    /// # Arguments
    ///
    /// * `id` - Spectrum identifier (e.g., "run-scan").
    /// * `precursor_mz` - Precursor m/z.
    /// * `charge` - Precursor charge, 0 if unknown.
    /// * `peaks` - Fragment peaks in any order.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mscluster::data::peak::Peak;
    /// # use mscluster::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new("s1", 400.2, 2, vec![Peak::new(200.0, 20.0), Peak::new(100.0, 10.0)]);
    /// assert_eq!(spectrum.peaks()[0].mz, 100.0);
    /// assert_eq!(spectrum.total_intensity(), 30.0);
    /// ```
    pub fn new(
        id: impl Into<String>,
        precursor_mz: f64,
        charge: i32,
        mut peaks: Vec<Peak>,
    ) -> Self {
        peak::sort_by_mz(&mut peaks);
        let total_intensity = peak::total_intensity(&peaks);
        Spectrum { id: id.into(), precursor_mz, charge, peaks, total_intensity }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn precursor_mz(&self) -> f64 {
        self.precursor_mz
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn total_intensity(&self) -> f64 {
        self.total_intensity
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Singly-charged (M+H) mass of the precursor, assuming charge 1 when unknown.
    pub fn singly_charged_mass(&self) -> f64 {
        singly_charged_mass(self.precursor_mz, self.charge)
    }

    /// Returns a copy of this spectrum carrying a different peak list.
    pub fn with_peaks(&self, peaks: Vec<Peak>) -> Self {
        Spectrum::new(self.id.clone(), self.precursor_mz, self.charge, peaks)
    }

    /// Returns a copy of this spectrum under a different identifier.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Spectrum { id: id.into(), ..self.clone() }
    }

    /// Most intense peak, if any.
    pub fn base_peak(&self) -> Option<&Peak> {
        self.peaks.iter().max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }
}

/// Proton mass in Daltons
pub const PROTON_MASS: f64 = 1.007276466812;

/// Converts a precursor m/z at `charge` to its singly-charged (M+H) mass; charge 0 counts as 1.
pub fn singly_charged_mass(precursor_mz: f64, charge: i32) -> f64 {
    let charge = charge.max(1) as f64;
    (precursor_mz - PROTON_MASS) * charge + PROTON_MASS
}

/// Formats the `Spectrum` for display.
impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.base_peak() {
            Some(p) => write!(f, "Spectrum({}, precursor: {:.4}, data points: {}, base peak:({:.3}, {}))",
                              self.id, self.precursor_mz, self.peaks.len(), p.mz, p.intensity),
            None => write!(f, "Spectrum({}, precursor: {:.4}, data points: 0)",
                           self.id, self.precursor_mz),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_peaks() {
        let spectrum = Spectrum::new(
            "s1",
            500.0,
            2,
            vec![Peak::new(300.0, 3.0), Peak::new(100.0, 1.0), Peak::new(200.0, 2.0)],
        );
        let mz: Vec<f64> = spectrum.peaks().iter().map(|p| p.mz).collect();
        assert_eq!(mz, vec![100.0, 200.0, 300.0]);
        assert!((spectrum.total_intensity() - 6.0).abs() < 1e-12);
        assert_eq!(spectrum.base_peak().map(|p| p.mz), Some(300.0));
    }

    #[test]
    fn test_singly_charged_mass() {
        let spectrum = Spectrum::new("s1", 500.0, 2, vec![]);
        assert!((spectrum.singly_charged_mass() - 998.992723533188).abs() < 1e-9);

        let unknown_charge = Spectrum::new("s2", 500.0, 0, vec![]);
        assert!((unknown_charge.singly_charged_mass() - 500.0).abs() < 1e-9);
    }
}
