//! Stellar population synthesis grid loading and spectrum lookup.
//!
//! A grid is a precomputed table of unit-mass incident spectra indexed by
//! (age, metallicity), exported to JSON by the upstream synthesis library.
//! Uses streaming `from_reader` to avoid buffering the entire file in memory
//! as an intermediate string.
//!
//! Failures (missing file, malformed JSON, out-of-bounds lookup) propagate
//! as [`SpecAeError`] without remediation.

use crate::error::SpecAeError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// On-disk grid layout: axes plus a row-major spectra block.
#[derive(Debug, Deserialize)]
struct GridFile {
    /// Stellar ages in yr, ascending.
    ages: Vec<f64>,
    /// Metallicities (mass fraction), ascending.
    metallicities: Vec<f64>,
    /// Wavelengths in Å.
    wavelength: Vec<f64>,
    /// Spectral luminosity densities, [n_age, n_met, n_wavelength] row-major.
    spectra: Vec<f64>,
}

/// In-memory synthesis grid. Ages are held as log10(age/yr) because both the
/// sampler and the dataset work in log-age space.
pub struct SpsGrid {
    log_ages: Vec<f64>,
    metallicities: Vec<f64>,
    wavelength: Vec<f64>,
    spectra: Vec<f64>,
}

impl SpsGrid {
    /// Resolve the path of a named grid under a grid directory.
    #[must_use]
    pub fn grid_path(grid_dir: &Path, grid_name: &str) -> PathBuf {
        grid_dir.join(grid_name)
    }

    /// Load a grid from `{grid_dir}/{grid_name}`.
    ///
    /// # Errors
    ///
    /// [`SpecAeError::GridLoad`] if the file cannot be opened or parsed;
    /// [`SpecAeError::Shape`] if axes and spectra block disagree or an axis
    /// is not strictly ascending.
    pub fn load(grid_dir: &Path, grid_name: &str) -> Result<Self, SpecAeError> {
        let path = Self::grid_path(grid_dir, grid_name);
        let file = std::fs::File::open(&path)
            .map_err(|e| SpecAeError::GridLoad(format!("{}: {e}", path.display())))?;
        let reader = std::io::BufReader::new(file);
        let raw: GridFile = serde_json::from_reader(reader)
            .map_err(|e| SpecAeError::GridLoad(format!("{}: {e}", path.display())))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: GridFile) -> Result<Self, SpecAeError> {
        let n_age = raw.ages.len();
        let n_met = raw.metallicities.len();
        let n_wl = raw.wavelength.len();

        if n_age < 2 || n_met < 2 {
            return Err(SpecAeError::Shape(format!(
                "grid needs at least 2 nodes per axis, got {n_age} ages x {n_met} metallicities"
            )));
        }
        if raw.spectra.len() != n_age * n_met * n_wl {
            return Err(SpecAeError::Shape(format!(
                "spectra block has {} values, expected {n_age}*{n_met}*{n_wl}",
                raw.spectra.len()
            )));
        }
        if raw.ages.iter().any(|&a| a <= 0.0) {
            return Err(SpecAeError::Shape("grid ages must be positive (yr)".into()));
        }

        let log_ages: Vec<f64> = raw.ages.iter().map(|a| a.log10()).collect();
        for axis in [&log_ages, &raw.metallicities] {
            if axis.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SpecAeError::Shape(
                    "grid axes must be strictly ascending".into(),
                ));
            }
        }

        Ok(SpsGrid {
            log_ages,
            metallicities: raw.metallicities,
            wavelength: raw.wavelength,
            spectra: raw.spectra,
        })
    }

    pub fn n_wavelength(&self) -> usize {
        self.wavelength.len()
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    /// (min, max) of log10(age/yr) covered by the grid.
    pub fn log_age_bounds(&self) -> (f64, f64) {
        (self.log_ages[0], self.log_ages[self.log_ages.len() - 1])
    }

    /// (min, max) metallicity covered by the grid.
    pub fn metallicity_bounds(&self) -> (f64, f64) {
        (
            self.metallicities[0],
            self.metallicities[self.metallicities.len() - 1],
        )
    }

    /// Unit-mass incident spectrum at an arbitrary grid point, by bilinear
    /// interpolation over the (log-age, metallicity) nodes.
    ///
    /// # Errors
    ///
    /// [`SpecAeError::OutOfBounds`] if the point lies outside the grid.
    pub fn incident_spectrum(&self, log_age: f64, metallicity: f64) -> Result<Vec<f64>, SpecAeError> {
        let (ia, ta) = bracket(&self.log_ages, log_age)
            .ok_or_else(|| SpecAeError::OutOfBounds(format!(
                "log_age={log_age} outside [{}, {}]",
                self.log_ages[0],
                self.log_ages[self.log_ages.len() - 1]
            )))?;
        let (im, tm) = bracket(&self.metallicities, metallicity)
            .ok_or_else(|| SpecAeError::OutOfBounds(format!(
                "metallicity={metallicity} outside [{}, {}]",
                self.metallicities[0],
                self.metallicities[self.metallicities.len() - 1]
            )))?;

        let n_wl = self.wavelength.len();
        let n_met = self.metallicities.len();
        let node = |i: usize, j: usize| -> &[f64] {
            let base = (i * n_met + j) * n_wl;
            &self.spectra[base..base + n_wl]
        };

        let s00 = node(ia, im);
        let s01 = node(ia, im + 1);
        let s10 = node(ia + 1, im);
        let s11 = node(ia + 1, im + 1);

        let mut out = vec![0.0f64; n_wl];
        for k in 0..n_wl {
            let low = s00[k] * (1.0 - tm) + s01[k] * tm;
            let high = s10[k] * (1.0 - tm) + s11[k] * tm;
            out[k] = low * (1.0 - ta) + high * ta;
        }
        Ok(out)
    }
}

/// Find the cell [axis[i], axis[i+1]] containing x and the fractional
/// position t in it. Returns None if x is outside the axis range.
fn bracket(axis: &[f64], x: f64) -> Option<(usize, f64)> {
    let n = axis.len();
    if x < axis[0] || x > axis[n - 1] {
        return None;
    }
    // partition_point gives the first index with axis[i] > x
    let hi = axis.partition_point(|&a| a <= x);
    let i = if hi == n { n - 2 } else { hi - 1 };
    let span = axis[i + 1] - axis[i];
    let t = if span > 0.0 { (x - axis[i]) / span } else { 0.0 };
    Some((i, t))
}
