//! Quasi-random sampling of the synthesis grid.
//!
//! Draws latin hypercube samples in (log-age, metallicity), scaled to the
//! grid's bounds, requests a unit-mass incident spectrum for each, and
//! filters the result to the optical/near-IR window. Grid failures
//! propagate unmodified.

use crate::error::SpecAeError;
use crate::grid::SpsGrid;
use crate::tensor::SimpleRng;

/// Retained wavelength window in Å (exclusive on both ends).
pub const WAVELENGTH_MIN: f64 = 1000.0;
pub const WAVELENGTH_MAX: f64 = 10000.0;

/// One batch of sampled spectra, row-major [n_samples, n_wavelength].
pub struct SampledSpectra {
    pub spectra: Vec<f32>,
    pub n_wavelength: usize,
    /// Retained wavelengths, strictly inside (1000, 10000) Å.
    pub wavelength: Vec<f64>,
    /// log10(age/yr) per sample.
    pub ages: Vec<f32>,
    /// Metallicity per sample.
    pub metallicities: Vec<f32>,
}

impl SampledSpectra {
    pub fn len(&self) -> usize {
        self.ages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }
}

/// Latin hypercube design: n points in d dimensions, each dimension
/// stratified into n equal bins with one point per bin, bins visited in a
/// fresh random order per dimension. Flat row-major [n, d], values in [0, 1).
pub fn latin_hypercube(n: usize, d: usize, rng: &mut SimpleRng) -> Vec<f64> {
    let mut samples = vec![0.0f64; n * d];
    for dim in 0..d {
        let perm = rng.permutation(n);
        for (row, &bin) in perm.iter().enumerate() {
            let jitter = rng.uniform01() as f64;
            samples[row * d + dim] = (bin as f64 + jitter) / n as f64;
        }
    }
    samples
}

/// Scale unit-cube samples to per-dimension (min, max) bounds, in place.
pub fn scale_to_bounds(samples: &mut [f64], bounds: &[(f64, f64)]) {
    let d = bounds.len();
    debug_assert_eq!(samples.len() % d, 0);
    for point in samples.chunks_mut(d) {
        for (v, &(lo, hi)) in point.iter_mut().zip(bounds.iter()) {
            *v = lo + *v * (hi - lo);
        }
    }
}

/// Draw `num_samples` (log-age, metallicity) points from the grid's domain
/// and synthesize their unit-mass incident spectra, filtered to the
/// (1000, 10000) Å window.
///
/// # Errors
///
/// Propagates grid lookup failures; [`SpecAeError::Shape`] if the window
/// filter leaves no wavelength bins.
pub fn sample_grid_spectra(
    grid: &SpsGrid,
    num_samples: usize,
    seed: u64,
) -> Result<SampledSpectra, SpecAeError> {
    let mut rng = SimpleRng::new(seed);
    let bounds = [grid.log_age_bounds(), grid.metallicity_bounds()];
    let mut samples = latin_hypercube(num_samples, 2, &mut rng);
    scale_to_bounds(&mut samples, &bounds);

    let keep: Vec<usize> = grid
        .wavelength()
        .iter()
        .enumerate()
        .filter(|(_, &wl)| wl > WAVELENGTH_MIN && wl < WAVELENGTH_MAX)
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return Err(SpecAeError::Shape(format!(
            "no grid wavelengths inside ({WAVELENGTH_MIN}, {WAVELENGTH_MAX}) Å"
        )));
    }
    let wavelength: Vec<f64> = keep.iter().map(|&i| grid.wavelength()[i]).collect();

    let n_wl = keep.len();
    let mut spectra = Vec::with_capacity(num_samples * n_wl);
    let mut ages = Vec::with_capacity(num_samples);
    let mut metallicities = Vec::with_capacity(num_samples);

    for point in samples.chunks(2) {
        let (log_age, met) = (point[0], point[1]);
        let full = grid.incident_spectrum(log_age, met)?;
        for &i in &keep {
            spectra.push(full[i] as f32);
        }
        ages.push(log_age as f32);
        metallicities.push(met as f32);
    }

    Ok(SampledSpectra {
        spectra,
        n_wavelength: n_wl,
        wavelength,
        ages,
        metallicities,
    })
}
