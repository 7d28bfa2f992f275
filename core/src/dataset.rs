//! Normalized spectral dataset with stat-preserving splits.
//!
//! Spectra are log10-transformed and z-scored per wavelength bin; age and
//! metallicity are z-scored independently. The normalization statistics are
//! computed once, frozen in an immutable [`NormStats`], and shared by
//! reference with every derived split — a child never recomputes them, so
//! train/test normalization is consistent by construction.

use crate::error::SpecAeError;
use crate::grid::SpsGrid;
use crate::sampler::{sample_grid_spectra, SampledSpectra};
use crate::tensor::SimpleRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Frozen normalization statistics: scalar mean/std for age and
/// metallicity, per-wavelength-bin mean/std vectors for the log-spectra.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormStats {
    pub age_mean: f32,
    pub age_std: f32,
    pub met_mean: f32,
    pub met_std: f32,
    pub spec_mean: Vec<f32>,
    pub spec_std: Vec<f32>,
}

/// Ordered collection of samples: raw physical parameters, normalized
/// condition pairs, and normalized log-spectra, all parallel arrays.
pub struct SpectralDataset {
    /// log10(age/yr), raw.
    pub ages: Vec<f32>,
    /// Metallicity, raw.
    pub metallicities: Vec<f32>,
    /// Normalized (age, metallicity) pairs, row-major [n, 2].
    pub conditions: Vec<f32>,
    /// Normalized log-spectra, row-major [n, n_wavelength].
    pub spectra: Vec<f32>,
    pub n_wavelength: usize,
    stats: Arc<NormStats>,
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (mean, var.sqrt())
}

impl SpectralDataset {
    /// Build a dataset by sampling `num_samples` spectra from a grid file.
    ///
    /// # Errors
    ///
    /// Propagates grid loading and sampling failures.
    pub fn from_grid(
        grid_dir: &Path,
        grid_name: &str,
        num_samples: usize,
        seed: u64,
    ) -> Result<Self, SpecAeError> {
        let grid = SpsGrid::load(grid_dir, grid_name)?;
        let samples = sample_grid_spectra(&grid, num_samples, seed)?;
        Self::from_samples(samples)
    }

    /// Build a dataset from raw sampled spectra: log10 transform, compute
    /// the normalization statistics, normalize everything.
    ///
    /// # Errors
    ///
    /// [`SpecAeError::Shape`] if the parallel arrays disagree.
    pub fn from_samples(samples: SampledSpectra) -> Result<Self, SpecAeError> {
        let n = samples.len();
        let n_wl = samples.n_wavelength;
        if samples.spectra.len() != n * n_wl || samples.metallicities.len() != n {
            return Err(SpecAeError::Shape(format!(
                "sampled arrays disagree: {} spectra values for {n} samples x {n_wl} bins",
                samples.spectra.len()
            )));
        }
        if n == 0 {
            return Err(SpecAeError::Shape("cannot normalize an empty dataset".into()));
        }

        let (age_mean, age_std) = mean_std(&samples.ages);
        let (met_mean, met_std) = mean_std(&samples.metallicities);

        // log10 first, then per-bin stats over the sample axis.
        let mut log_spectra: Vec<f32> = samples.spectra.iter().map(|v| v.log10()).collect();
        let mut spec_mean = vec![0.0f32; n_wl];
        let mut spec_std = vec![0.0f32; n_wl];
        for j in 0..n_wl {
            let mut sum = 0.0f32;
            for i in 0..n {
                sum += log_spectra[i * n_wl + j];
            }
            let mean = sum / n as f32;
            let mut var = 0.0f32;
            for i in 0..n {
                let d = log_spectra[i * n_wl + j] - mean;
                var += d * d;
            }
            spec_mean[j] = mean;
            spec_std[j] = (var / n as f32).sqrt();
        }
        for i in 0..n {
            for j in 0..n_wl {
                let v = &mut log_spectra[i * n_wl + j];
                *v = (*v - spec_mean[j]) / spec_std[j];
            }
        }

        let mut conditions = Vec::with_capacity(n * 2);
        for i in 0..n {
            conditions.push((samples.ages[i] - age_mean) / age_std);
            conditions.push((samples.metallicities[i] - met_mean) / met_std);
        }

        Ok(SpectralDataset {
            ages: samples.ages,
            metallicities: samples.metallicities,
            conditions,
            spectra: log_spectra,
            n_wavelength: n_wl,
            stats: Arc::new(NormStats {
                age_mean,
                age_std,
                met_mean,
                met_std,
                spec_mean,
                spec_std,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.ages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    /// Shared handle to the normalization statistics.
    pub fn stats(&self) -> &Arc<NormStats> {
        &self.stats
    }

    /// One normalized spectrum row.
    pub fn spectrum(&self, idx: usize) -> &[f32] {
        &self.spectra[idx * self.n_wavelength..(idx + 1) * self.n_wavelength]
    }

    /// Derive a subset carrying the parent's statistics. The child holds a
    /// clone of the parent's `Arc<NormStats>` — the stats are shared, not
    /// recomputed.
    ///
    /// # Errors
    ///
    /// [`SpecAeError::Shape`] if any index is out of range.
    pub fn split(&self, indices: &[usize]) -> Result<Self, SpecAeError> {
        let n_wl = self.n_wavelength;
        let mut ages = Vec::with_capacity(indices.len());
        let mut metallicities = Vec::with_capacity(indices.len());
        let mut conditions = Vec::with_capacity(indices.len() * 2);
        let mut spectra = Vec::with_capacity(indices.len() * n_wl);
        for &i in indices {
            if i >= self.len() {
                return Err(SpecAeError::Shape(format!(
                    "split index {i} out of range for dataset of {}",
                    self.len()
                )));
            }
            ages.push(self.ages[i]);
            metallicities.push(self.metallicities[i]);
            conditions.extend_from_slice(&self.conditions[i * 2..i * 2 + 2]);
            spectra.extend_from_slice(self.spectrum(i));
        }
        Ok(SpectralDataset {
            ages,
            metallicities,
            conditions,
            spectra,
            n_wavelength: n_wl,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Permutation split into (train, test) with `train_frac` of the samples
    /// in the train subset. Both children share this dataset's statistics.
    ///
    /// # Errors
    ///
    /// Propagates [`SpecAeError::Shape`] from `split`.
    pub fn train_test_split(
        &self,
        train_frac: f32,
        rng: &mut SimpleRng,
    ) -> Result<(Self, Self), SpecAeError> {
        let perm = rng.permutation(self.len());
        let cut = (train_frac * self.len() as f32) as usize;
        let train = self.split(&perm[..cut])?;
        let test = self.split(&perm[cut..])?;
        Ok((train, test))
    }

    /// Inverse transform for a normalized log-spectrum. Returns log10
    /// luminosity density in the grid's units.
    pub fn unnormalize_spectrum(&self, spectrum: &[f32]) -> Vec<f32> {
        debug_assert_eq!(spectrum.len(), self.n_wavelength);
        spectrum
            .iter()
            .zip(self.stats.spec_std.iter().zip(self.stats.spec_mean.iter()))
            .map(|(&v, (&std, &mean))| v * std + mean)
            .collect()
    }

    /// Inverse transform for a normalized log-age.
    pub fn unnormalize_age(&self, norm_age: f32) -> f32 {
        norm_age * self.stats.age_std + self.stats.age_mean
    }

    /// Inverse transform for a normalized metallicity.
    pub fn unnormalize_metallicity(&self, norm_met: f32) -> f32 {
        norm_met * self.stats.met_std + self.stats.met_mean
    }
}
