//! Dense autoencoder for stellar-population synthesis spectra.
//!
//! The pipeline: sample a synthesis grid quasi-randomly in (log-age,
//! metallicity), normalize the resulting spectra into a dataset with
//! frozen shared statistics, and train a symmetric dense autoencoder with
//! batch normalization to compress each spectrum into a low-dimensional
//! latent code.

pub mod adamw;
pub mod backward;
pub mod dataset;
pub mod error;
pub mod forward;
pub mod grid;
pub mod model;
pub mod plot;
pub mod sampler;
pub mod tensor;
pub mod trainer;
