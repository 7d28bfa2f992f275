//! Typed errors for grid loading, sampling, and checkpointing.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes rather than parsing opaque strings.
//! There is no recovery logic anywhere: the driver aborts on the first error.

use std::fmt;

/// Errors arising from grid I/O, sampling, dataset construction, or
/// checkpoint persistence.
#[derive(Debug)]
pub enum SpecAeError {
    /// Grid file loading failed (path, underlying IO or parse error).
    GridLoad(String),

    /// A requested (log-age, metallicity) point lies outside the grid.
    OutOfBounds(String),

    /// Array dimensions do not line up (grid axes vs. spectra block,
    /// dataset rows vs. split indices).
    Shape(String),

    /// Checkpoint write or read failed.
    Checkpoint(String),
}

impl fmt::Display for SpecAeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridLoad(msg) => write!(f, "Grid loading failed: {msg}"),
            Self::OutOfBounds(msg) => write!(f, "Sample outside grid bounds: {msg}"),
            Self::Shape(msg) => write!(f, "Shape mismatch: {msg}"),
            Self::Checkpoint(msg) => write!(f, "Checkpoint failed: {msg}"),
        }
    }
}

impl std::error::Error for SpecAeError {}
