//! Error types for the engine.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing source/sample, bad histogram configuration, exponents
    /// requested on a non-time histogram, and similar pre-run mistakes.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// A dataset could not be opened, created, or extended by an
    /// [`crate::sink::OutputSink`] implementation.
    #[error("I/O failure at '{path}': {source}")]
    IoFailure {
        /// The path or dataset name the failure occurred at.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed input description or an unrecognized token in it.
    #[error("parse error: {0}")]
    ParseError(String),
    /// A walker produced a non-finite intermediate value. Carries enough
    /// context to reproduce the failing walker from a fresh RNG state.
    #[error("numerical anomaly for seed {seed}, walker {walker_index}: {detail}")]
    NumericalAnomaly {
        /// The RNG seed the owning worker was started with.
        seed: u32,
        /// The index of the walker within its worker's share of the run.
        walker_index: u64,
        /// A short description of what went non-finite.
        detail: String,
    },
    /// An error that does not originate in this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
