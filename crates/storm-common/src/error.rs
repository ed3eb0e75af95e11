//! Error types for the storm-sampler workspace.

use thiserror::Error;

/// Result type alias using StormError.
pub type StormResult<T> = Result<T, StormError>;

/// Primary error type for sample-pipeline operations.
#[derive(Debug, Error)]
pub enum StormError {
    // === Acquisition Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Stage '{stage}' timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    // === Decode Errors ===
    #[error("GRIB2 decode error: {0}")]
    Grib2(String),

    #[error("NetCDF error: {0}")]
    NetCdf(String),

    #[error("Zarr error: {0}")]
    Zarr(String),

    // === Grid / Alignment Errors ===
    #[error("Shape mismatch: expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),
}

impl StormError {
    /// Whether a fresh whole-sample attempt could plausibly clear this error.
    ///
    /// Archive lag surfaces as `NotFound`/`MissingData`; transport problems
    /// as `Storage`/`Timeout`/`Io`. Decode and shape errors are deterministic
    /// for a given candidate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StormError::NotFound(_)
                | StormError::MissingData(_)
                | StormError::Timeout { .. }
                | StormError::Storage(_)
                | StormError::Io(_)
        )
    }
}

// Conversion from common error types
impl From<std::io::Error> for StormError {
    fn from(err: std::io::Error) -> Self {
        StormError::Io(err.to_string())
    }
}
