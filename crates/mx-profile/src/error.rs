//! Profile-layer error types

use thiserror::Error;

/// Errors from loading, building, calibrating or scoring.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Measurement engine failure
    #[error(transparent)]
    Meter(#[from] mx_core::MeterError),

    /// File system failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile JSON failure
    #[error("profile serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A file could not be decoded as audio
    #[error("failed to load {path}: {reason}")]
    Load {
        /// Offending file
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Resampling to the canonical rate failed
    #[error("resample failed for {path}: {reason}")]
    Resample {
        /// Offending file
        path: String,
        /// Resampler message
        reason: String,
    },

    /// A batch produced no usable tracks
    #[error("no usable tracks in corpus ({scanned} scanned, all failed or skipped)")]
    EmptyCorpus {
        /// Files looked at before giving up
        scanned: usize,
    },

    /// Calibration write refused because coverage is too low
    #[error("coverage {coverage:.2} below required minimum {min_ok:.2}, profile not written")]
    CoverageBelowMinimum {
        /// Worst per-metric pass rate observed
        coverage: f64,
        /// Configured floor
        min_ok: f64,
    },
}

/// Convenience alias used across the profile layer.
pub type ProfileResult<T> = Result<T, ProfileError>;
