//! Error types for the measurement pipeline

use thiserror::Error;

/// Measurement error type
#[derive(Error, Debug)]
pub enum MeterError {
    /// Zero-length or channel-less PCM buffer
    #[error("Empty PCM buffer: nothing to measure")]
    EmptyBuffer,

    /// Channel sample counts disagree
    #[error("Channel length mismatch: expected {expected}, got {got}")]
    ChannelMismatch {
        /// Expected samples per channel
        expected: usize,
        /// Actual samples in the offending channel
        got: usize,
    },

    /// Invalid measurement parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for measurement operations
pub type MeterResult<T> = Result<T, MeterError>;
