//! Pipeline configuration
//!
//! One explicit struct constructed by the caller and passed by
//! reference into each component; there is no process-wide mutable
//! configuration anywhere in the pipeline.

use serde::{Deserialize, Serialize};

/// Configuration for the per-track measurement pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Canonical sample rate all tracks are resampled to (Hz)
    pub canonical_sample_rate: u32,

    /// Normalization target applied before loudness-invariant
    /// measurements (integrated LUFS)
    pub normalization_lufs: f64,

    /// STFT analysis window length in samples (FFT size is the next
    /// power of two at or above this)
    pub stft_window_len: usize,

    /// STFT hop size in samples
    pub stft_hop: usize,

    /// Use the 8x/192-tap true-peak interpolator instead of the
    /// legacy 4x/48-tap set
    pub precise_true_peak: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            canonical_sample_rate: 48_000,
            normalization_lufs: -14.0,
            stft_window_len: 4096,
            stft_hop: 1024,
            precise_true_peak: false,
        }
    }
}
