//! MixConform core primitives
//!
//! Shared building blocks for the measurement and scoring crates:
//! - **PcmBuffer**: owned, immutable per-channel float PCM
//! - **AnalysisConfig**: explicit pipeline configuration (no globals)
//! - **MeterError**: closed error-kind enum for the measurement path
//! - **stats**: robust statistics (median, percentile, MAD)

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod pcm;
pub mod stats;

pub use config::AnalysisConfig;
pub use error::{MeterError, MeterResult};
pub use pcm::PcmBuffer;

/// Convert a linear amplitude to decibels, with `-inf` for silence.
pub fn linear_to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Convert decibels to linear amplitude.
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversions() {
        assert!((linear_to_db(1.0)).abs() < 1e-12);
        assert!((linear_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(linear_to_db(0.0), f64::NEG_INFINITY);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
    }
}
