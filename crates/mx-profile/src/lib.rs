//! Reference profiles and conformance scoring
//!
//! The offline half of MixConform: decode audio at the boundary
//! ([`loader`]), fan tracks out over a worker pool ([`batch`]),
//! aggregate a reference corpus into a versioned target/tolerance
//! profile ([`builder`]), diff a candidate corpus against an existing
//! profile ([`calibrator`]) and score individual mixes against the
//! targets ([`scoring`]).
//!
//! Measurement itself lives in `mx-dsp`; nothing in this crate touches
//! PCM beyond handing it to the pipeline, so the storage boundary can
//! be swapped without disturbing the math.

#![warn(missing_docs)]

pub mod batch;
pub mod builder;
pub mod calibrator;
pub mod error;
pub mod loader;
pub mod profile;
pub mod scoring;

pub use batch::{measure_files, BatchOptions, TrackMeasurement};
pub use builder::{build, build_from_dir, AggregationMethod, BuildOptions};
pub use calibrator::{
    calibrate, calibrate_measurements, CalibrateOptions, CalibrationReport, Severity,
};
pub use error::{ProfileError, ProfileResult};
pub use profile::{BandTarget, ReferenceProfile};
pub use scoring::{score, Classification, MetricScore, MetricStatus, ScoreResult};
