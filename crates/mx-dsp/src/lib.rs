//! MixConform measurement engines
//!
//! Offline analysis of complete PCM buffers:
//! - **Loudness Meter**: K-weighted, two-stage-gated LUFS/LRA
//!   (ITU-R BS.1770-4 / EBU R128)
//! - **True Peak Detector**: polyphase-oversampled inter-sample peak
//!   estimation (legacy 4x and precise 8x modes)
//! - **STFT Engine**: windowed FFT spectrogram producer
//! - **Band Profiler**: per-band relative energy + spectral descriptors
//! - **Stereo/health metrics**: width, correlation, DC offset, clipping
//!
//! All components consume a borrowed [`mx_core::PcmBuffer`] and keep
//! every piece of filter state local to one call; nothing is shared
//! across tracks.

#![warn(missing_docs)]

pub mod bands;
pub mod loudness;
pub mod measurement;
pub mod stereo;
pub mod stft;
pub mod true_peak;

pub use bands::{BandProfile, SpectralDescriptors, BAND_TABLE, REFERENCE_BAND};
pub use loudness::{LoudnessResult, LraMode};
pub use measurement::MeasurementSet;
pub use stereo::StereoImage;
pub use stft::Spectrogram;
pub use true_peak::{OversampleMode, TruePeakResult};
