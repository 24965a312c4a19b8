//! Per-track measurement pipeline
//!
//! One call runs every engine over a decoded buffer and returns the
//! complete [`MeasurementSet`] the profile builder, calibrator and
//! scorer all consume.
//!
//! Ordering matters: loudness is metered on the raw material, the
//! buffer is then gained to the configured normalization target, and
//! true peak, stereo width, dynamic range and the band profile are
//! measured post-normalization so spectral and dynamic targets stay
//! loudness-invariant. DC offset and hard clipping are raw-signal
//! health checks and skip the normalization.

use crate::bands::{self, BandProfile, SpectralDescriptors};
use crate::loudness::{self, LoudnessResult};
use crate::stereo::{self, StereoImage};
use crate::stft;
use crate::true_peak::{self, OversampleMode, TruePeakResult};
use mx_core::{AnalysisConfig, MeterResult, PcmBuffer};
use serde::{Deserialize, Serialize};

/// Everything the pipeline measures for one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementSet {
    /// Sample rate of the analyzed material (Hz)
    pub sample_rate: u32,
    /// Material length in seconds
    pub duration_secs: f64,
    /// Gated loudness measured on the raw signal
    pub loudness: LoudnessResult,
    /// Gain applied before the post-normalization measurements (dB)
    pub normalization_gain_db: f64,
    /// True peak of the normalized signal
    pub true_peak: TruePeakResult,
    /// Crest-factor dynamic range of the normalized signal (dB)
    pub dynamic_range_db: f64,
    /// Width and correlation
    pub stereo: StereoImage,
    /// Largest absolute channel mean of the raw signal
    pub dc_offset: f64,
    /// Raw samples at or above the hard-clip threshold
    pub clipped_samples: usize,
    /// Per-band relative energy of the normalized mono mix
    pub bands: BandProfile,
    /// Spectral shape descriptors of the normalized mono mix
    pub spectral: SpectralDescriptors,
}

/// Run the full measurement pipeline over one buffer.
pub fn measure_track(pcm: &PcmBuffer, config: &AnalysisConfig) -> MeterResult<MeasurementSet> {
    let loudness = loudness::measure(pcm)?;

    // Silence has no integrated loudness to normalize against; leave
    // the buffer untouched and let the sentinel values flow through.
    let normalization_gain_db = if loudness.integrated_lufs.is_finite() {
        config.normalization_lufs - loudness.integrated_lufs
    } else {
        0.0
    };
    let normalized = pcm.with_gain_db(normalization_gain_db);

    let mode = if config.precise_true_peak {
        OversampleMode::Precise8x
    } else {
        OversampleMode::Legacy4x
    };
    let true_peak = true_peak::detect(&normalized, mode)?;
    let dynamic_range_db = stereo::crest_dynamic_range(&normalized);
    let stereo_image = stereo::image(&normalized)?;

    let mono = normalized.to_mono();
    let spectrogram = stft::analyze(
        &mono,
        normalized.sample_rate(),
        config.stft_window_len,
        config.stft_hop,
    )?;
    let band_profile = bands::profile(&spectrogram)?;
    let spectral = bands::descriptors(&spectrogram)?;

    log::debug!(
        "measured {:.1}s @ {} Hz: {:.2} LUFS, TP {:.2} dBTP, gain {:+.2} dB",
        pcm.duration(),
        pcm.sample_rate(),
        loudness.integrated_lufs,
        true_peak.true_peak_db,
        normalization_gain_db
    );

    Ok(MeasurementSet {
        sample_rate: pcm.sample_rate(),
        duration_secs: pcm.duration(),
        loudness,
        normalization_gain_db,
        true_peak,
        dynamic_range_db,
        stereo: stereo_image,
        dc_offset: stereo::dc_offset(pcm),
        clipped_samples: stereo::clipped_sample_count(pcm),
        bands: band_profile,
        spectral,
    })
}
