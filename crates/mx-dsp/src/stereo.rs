//! Stereo image and signal-health metrics
//!
//! Width and correlation from mid/side decomposition, plus the raw
//! health checks (DC offset, crest-factor dynamic range, hard sample
//! clipping) that do not need a reference profile to be meaningful.

use mx_core::{linear_to_db, MeterResult, PcmBuffer};
use serde::{Deserialize, Serialize};

/// Linear threshold treated as hard converter clipping.
pub const CLIP_THRESHOLD: f64 = 0.99;

/// Mid/side stereo measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoImage {
    /// `RMS(side) / RMS(mid)`, clamped to `[0, 1]`; 0 for mono
    pub width: f64,
    /// Pearson correlation between left and right, `[-1, 1]`; 1 for mono
    pub correlation: f64,
}

/// Compute width and correlation.
///
/// Mono material is perfectly correlated with zero width by
/// definition. A silent buffer also reports `(0.0, 1.0)` rather than
/// NaN.
pub fn image(pcm: &PcmBuffer) -> MeterResult<StereoImage> {
    if pcm.num_channels() < 2 {
        return Ok(StereoImage {
            width: 0.0,
            correlation: 1.0,
        });
    }

    let left = pcm.channel(0);
    let right = pcm.channel(1);
    let n = left.len() as f64;

    let mut mid_sq = 0.0f64;
    let mut side_sq = 0.0f64;
    let mut sum_l = 0.0f64;
    let mut sum_r = 0.0f64;
    let mut sum_lr = 0.0f64;
    let mut sum_ll = 0.0f64;
    let mut sum_rr = 0.0f64;

    for (&l, &r) in left.iter().zip(right.iter()) {
        let mid = (l + r) * 0.5;
        let side = (l - r) * 0.5;
        mid_sq += mid * mid;
        side_sq += side * side;
        sum_l += l;
        sum_r += r;
        sum_lr += l * r;
        sum_ll += l * l;
        sum_rr += r * r;
    }

    let width = if mid_sq > 0.0 {
        ((side_sq / mid_sq).sqrt()).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let cov = sum_lr - sum_l * sum_r / n;
    let var_l = sum_ll - sum_l * sum_l / n;
    let var_r = sum_rr - sum_r * sum_r / n;
    let denom = (var_l * var_r).sqrt();
    let correlation = if denom > 0.0 {
        (cov / denom).clamp(-1.0, 1.0)
    } else {
        1.0
    };

    Ok(StereoImage { width, correlation })
}

/// Largest absolute per-channel mean, the usual DC-offset figure.
pub fn dc_offset(pcm: &PcmBuffer) -> f64 {
    pcm.channels()
        .iter()
        .map(|ch| {
            if ch.is_empty() {
                0.0
            } else {
                (ch.iter().sum::<f64>() / ch.len() as f64).abs()
            }
        })
        .fold(0.0, f64::max)
}

/// Crest-factor dynamic range: `peak_dB - RMS_dB` over all channels.
///
/// Silence reports 0 dB rather than the indeterminate `-inf - -inf`.
pub fn crest_dynamic_range(pcm: &PcmBuffer) -> f64 {
    let peak = pcm.peak();
    let rms = pcm.rms();
    if peak <= 0.0 || rms <= 0.0 {
        return 0.0;
    }
    linear_to_db(peak) - linear_to_db(rms)
}

/// Count samples at or above the hard-clip threshold, all channels.
pub fn clipped_sample_count(pcm: &PcmBuffer) -> usize {
    pcm.channels()
        .iter()
        .map(|ch| ch.iter().filter(|s| s.abs() >= CLIP_THRESHOLD).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, rate: u32, len: usize, amp: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_identical_channels_zero_width() {
        let s = sine(440.0, 48000, 48000, 0.5);
        let pcm = PcmBuffer::stereo(48000, s.clone(), s).unwrap();
        let img = image(&pcm).unwrap();
        assert!(img.width < 1e-9);
        assert!((img.correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_channels_full_width() {
        let s = sine(440.0, 48000, 48000, 0.5);
        let inv: Vec<f64> = s.iter().map(|x| -x).collect();
        let pcm = PcmBuffer::stereo(48000, s, inv).unwrap();
        let img = image(&pcm).unwrap();
        // Out-of-phase: no mid energy, width clamps at 1
        assert!((img.width - 1.0).abs() < 1e-9);
        assert!((img.correlation + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mono_is_narrow_and_correlated() {
        let pcm = PcmBuffer::mono(48000, sine(440.0, 48000, 4800, 0.5)).unwrap();
        let img = image(&pcm).unwrap();
        assert_eq!(img.width, 0.0);
        assert_eq!(img.correlation, 1.0);
    }

    #[test]
    fn test_silence_has_no_nan() {
        let pcm = PcmBuffer::stereo(48000, vec![0.0; 4800], vec![0.0; 4800]).unwrap();
        let img = image(&pcm).unwrap();
        assert!(!img.width.is_nan());
        assert!(!img.correlation.is_nan());
        assert_eq!(crest_dynamic_range(&pcm), 0.0);
        assert_eq!(dc_offset(&pcm), 0.0);
    }

    #[test]
    fn test_dc_offset_detected() {
        let samples: Vec<f64> = sine(440.0, 48000, 48000, 0.3)
            .into_iter()
            .map(|s| s + 0.05)
            .collect();
        let pcm = PcmBuffer::mono(48000, samples).unwrap();
        let dc = dc_offset(&pcm);
        assert!((dc - 0.05).abs() < 1e-3, "dc {dc}");
    }

    #[test]
    fn test_sine_crest_factor() {
        let pcm = PcmBuffer::mono(48000, sine(997.0, 48000, 96000, 0.5)).unwrap();
        let dr = crest_dynamic_range(&pcm);
        // Sine crest factor is sqrt(2), about 3.01 dB
        assert!((dr - 3.01).abs() < 0.1, "dr {dr}");
    }

    #[test]
    fn test_clipped_count() {
        let mut samples = sine(440.0, 48000, 4800, 0.5);
        samples[10] = 1.0;
        samples[11] = -1.0;
        samples[12] = 0.995;
        let pcm = PcmBuffer::mono(48000, samples).unwrap();
        assert_eq!(clipped_sample_count(&pcm), 3);
    }
}
