//! Oversampled true-peak detection
//!
//! Estimates inter-sample peaks by running each channel through a
//! polyphase windowed-sinc interpolator and tracking the maximum
//! absolute value across every oversampled phase output. Two modes:
//! the legacy 4x/48-tap set and the precise 8x/192-tap upgrade, both
//! built at construction (cutoff pi/factor, Hamming window, each
//! phase DC-normalized to unity gain).
//!
//! Cost is O(taps x factor x samples) per channel and all-zero input
//! yields `-inf` dBTP rather than an error.

use mx_core::{linear_to_db, MeterResult, PcmBuffer};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Broadcast clip threshold in the oversampled domain (-1 dBTP, linear)
const DBTP_CLIP_THRESHOLD: f64 = 0.8912509381337456;
/// Sample-domain clip threshold (ordinary converter clipping)
const SAMPLE_CLIP_THRESHOLD: f64 = 0.99;

/// Interpolator variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversampleMode {
    /// 4x oversampling, 48 taps (12 per phase) — the legacy set
    #[default]
    Legacy4x,
    /// 8x oversampling, 192 taps (24 per phase)
    Precise8x,
}

impl OversampleMode {
    /// Oversampling factor.
    pub fn factor(&self) -> usize {
        match self {
            Self::Legacy4x => 4,
            Self::Precise8x => 8,
        }
    }

    /// Total prototype filter taps.
    pub fn taps(&self) -> usize {
        match self {
            Self::Legacy4x => 48,
            Self::Precise8x => 192,
        }
    }
}

/// Result of one true-peak measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruePeakResult {
    /// Linear true peak per channel
    pub channel_peaks_linear: Vec<f64>,
    /// dBTP true peak per channel (`-inf` for silent channels)
    pub channel_peaks_db: Vec<f64>,
    /// Combined linear true peak
    pub true_peak_linear: f64,
    /// Combined true peak in dBTP
    pub true_peak_db: f64,
    /// Oversampled-domain events above -1 dBTP
    pub clipped_oversampled: usize,
    /// Sample-domain events at or above 0.99 linear
    pub clipped_samples: usize,
    /// Interpolator used
    pub mode: OversampleMode,
    /// True when the combined peak is at or below -1 dBTP
    pub broadcast_compliant: bool,
}

/// Polyphase windowed-sinc interpolator.
pub struct TruePeakDetector {
    mode: OversampleMode,
    taps_per_phase: usize,
    /// Coefficients by phase, `phases[p][t]`
    phases: Vec<Vec<f64>>,
}

impl TruePeakDetector {
    /// Build the interpolator for the given mode.
    pub fn new(mode: OversampleMode) -> Self {
        let factor = mode.factor();
        let taps = mode.taps();
        let taps_per_phase = taps / factor;

        // Windowed-sinc low-pass, cutoff pi/factor
        let center = (taps - 1) as f64 / 2.0;
        let prototype: Vec<f64> = (0..taps)
            .map(|i| {
                let n = i as f64 - center;
                let sinc = if n.abs() < 1e-12 {
                    1.0 / factor as f64
                } else {
                    (PI * n / factor as f64).sin() / (PI * n)
                };
                let window = 0.54 - 0.46 * (2.0 * PI * i as f64 / (taps - 1) as f64).cos();
                sinc * window
            })
            .collect();

        // Polyphase decomposition, each phase normalized to unity DC
        // gain so a constant signal interpolates to itself exactly.
        let mut phases = vec![vec![0.0f64; taps_per_phase]; factor];
        for (i, &c) in prototype.iter().enumerate() {
            phases[i % factor][i / factor] = c;
        }
        for phase in &mut phases {
            let sum: f64 = phase.iter().sum();
            if sum.abs() > 1e-12 {
                for c in phase.iter_mut() {
                    *c /= sum;
                }
            }
        }

        Self {
            mode,
            taps_per_phase,
            phases,
        }
    }

    /// Interpolator mode.
    pub fn mode(&self) -> OversampleMode {
        self.mode
    }

    /// Scan one channel; returns (linear peak, oversampled clip count,
    /// sample-domain clip count).
    ///
    /// The delay line is local to this call.
    pub fn detect_channel(&self, samples: &[f64]) -> (f64, usize, usize) {
        let taps = self.taps_per_phase;
        let mut delay = vec![0.0f64; taps];
        let mut pos = 0usize;

        let mut peak = 0.0f64;
        let mut clipped_os = 0usize;
        let mut clipped_samples = 0usize;

        for &sample in samples {
            if sample.abs() >= SAMPLE_CLIP_THRESHOLD {
                clipped_samples += 1;
            }

            delay[pos] = sample;
            for phase in &self.phases {
                let mut acc = 0.0f64;
                for (tap, &c) in phase.iter().enumerate() {
                    let idx = (pos + taps - tap) % taps;
                    acc += delay[idx] * c;
                }
                let mag = acc.abs();
                if mag > peak {
                    peak = mag;
                }
                if mag > DBTP_CLIP_THRESHOLD {
                    clipped_os += 1;
                }
            }
            pos = (pos + 1) % taps;
        }

        (peak, clipped_os, clipped_samples)
    }
}

/// Measure true peak across all channels of a buffer.
pub fn detect(pcm: &PcmBuffer, mode: OversampleMode) -> MeterResult<TruePeakResult> {
    let detector = TruePeakDetector::new(mode);

    let mut channel_peaks_linear = Vec::with_capacity(pcm.num_channels());
    let mut clipped_oversampled = 0usize;
    let mut clipped_samples = 0usize;

    for ch in pcm.channels() {
        let (peak, clip_os, clip_s) = detector.detect_channel(ch);
        channel_peaks_linear.push(peak);
        clipped_oversampled += clip_os;
        clipped_samples += clip_s;
    }

    let true_peak_linear = channel_peaks_linear.iter().copied().fold(0.0, f64::max);
    let true_peak_db = linear_to_db(true_peak_linear);
    let channel_peaks_db = channel_peaks_linear
        .iter()
        .map(|&p| linear_to_db(p))
        .collect();

    Ok(TruePeakResult {
        channel_peaks_linear,
        channel_peaks_db,
        true_peak_linear,
        true_peak_db,
        clipped_oversampled,
        clipped_samples,
        mode,
        broadcast_compliant: true_peak_db <= -1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, secs: f64, amp: f64) -> Vec<f64> {
        let len = (rate as f64 * secs) as usize;
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_negative_infinity() {
        let pcm = PcmBuffer::stereo(48000, vec![0.0; 4800], vec![0.0; 4800]).unwrap();
        for mode in [OversampleMode::Legacy4x, OversampleMode::Precise8x] {
            let result = detect(&pcm, mode).unwrap();
            assert_eq!(result.true_peak_db, f64::NEG_INFINITY);
            assert_eq!(result.clipped_oversampled, 0);
            assert_eq!(result.clipped_samples, 0);
            assert!(result.broadcast_compliant);
            assert!(!result.true_peak_linear.is_nan());
        }
    }

    #[test]
    fn test_full_scale_sine_both_modes() {
        // 0 dBFS 997 Hz sine: over several seconds the sample grid
        // brushes the continuous-time peak, and interpolation must
        // report essentially 0 dBTP in both modes.
        let samples = sine(997.0, 48000, 5.0, 1.0);
        let pcm = PcmBuffer::mono(48000, samples).unwrap();

        let legacy = detect(&pcm, OversampleMode::Legacy4x).unwrap();
        let precise = detect(&pcm, OversampleMode::Precise8x).unwrap();

        assert!(legacy.true_peak_db >= 0.0, "legacy {}", legacy.true_peak_db);
        assert!(precise.true_peak_db >= 0.0, "precise {}", precise.true_peak_db);
        // The denser interpolator sits at least as close to the
        // continuous-time peak.
        assert!(precise.true_peak_db >= legacy.true_peak_db - 0.01);
        assert!(!legacy.broadcast_compliant);
    }

    #[test]
    fn test_oversampled_clipping_counted() {
        // A sine peaking above -1 dBTP produces oversampled clip
        // events even when no sample reaches the 0.99 sample gate.
        let samples = sine(997.0, 48000, 1.0, 0.95);
        let pcm = PcmBuffer::mono(48000, samples).unwrap();
        let result = detect(&pcm, OversampleMode::Legacy4x).unwrap();
        assert!(result.clipped_oversampled > 0);
        assert_eq!(result.clipped_samples, 0);
        assert!(!result.broadcast_compliant);
    }

    #[test]
    fn test_sample_clipping_separate_metric() {
        let mut samples = sine(440.0, 48000, 0.5, 0.5);
        // Inject hard-clipped stretch
        for s in samples.iter_mut().take(100) {
            *s = 1.0;
        }
        let pcm = PcmBuffer::mono(48000, samples).unwrap();
        let result = detect(&pcm, OversampleMode::Legacy4x).unwrap();
        assert!(result.clipped_samples >= 100);
    }

    #[test]
    fn test_compliant_level_passes() {
        let samples = sine(997.0, 48000, 1.0, 0.5);
        let pcm = PcmBuffer::mono(48000, samples).unwrap();
        let result = detect(&pcm, OversampleMode::Precise8x).unwrap();
        assert!(result.broadcast_compliant);
        assert!((result.true_peak_db + 6.02).abs() < 0.2);
    }

    #[test]
    fn test_determinism() {
        let samples = sine(731.0, 44100, 2.0, 0.8);
        let pcm = PcmBuffer::mono(44100, samples).unwrap();
        let a = detect(&pcm, OversampleMode::Precise8x).unwrap();
        let b = detect(&pcm, OversampleMode::Precise8x).unwrap();
        assert_eq!(a.true_peak_linear.to_bits(), b.true_peak_linear.to_bits());
        assert_eq!(a.clipped_oversampled, b.clipped_oversampled);
    }

    #[test]
    fn test_dc_normalized_phases() {
        // A constant signal interpolates to itself once the delay line
        // is warm; the ramp-in may overshoot a little (partial sums of
        // the sinc lobes) but never wildly.
        let detector = TruePeakDetector::new(OversampleMode::Legacy4x);
        let (peak, _, _) = detector.detect_channel(&vec![0.5; 1000]);
        assert!(peak >= 0.5 - 1e-9, "peak {peak}");
        assert!(peak < 0.56, "peak {peak}");
    }
}
