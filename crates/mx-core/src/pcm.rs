//! Owned PCM buffer shared by all measurement stages

use crate::error::{MeterError, MeterResult};
use crate::{db_to_linear, linear_to_db};

/// Decoded audio, one `Vec<f64>` per channel.
///
/// Immutable once captured: every measurement call borrows the buffer
/// for its duration and keeps all intermediate state local.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f64>>,
}

impl PcmBuffer {
    /// Create a buffer from per-channel sample data.
    ///
    /// All channels must carry the same number of samples and at least
    /// one sample; anything else is rejected up front so the DSP code
    /// never sees a degenerate buffer.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f64>>) -> MeterResult<Self> {
        if sample_rate == 0 {
            return Err(MeterError::InvalidParameter("sample rate must be > 0".into()));
        }
        let first_len = channels.first().map(|c| c.len()).unwrap_or(0);
        if channels.is_empty() || first_len == 0 {
            return Err(MeterError::EmptyBuffer);
        }
        for ch in &channels {
            if ch.len() != first_len {
                return Err(MeterError::ChannelMismatch {
                    expected: first_len,
                    got: ch.len(),
                });
            }
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Convenience constructor for mono material.
    pub fn mono(sample_rate: u32, samples: Vec<f64>) -> MeterResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    /// Convenience constructor for stereo material.
    pub fn stereo(sample_rate: u32, left: Vec<f64>, right: Vec<f64>) -> MeterResult<Self> {
        Self::new(sample_rate, vec![left, right])
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn num_samples(&self) -> usize {
        self.channels[0].len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// Borrow one channel.
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    /// Borrow all channels.
    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    /// Mix down to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f64> {
        if self.num_channels() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.num_channels() as f64;
        (0..self.num_samples())
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f64>() * scale)
            .collect()
    }

    /// Absolute sample peak across all channels.
    pub fn peak(&self) -> f64 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|s| s.abs())
            .fold(0.0, f64::max)
    }

    /// RMS level across all channels.
    pub fn rms(&self) -> f64 {
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|s| s * s)
            .sum();
        let count = self.num_samples() * self.num_channels();
        (sum / count as f64).sqrt()
    }

    /// RMS level in dBFS, `-inf` for silence.
    pub fn rms_db(&self) -> f64 {
        linear_to_db(self.rms())
    }

    /// Return a gain-adjusted copy of this buffer.
    ///
    /// Used by the reference builder to sit tracks at the normalization
    /// target before loudness-invariant measurements.
    pub fn with_gain_db(&self, gain_db: f64) -> Self {
        let gain = db_to_linear(gain_db);
        let channels = self
            .channels
            .iter()
            .map(|ch| ch.iter().map(|s| s * gain).collect())
            .collect();
        Self {
            sample_rate: self.sample_rate,
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            PcmBuffer::new(48000, vec![]),
            Err(MeterError::EmptyBuffer)
        ));
        assert!(matches!(
            PcmBuffer::mono(48000, vec![]),
            Err(MeterError::EmptyBuffer)
        ));
    }

    #[test]
    fn test_rejects_mismatched_channels() {
        let result = PcmBuffer::stereo(48000, vec![0.0; 10], vec![0.0; 9]);
        assert!(matches!(
            result,
            Err(MeterError::ChannelMismatch {
                expected: 10,
                got: 9
            })
        ));
    }

    #[test]
    fn test_peak_and_rms() {
        let pcm = PcmBuffer::mono(44100, vec![1.0, 0.5, -0.5, -1.0]).unwrap();
        assert_eq!(pcm.peak(), 1.0);
        // RMS = sqrt((1 + 0.25 + 0.25 + 1) / 4)
        assert!((pcm.rms() - 0.625_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_to_mono() {
        let pcm = PcmBuffer::stereo(44100, vec![1.0, 0.0], vec![0.0, 1.0]).unwrap();
        assert_eq!(pcm.to_mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_gain_copy() {
        let pcm = PcmBuffer::mono(48000, vec![0.5; 4]).unwrap();
        let louder = pcm.with_gain_db(6.0205999132796239);
        assert!((louder.peak() - 1.0).abs() < 1e-9);
        // Original untouched
        assert_eq!(pcm.peak(), 0.5);
    }
}
