//! STFT engine
//!
//! Pure windowed-FFT spectrogram producer used by the band profiler.
//! No state survives a call: the FFT plan, window and scratch buffers
//! are all local.

use mx_core::{MeterError, MeterResult};
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Magnitude spectrogram plus the frequency of each bin.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// One magnitude vector per analysis frame
    pub frames: Vec<Vec<f64>>,
    /// Center frequency of each FFT bin (Hz)
    pub bin_frequencies: Vec<f64>,
    /// FFT size actually used (next power of two >= window length)
    pub fft_size: usize,
    /// Hop size in samples
    pub hop: usize,
    /// Sample rate of the analyzed material (Hz)
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Number of analysis frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Mean magnitude spectrum across all frames.
    pub fn average_magnitude(&self) -> Vec<f64> {
        let bins = self.bin_frequencies.len();
        let mut avg = vec![0.0; bins];
        if self.frames.is_empty() {
            return avg;
        }
        for frame in &self.frames {
            for (a, &m) in avg.iter_mut().zip(frame.iter()) {
                *a += m;
            }
        }
        let scale = 1.0 / self.frames.len() as f64;
        for a in &mut avg {
            *a *= scale;
        }
        avg
    }
}

/// Compute a Hann-windowed magnitude spectrogram.
///
/// The FFT size is the next power of two at or above `window_len`;
/// the tail of each frame is zero-padded. Input shorter than one
/// window produces a single padded frame so short clips still get a
/// spectrum.
pub fn analyze(
    samples: &[f64],
    sample_rate: u32,
    window_len: usize,
    hop: usize,
) -> MeterResult<Spectrogram> {
    if samples.is_empty() {
        return Err(MeterError::EmptyBuffer);
    }
    if window_len == 0 || hop == 0 {
        return Err(MeterError::InvalidParameter(
            "window and hop must be > 0".into(),
        ));
    }

    let fft_size = window_len.next_power_of_two();
    let bins = fft_size / 2 + 1;

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);

    // Hann window over the analysis length, not the padded FFT length
    let window: Vec<f64> = (0..window_len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / window_len as f64).cos()))
        .collect();

    let mut scratch = vec![0.0f64; fft_size];
    let mut spectrum = vec![Complex::new(0.0, 0.0); bins];
    let mut frames = Vec::new();

    let mut starts: Vec<usize> = (0..samples.len().saturating_sub(window_len - 1))
        .step_by(hop)
        .collect();
    if starts.is_empty() {
        starts.push(0);
    }

    for start in starts {
        scratch.fill(0.0);
        let take = window_len.min(samples.len() - start);
        for i in 0..take {
            scratch[i] = samples[start + i] * window[i];
        }

        fft.process(&mut scratch, &mut spectrum)
            .map_err(|_| MeterError::InvalidParameter("FFT failed".into()))?;

        frames.push(spectrum.iter().map(|c| c.norm()).collect());
    }

    let bin_frequencies: Vec<f64> = (0..bins)
        .map(|i| i as f64 * sample_rate as f64 / fft_size as f64)
        .collect();

    Ok(Spectrogram {
        frames,
        bin_frequencies,
        fft_size,
        hop,
        sample_rate,
    })
}
