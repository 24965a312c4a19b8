//! Band profiler and spectral descriptors
//!
//! Converts a magnitude spectrogram into per-band relative energies
//! against a broad reference band, plus a handful of single-number
//! spectral descriptors (centroid, rolloff, flatness, flux).
//!
//! Correctness rule: per-frame band/reference power ratios are
//! accumulated and averaged in the linear domain, and only the final
//! mean ratio is converted to dB. Averaging per-frame dB values
//! produces spuriously positive relative energies and must never come
//! back.

use crate::stft::Spectrogram;
use mx_core::{MeterError, MeterResult};
use serde::{Deserialize, Serialize};

/// Fixed, ordered analysis band table (Hz ranges, inclusive low /
/// exclusive high).
pub const BAND_TABLE: [(&str, f64, f64); 9] = [
    ("sub", 20.0, 60.0),
    ("low_bass", 60.0, 120.0),
    ("bass", 120.0, 250.0),
    ("low_mid", 250.0, 500.0),
    ("mid", 500.0, 2000.0),
    ("high_mid", 2000.0, 4000.0),
    ("presence", 4000.0, 8000.0),
    ("brilliance", 8000.0, 12000.0),
    ("air", 12000.0, 16000.0),
];

/// Broad reference band every band ratio is taken against.
pub const REFERENCE_BAND: (f64, f64) = (20.0, 16000.0);

/// Relative energy of one analysis band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEnergy {
    /// Band key from [`BAND_TABLE`]
    pub key: String,
    /// Low edge (Hz)
    pub low_hz: f64,
    /// High edge (Hz)
    pub high_hz: f64,
    /// Mean relative energy in dB against the reference band, `None`
    /// when the material carried no measurable energy
    pub relative_db: Option<f64>,
}

/// Ordered per-band relative energies for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandProfile {
    /// One entry per [`BAND_TABLE`] row, in table order
    pub bands: Vec<BandEnergy>,
    /// Frames that contributed to the averages
    pub frames_used: usize,
}

impl BandProfile {
    /// Relative energy for a band key, if measured.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.bands
            .iter()
            .find(|b| b.key == key)
            .and_then(|b| b.relative_db)
    }

    /// Band keys in table order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.key.as_str())
    }
}

/// Single-number spectral shape descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralDescriptors {
    /// Magnitude-weighted mean frequency (Hz)
    pub centroid_hz: f64,
    /// First frequency where cumulative magnitude reaches 50%
    pub rolloff_50_hz: f64,
    /// First frequency where cumulative magnitude reaches 85%
    pub rolloff_85_hz: f64,
    /// Geometric over arithmetic magnitude mean, 0..1
    pub flatness: f64,
    /// Mean Euclidean distance between consecutive normalized frames
    pub flux: f64,
}

fn bin_range(bin_frequencies: &[f64], low_hz: f64, high_hz: f64) -> (usize, usize) {
    let lo = bin_frequencies.partition_point(|&f| f < low_hz);
    let hi = bin_frequencies.partition_point(|&f| f < high_hz);
    (lo, hi)
}

fn band_power(frame: &[f64], lo: usize, hi: usize) -> f64 {
    frame[lo..hi.min(frame.len())].iter().map(|m| m * m).sum()
}

/// Compute per-band relative energies from a spectrogram.
///
/// Frames whose reference-band power is zero are skipped entirely; if
/// every frame is silent, all band values come back `None`.
pub fn profile(spec: &Spectrogram) -> MeterResult<BandProfile> {
    if spec.frames.is_empty() {
        return Err(MeterError::EmptyBuffer);
    }

    let (ref_lo, ref_hi) = bin_range(&spec.bin_frequencies, REFERENCE_BAND.0, REFERENCE_BAND.1);
    let ranges: Vec<(usize, usize)> = BAND_TABLE
        .iter()
        .map(|&(_, low, high)| bin_range(&spec.bin_frequencies, low, high))
        .collect();

    let mut ratio_sums = vec![0.0f64; BAND_TABLE.len()];
    let mut frames_used = 0usize;

    for frame in &spec.frames {
        let ref_power = band_power(frame, ref_lo, ref_hi);
        if ref_power <= 0.0 {
            continue;
        }
        frames_used += 1;
        for (sum, &(lo, hi)) in ratio_sums.iter_mut().zip(ranges.iter()) {
            *sum += band_power(frame, lo, hi) / ref_power;
        }
    }

    let bands = BAND_TABLE
        .iter()
        .zip(ratio_sums.iter())
        .map(|(&(key, low, high), &sum)| {
            let relative_db = if frames_used > 0 {
                let mean_ratio = sum / frames_used as f64;
                if mean_ratio > 0.0 {
                    Some(linear_to_db_power(mean_ratio))
                } else {
                    None
                }
            } else {
                None
            };
            BandEnergy {
                key: key.to_string(),
                low_hz: low,
                high_hz: high,
                relative_db,
            }
        })
        .collect();

    Ok(BandProfile { bands, frames_used })
}

/// Power-ratio to dB (`10 log10`), as opposed to the amplitude form in
/// `mx_core::linear_to_db`.
fn linear_to_db_power(ratio: f64) -> f64 {
    10.0 * ratio.log10()
}

/// Compute spectral descriptors from a spectrogram.
///
/// Centroid, rolloff and flatness come from the mean magnitude
/// spectrum; flux averages the distance between consecutive frames,
/// each normalized to unit energy first so level changes alone do not
/// register as spectral motion.
pub fn descriptors(spec: &Spectrogram) -> MeterResult<SpectralDescriptors> {
    if spec.frames.is_empty() {
        return Err(MeterError::EmptyBuffer);
    }

    let avg = spec.average_magnitude();
    let total: f64 = avg.iter().sum();

    let (centroid_hz, rolloff_50_hz, rolloff_85_hz, flatness) = if total > 0.0 {
        let centroid = avg
            .iter()
            .zip(spec.bin_frequencies.iter())
            .map(|(&m, &f)| m * f)
            .sum::<f64>()
            / total;

        let rolloff = |fraction: f64| -> f64 {
            let threshold = fraction * total;
            let mut cumulative = 0.0;
            for (&m, &f) in avg.iter().zip(spec.bin_frequencies.iter()) {
                cumulative += m;
                if cumulative >= threshold {
                    return f;
                }
            }
            *spec.bin_frequencies.last().unwrap_or(&0.0)
        };

        // Geometric mean over log domain; zero bins are floored far
        // below audio noise so the product stays finite.
        let n = avg.len() as f64;
        let log_mean = avg.iter().map(|&m| m.max(1e-12).ln()).sum::<f64>() / n;
        let flatness = (log_mean.exp() / (total / n)).clamp(0.0, 1.0);

        (centroid, rolloff(0.5), rolloff(0.85), flatness)
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };

    let mut flux_sum = 0.0f64;
    let mut flux_pairs = 0usize;
    let mut prev: Option<Vec<f64>> = None;
    for frame in &spec.frames {
        let energy = frame.iter().map(|m| m * m).sum::<f64>().sqrt();
        let normalized: Vec<f64> = if energy > 0.0 {
            frame.iter().map(|m| m / energy).collect()
        } else {
            vec![0.0; frame.len()]
        };
        if let Some(p) = prev {
            flux_sum += p
                .iter()
                .zip(normalized.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            flux_pairs += 1;
        }
        prev = Some(normalized);
    }
    let flux = if flux_pairs > 0 {
        flux_sum / flux_pairs as f64
    } else {
        0.0
    };

    Ok(SpectralDescriptors {
        centroid_hz,
        rolloff_50_hz,
        rolloff_85_hz,
        flatness,
        flux,
    })
}
