//! Reference target builder
//!
//! Aggregates a corpus of per-track measurements into a
//! [`ReferenceProfile`]: median as target, `1.4826 x MAD` as
//! tolerance, every tolerance clamped into its documented range.
//! Loudness keeps a fixed tolerance rather than a corpus-derived one;
//! a corpus of identically-normalized tracks would otherwise collapse
//! it to the lower clamp.

use crate::batch::{self, BatchOptions, TrackMeasurement};
use crate::error::{ProfileError, ProfileResult};
use crate::profile::{clamp_tolerance, tolerance_limits, BandTarget, ReferenceProfile};
use chrono::Utc;
use mx_core::{stats, AnalysisConfig};
use mx_dsp::bands::BAND_TABLE;
use mx_dsp::MeasurementSet;
use std::collections::BTreeMap;
use std::path::Path;

/// Fixed loudness tolerance, within the documented clamp range.
const LUFS_TOLERANCE: f64 = 1.0;

/// How band targets are aggregated across the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    /// Median over values whose per-track averaging happened in the
    /// linear power domain. The only correct mode for new profiles.
    #[default]
    LinearDomain,
    /// Arithmetic mean of per-track dB values. Biased; exists solely
    /// to regenerate profiles built before the linear-domain fix so
    /// their targets stay comparable.
    LegacyDbDomain,
}

impl AggregationMethod {
    /// Tag stored in the profile JSON.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::LinearDomain => "linear_domain",
            Self::LegacyDbDomain => "legacy_db_domain",
        }
    }
}

/// Builder settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Aggregation mode; leave at default outside of regeneration
    pub aggregation: AggregationMethod,
    /// Version stamped on the new profile
    pub version: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            aggregation: AggregationMethod::default(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Aggregate measured tracks into a profile.
///
/// Tracks with no finite integrated loudness (silence) are excluded
/// from every aggregate. Errors with [`ProfileError::EmptyCorpus`]
/// when nothing usable remains.
pub fn build(
    genre: &str,
    tracks: &[MeasurementSet],
    options: &BuildOptions,
) -> ProfileResult<ReferenceProfile> {
    let usable: Vec<&MeasurementSet> = tracks
        .iter()
        .filter(|m| m.loudness.integrated_lufs.is_finite())
        .collect();
    if usable.is_empty() {
        return Err(ProfileError::EmptyCorpus {
            scanned: tracks.len(),
        });
    }
    log::info!(
        "building '{genre}' profile from {} tracks ({} excluded as silent)",
        usable.len(),
        tracks.len() - usable.len()
    );

    let lufs: Vec<f64> = usable.iter().map(|m| m.loudness.integrated_lufs).collect();
    let true_peak: Vec<f64> = usable
        .iter()
        .map(|m| m.true_peak.true_peak_db)
        .filter(|v| v.is_finite())
        .collect();
    let dr: Vec<f64> = usable.iter().map(|m| m.dynamic_range_db).collect();
    let lra: Vec<f64> = usable.iter().map(|m| m.loudness.lra).collect();
    let stereo: Vec<f64> = usable.iter().map(|m| m.stereo.width).collect();

    let target = |values: &[f64]| stats::median(values).unwrap_or(0.0);
    let spread = |metric: &str, values: &[f64], limits: (f64, f64)| {
        clamp_tolerance(
            metric,
            stats::robust_spread(values).unwrap_or(limits.0),
            limits,
        )
    };

    let mut bands = BTreeMap::new();
    for &(key, _, _) in BAND_TABLE.iter() {
        let values: Vec<f64> = usable.iter().filter_map(|m| m.bands.get(key)).collect();
        if values.is_empty() {
            continue;
        }
        let target_db = match options.aggregation {
            AggregationMethod::LinearDomain => stats::median(&values).unwrap_or(0.0),
            AggregationMethod::LegacyDbDomain => {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let tol_db = spread(key, &values, tolerance_limits::BAND);
        bands.insert(key.to_string(), BandTarget { target_db, tol_db });
    }

    Ok(ReferenceProfile {
        genre: genre.to_string(),
        version: options.version.clone(),
        generated_at: Utc::now(),
        num_tracks: usable.len(),
        aggregation_method: options.aggregation.tag().to_string(),
        lufs_target: target(&lufs),
        tol_lufs: clamp_tolerance("lufs", LUFS_TOLERANCE, tolerance_limits::LUFS),
        true_peak_target: target(&true_peak),
        tol_true_peak: spread("true_peak", &true_peak, tolerance_limits::TRUE_PEAK),
        dr_target: target(&dr),
        tol_dr: spread("dr", &dr, tolerance_limits::DR_LRA),
        lra_target: target(&lra),
        tol_lra: spread("lra", &lra, tolerance_limits::DR_LRA),
        stereo_target: target(&stereo),
        tol_stereo: spread("stereo", &stereo, tolerance_limits::STEREO),
        bands,
    })
}

/// Scan a directory, measure every audio file on the worker pool and
/// build the profile from whatever decoded cleanly.
pub fn build_from_dir<P: AsRef<Path>>(
    genre: &str,
    dir: P,
    config: &AnalysisConfig,
    options: &BuildOptions,
    batch_options: &BatchOptions,
) -> ProfileResult<ReferenceProfile> {
    let files = batch::collect_audio_files(&dir);
    let measured = batch::measure_files(&files, config, batch_options);
    if measured.is_empty() {
        return Err(ProfileError::EmptyCorpus {
            scanned: files.len(),
        });
    }
    let sets: Vec<mx_dsp::MeasurementSet> = measured
        .into_iter()
        .map(|TrackMeasurement { measurements, .. }| measurements)
        .collect();
    build(genre, &sets, options)
}
