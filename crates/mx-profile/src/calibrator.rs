//! Profile calibrator
//!
//! Re-measures a candidate corpus with the exact builder pipeline and
//! diffs it against an existing profile: signed deltas, per-metric
//! severity classes, current versus proposed tolerances with their
//! pass rates, and outlier diagnostics when coverage is poor.
//!
//! Coverage is the worst per-metric pass rate under the current
//! tolerances; write mode refuses to touch the profile when coverage
//! sits below the configured minimum.

use crate::batch::{self, BatchOptions, TrackMeasurement};
use crate::error::{ProfileError, ProfileResult};
use crate::profile::{clamp_tolerance, tolerance_limits, ReferenceProfile};
use chrono::Utc;
use mx_core::{stats, AnalysisConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Calibration run settings.
#[derive(Debug, Clone)]
pub struct CalibrateOptions {
    /// Coverage floor below which write mode refuses to persist
    pub min_ok: f64,
    /// Apply proposed tolerances instead of only reporting them
    pub write: bool,
    /// Where to persist the updated profile; `None` keeps the update
    /// in-memory (useful for callers owning the storage boundary)
    pub output_path: Option<PathBuf>,
}

impl Default for CalibrateOptions {
    fn default() -> Self {
        Self {
            min_ok: 0.8,
            write: false,
            output_path: None,
        }
    }
}

/// How far one measured value sits from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Within tolerance
    Ok,
    /// Within twice the tolerance
    Leve,
    /// Within 2.5x the tolerance
    Moderado,
    /// Beyond 2.5x the tolerance
    Alto,
}

impl Severity {
    fn classify(delta: f64, tol: f64) -> Self {
        let d = delta.abs();
        if d <= tol {
            Self::Ok
        } else if d <= 2.0 * tol {
            Self::Leve
        } else if d <= 2.5 * tol {
            Self::Moderado
        } else {
            Self::Alto
        }
    }

    fn rank(self) -> usize {
        match self {
            Self::Ok => 0,
            Self::Leve => 1,
            Self::Moderado => 2,
            Self::Alto => 3,
        }
    }
}

/// Calibration outcome for one metric or band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCalibration {
    /// Metric or band key
    pub name: String,
    /// Target the deltas are taken against
    pub target: f64,
    /// Tolerance currently in the profile
    pub tol_current: f64,
    /// Robust-spread proposal, clamped to the metric's range
    pub tol_proposed: f64,
    /// Share of candidates within the current tolerance
    pub pass_rate_current: f64,
    /// Share of candidates within the proposed tolerance
    pub pass_rate_proposed: f64,
    /// Mean signed delta across candidates
    pub mean_delta: f64,
    /// Severity class per candidate, in input order
    pub severities: Vec<Severity>,
}

/// A candidate ranked by how badly it deviates overall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDiagnostic {
    /// Source file
    pub path: PathBuf,
    /// Sum of severity ranks across all metrics
    pub severity_score: usize,
    /// Metric with the single worst deviation
    pub worst_metric: String,
}

/// Full calibration report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Genre of the calibrated profile
    pub genre: String,
    /// Candidates that measured cleanly
    pub num_tracks: usize,
    /// Per-metric breakdown
    pub metrics: Vec<MetricCalibration>,
    /// Worst per-metric pass rate under current tolerances
    pub coverage_current: f64,
    /// Worst per-metric pass rate under proposed tolerances
    pub coverage_proposed: f64,
    /// Share of all checks passing under current tolerances
    pub pct_ok_before: f64,
    /// Share of all checks passing under proposed tolerances
    pub pct_ok_after: f64,
    /// Populated when coverage falls below the configured minimum
    pub likely_causes: Vec<String>,
    /// Candidates ranked worst-first, non-OK only
    pub outliers: Vec<TrackDiagnostic>,
    /// True when the profile was updated and persisted
    pub written: bool,
    /// The updated profile when write mode ran
    pub updated_profile: Option<ReferenceProfile>,
}

struct Series {
    name: String,
    target: f64,
    tol: f64,
    limits: (f64, f64),
    /// (track index, value); tracks missing the metric are absent
    values: Vec<(usize, f64)>,
}

fn collect_series(profile: &ReferenceProfile, tracks: &[TrackMeasurement]) -> Vec<Series> {
    let scalar = |name: &str, target: f64, tol: f64, limits, get: &dyn Fn(&TrackMeasurement) -> f64| {
        Series {
            name: name.to_string(),
            target,
            tol,
            limits,
            values: tracks
                .iter()
                .enumerate()
                .map(|(i, t)| (i, get(t)))
                .filter(|(_, v)| v.is_finite())
                .collect(),
        }
    };

    let mut series = vec![
        scalar(
            "lufs",
            profile.lufs_target,
            profile.tol_lufs,
            tolerance_limits::LUFS,
            &|t| t.measurements.loudness.integrated_lufs,
        ),
        scalar(
            "true_peak",
            profile.true_peak_target,
            profile.tol_true_peak,
            tolerance_limits::TRUE_PEAK,
            &|t| t.measurements.true_peak.true_peak_db,
        ),
        scalar(
            "dr",
            profile.dr_target,
            profile.tol_dr,
            tolerance_limits::DR_LRA,
            &|t| t.measurements.dynamic_range_db,
        ),
        scalar(
            "lra",
            profile.lra_target,
            profile.tol_lra,
            tolerance_limits::DR_LRA,
            &|t| t.measurements.loudness.lra,
        ),
        scalar(
            "stereo",
            profile.stereo_target,
            profile.tol_stereo,
            tolerance_limits::STEREO,
            &|t| t.measurements.stereo.width,
        ),
    ];

    for (key, band) in &profile.bands {
        series.push(Series {
            name: key.clone(),
            target: band.target_db,
            tol: band.tol_db,
            limits: tolerance_limits::BAND,
            values: tracks
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.measurements.bands.get(key).map(|v| (i, v)))
                .collect(),
        });
    }

    series
}

/// Calibrate from already-measured candidates.
///
/// Kept separate from the file-level [`calibrate`] so the measurement
/// path can be exercised and tested without touching the filesystem.
pub fn calibrate_measurements(
    profile: &ReferenceProfile,
    tracks: &[TrackMeasurement],
    options: &CalibrateOptions,
) -> ProfileResult<CalibrationReport> {
    if tracks.is_empty() {
        return Err(ProfileError::EmptyCorpus { scanned: 0 });
    }

    let series = collect_series(profile, tracks);
    let mut metrics = Vec::with_capacity(series.len());
    let mut track_scores = vec![0usize; tracks.len()];
    let mut track_worst: Vec<(usize, String)> = vec![(0, String::new()); tracks.len()];

    let mut checks_total = 0usize;
    let mut ok_before = 0usize;
    let mut ok_after = 0usize;

    for s in &series {
        if s.values.is_empty() {
            continue;
        }
        let raw: Vec<f64> = s.values.iter().map(|(_, v)| *v).collect();
        let deltas: Vec<f64> = raw.iter().map(|v| v - s.target).collect();

        let tol_proposed = clamp_tolerance(
            &s.name,
            stats::robust_spread(&raw).unwrap_or(s.limits.0),
            s.limits,
        );

        let pass_current = deltas.iter().filter(|d| d.abs() <= s.tol).count();
        let pass_proposed = deltas.iter().filter(|d| d.abs() <= tol_proposed).count();
        checks_total += deltas.len();
        ok_before += pass_current;
        ok_after += pass_proposed;

        let mut severities = Vec::with_capacity(deltas.len());
        for ((index, _), delta) in s.values.iter().zip(deltas.iter()) {
            let severity = Severity::classify(*delta, s.tol);
            let rank = severity.rank();
            track_scores[*index] += rank;
            if rank > track_worst[*index].0 {
                track_worst[*index] = (rank, s.name.clone());
            }
            severities.push(severity);
        }

        metrics.push(MetricCalibration {
            name: s.name.clone(),
            target: s.target,
            tol_current: s.tol,
            tol_proposed,
            pass_rate_current: pass_current as f64 / deltas.len() as f64,
            pass_rate_proposed: pass_proposed as f64 / deltas.len() as f64,
            mean_delta: deltas.iter().sum::<f64>() / deltas.len() as f64,
            severities,
        });
    }

    let coverage_current = metrics
        .iter()
        .map(|m| m.pass_rate_current)
        .fold(1.0, f64::min);
    let coverage_proposed = metrics
        .iter()
        .map(|m| m.pass_rate_proposed)
        .fold(1.0, f64::min);

    let mut outliers: Vec<TrackDiagnostic> = tracks
        .iter()
        .enumerate()
        .filter(|(i, _)| track_scores[*i] > 0)
        .map(|(i, t)| TrackDiagnostic {
            path: t.path.clone(),
            severity_score: track_scores[i],
            worst_metric: track_worst[i].1.clone(),
        })
        .collect();
    outliers.sort_by(|a, b| b.severity_score.cmp(&a.severity_score));

    // Diagnostics key on projected coverage too: proposed tolerances
    // that still miss the floor deserve causes even when the current
    // ones pass.
    let mut likely_causes = Vec::new();
    if coverage_current < options.min_ok || coverage_proposed < options.min_ok {
        let floor = |m: &MetricCalibration| m.pass_rate_current.min(m.pass_rate_proposed);
        let mut worst_metrics: Vec<&MetricCalibration> = metrics.iter().collect();
        worst_metrics.sort_by(|a, b| {
            floor(a)
                .partial_cmp(&floor(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &m in worst_metrics.iter().take(3) {
            if floor(m) < options.min_ok {
                likely_causes.push(format!(
                    "{}: {:.0}% within current tolerance, {:.0}% within proposed (mean delta {:+.2})",
                    m.name,
                    m.pass_rate_current * 100.0,
                    m.pass_rate_proposed * 100.0,
                    m.mean_delta
                ));
            }
        }
        for outlier in outliers.iter().take(3) {
            likely_causes.push(format!(
                "outlier {} (severity {}, worst: {})",
                outlier.path.display(),
                outlier.severity_score,
                outlier.worst_metric
            ));
        }
    }

    let mut written = false;
    let mut updated_profile = None;
    if options.write {
        if coverage_current < options.min_ok {
            for cause in &likely_causes {
                log::warn!("calibration blocker: {cause}");
            }
            return Err(ProfileError::CoverageBelowMinimum {
                coverage: coverage_current,
                min_ok: options.min_ok,
            });
        }

        let mut updated = profile.clone();
        let mut changed = false;
        for m in &metrics {
            let slot = match m.name.as_str() {
                "lufs" => Some(&mut updated.tol_lufs),
                "true_peak" => Some(&mut updated.tol_true_peak),
                "dr" => Some(&mut updated.tol_dr),
                "lra" => Some(&mut updated.tol_lra),
                "stereo" => Some(&mut updated.tol_stereo),
                key => updated.bands.get_mut(key).map(|b| &mut b.tol_db),
            };
            if let Some(slot) = slot {
                if (*slot - m.tol_proposed).abs() > f64::EPSILON {
                    *slot = m.tol_proposed;
                    changed = true;
                }
            }
        }
        if changed {
            updated.bump_patch();
        }
        updated.num_tracks = tracks.len();
        updated.generated_at = Utc::now();

        if let Some(path) = &options.output_path {
            updated.save(path)?;
            log::info!(
                "profile '{}' updated to {} at {}",
                updated.genre,
                updated.version,
                path.display()
            );
        }
        written = true;
        updated_profile = Some(updated);
    }

    Ok(CalibrationReport {
        genre: profile.genre.clone(),
        num_tracks: tracks.len(),
        metrics,
        coverage_current,
        coverage_proposed,
        pct_ok_before: if checks_total > 0 {
            ok_before as f64 / checks_total as f64
        } else {
            0.0
        },
        pct_ok_after: if checks_total > 0 {
            ok_after as f64 / checks_total as f64
        } else {
            0.0
        },
        likely_causes,
        outliers,
        written,
        updated_profile,
    })
}

/// Measure candidate files on the worker pool and calibrate.
pub fn calibrate<P: AsRef<Path>>(
    profile: &ReferenceProfile,
    candidates: &[P],
    config: &AnalysisConfig,
    options: &CalibrateOptions,
    batch_options: &BatchOptions,
) -> ProfileResult<CalibrationReport> {
    let paths: Vec<PathBuf> = candidates.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let measured = batch::measure_files(&paths, config, batch_options);
    if measured.is_empty() {
        return Err(ProfileError::EmptyCorpus {
            scanned: paths.len(),
        });
    }
    calibrate_measurements(profile, &measured, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classes() {
        assert_eq!(Severity::classify(0.5, 1.0), Severity::Ok);
        assert_eq!(Severity::classify(-1.0, 1.0), Severity::Ok);
        assert_eq!(Severity::classify(1.5, 1.0), Severity::Leve);
        assert_eq!(Severity::classify(-2.2, 1.0), Severity::Moderado);
        assert_eq!(Severity::classify(3.0, 1.0), Severity::Alto);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Ok < Severity::Leve);
        assert!(Severity::Moderado < Severity::Alto);
    }
}
