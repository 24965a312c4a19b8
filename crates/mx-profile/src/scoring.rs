//! Mix scoring engine
//!
//! Pure function from one [`MeasurementSet`] plus an optional
//! [`ReferenceProfile`] to a [`ScoreResult`]. Every available metric
//! gets a normalized deviation `n = |value - target| / tol`, a unit
//! penalty from a fixed piecewise curve, and a fixed base weight;
//! weights are renormalized over the metrics that actually carry
//! finite values so a missing band never silently shrinks the
//! denominator.
//!
//! The overall penalty takes the worse of the weighted sum and a
//! blend of the two worst unit penalties, so one catastrophic metric
//! cannot be diluted away by many near-perfect ones.

use crate::profile::ReferenceProfile;
use mx_dsp::MeasurementSet;
use serde::{Deserialize, Serialize};

/// Scores never drop below this floor.
const SCORE_FLOOR: f64 = 15.0;
/// Unit penalty saturation ceiling.
const PENALTY_CEILING: f64 = 0.9;
/// Weight of the worst metric in the critical-override blend.
const WORST_BLEND: f64 = 0.6;

/// Base metric weights. Bands lean toward the upper spectrum where
/// conformance problems are most audible; the context budget is split
/// evenly among whichever of LRA / DR / stereo are present.
const WEIGHT_LOUDNESS: f64 = 0.18;
const WEIGHT_TRUE_PEAK: f64 = 0.14;
const WEIGHT_CONTEXT_BUDGET: f64 = 0.12;
const BAND_WEIGHTS: [(&str, f64); 9] = [
    ("sub", 0.030),
    ("low_bass", 0.040),
    ("bass", 0.050),
    ("low_mid", 0.055),
    ("mid", 0.065),
    ("high_mid", 0.075),
    ("presence", 0.080),
    ("brilliance", 0.080),
    ("air", 0.085),
];

/// Where the value sits relative to the tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    /// Within tolerance
    Ok,
    /// Below target by more than the tolerance
    Low,
    /// Above target by more than the tolerance
    High,
}

/// Final tier mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Score >= 85
    ReferenceGrade,
    /// Score >= 70
    Advanced,
    /// Score >= 55
    Intermediate,
    /// Everything else
    Basic,
}

impl Classification {
    fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Self::ReferenceGrade
        } else if score >= 70.0 {
            Self::Advanced
        } else if score >= 55.0 {
            Self::Intermediate
        } else {
            Self::Basic
        }
    }
}

/// One scored metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricScore {
    /// Metric or band key
    pub name: String,
    /// Measured value
    pub value: f64,
    /// Profile target
    pub target: f64,
    /// Signed `value - target`
    pub deviation: f64,
    /// Deviation in tolerance units on the deviation side
    pub normalized: f64,
    /// Position relative to the window
    pub status: MetricStatus,
    /// `leve` / `media` / `alta` past the window, `ok` inside it
    pub severity: String,
    /// Unit penalty from the piecewise curve
    pub unit_penalty: f64,
    /// Renormalized weight actually applied
    pub weight: f64,
}

/// Complete scoring outcome for one mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Final score, floored at 15 and capped at 100
    pub score: f64,
    /// Tier for the final score
    pub classification: Classification,
    /// Overall penalty the score derives from
    pub penalty: f64,
    /// Per-metric breakdown
    pub metrics: Vec<MetricScore>,
    /// Non-fatal issues found along the way
    pub warnings: Vec<String>,
    /// False when scoring fell back to technical health only
    pub used_reference: bool,
}

/// A metric queued for evaluation.
struct Check {
    name: String,
    value: f64,
    target: f64,
    tol_below: f64,
    tol_above: f64,
    /// Penalize only above-target deviations
    invert: bool,
    weight: f64,
}

/// Piecewise unit penalty. Anchored at 0 / 0.30 / 0.55 / 0.75 for
/// n = 0..3, saturating toward the ceiling beyond; never reaches 1.
fn unit_penalty(n: f64) -> f64 {
    if n <= 0.0 {
        0.0
    } else if n <= 1.0 {
        0.30 * n
    } else if n <= 2.0 {
        0.30 + 0.25 * (n - 1.0)
    } else if n <= 3.0 {
        0.55 + 0.20 * (n - 2.0)
    } else {
        PENALTY_CEILING - 0.15 * (-(n - 3.0)).exp()
    }
}

fn severity_label(n: f64) -> &'static str {
    if n <= 1.0 {
        "ok"
    } else if n <= 2.0 {
        "leve"
    } else if n <= 3.0 {
        "media"
    } else {
        "alta"
    }
}

fn evaluate(check: &Check) -> MetricScore {
    let deviation = check.value - check.target;
    let normalized = if check.invert && deviation <= 0.0 {
        0.0
    } else {
        let tol = if deviation >= 0.0 {
            check.tol_above
        } else {
            check.tol_below
        };
        // Profiles are clamped on load, but an in-memory one can
        // still carry a degenerate tolerance; a zero tol with an
        // on-target value must not turn into 0/0.
        deviation.abs() / tol.max(f64::EPSILON)
    };

    let status = if normalized <= 1.0 {
        MetricStatus::Ok
    } else if deviation < 0.0 {
        MetricStatus::Low
    } else {
        MetricStatus::High
    };

    MetricScore {
        name: check.name.clone(),
        value: check.value,
        target: check.target,
        deviation,
        normalized,
        status,
        severity: severity_label(normalized).to_string(),
        unit_penalty: unit_penalty(normalized),
        weight: check.weight,
    }
}

fn band_weight(key: &str) -> f64 {
    BAND_WEIGHTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, w)| *w)
        .unwrap_or(0.05)
}

/// Score a mix against a reference profile, or against absolute
/// technical health when no profile is available.
pub fn score(measurements: &MeasurementSet, reference: Option<&ReferenceProfile>) -> ScoreResult {
    let mut warnings = Vec::new();
    let checks = match reference {
        Some(profile) => reference_checks(measurements, profile, &mut warnings),
        None => {
            warnings.push("no reference profile, scoring technical health only".to_string());
            health_checks(measurements)
        }
    };

    // Non-finite values are intercepted here rather than propagated
    // into the weighted sum.
    let mut usable = Vec::new();
    for check in checks {
        if check.value.is_finite() {
            usable.push(check);
        } else {
            log::warn!("metric {} is non-finite, excluded from score", check.name);
            warnings.push(format!("metric {} is non-finite", check.name));
        }
    }

    if usable.is_empty() {
        warnings.push("no usable metrics, returning floor score".to_string());
        return ScoreResult {
            score: SCORE_FLOOR,
            classification: Classification::from_score(SCORE_FLOOR),
            penalty: 1.0 - SCORE_FLOOR / 100.0,
            metrics: Vec::new(),
            warnings,
            used_reference: reference.is_some(),
        };
    }

    let total_weight: f64 = usable.iter().map(|c| c.weight).sum();
    let mut metrics: Vec<MetricScore> = usable
        .iter()
        .map(|check| {
            let mut m = evaluate(check);
            m.weight = check.weight / total_weight;
            m
        })
        .collect();

    let weighted: f64 = metrics.iter().map(|m| m.unit_penalty * m.weight).sum();

    let mut penalties: Vec<f64> = metrics.iter().map(|m| m.unit_penalty).collect();
    penalties.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let worst = penalties[0];
    let second = penalties.get(1).copied().unwrap_or(worst);
    let critical = WORST_BLEND * worst + (1.0 - WORST_BLEND) * second;

    let penalty = weighted.max(critical);
    let score = (100.0 * (1.0 - penalty)).clamp(SCORE_FLOOR, 100.0);

    metrics.sort_by(|a, b| {
        b.unit_penalty
            .partial_cmp(&a.unit_penalty)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ScoreResult {
        score,
        classification: Classification::from_score(score),
        penalty,
        metrics,
        warnings,
        used_reference: reference.is_some(),
    }
}

fn reference_checks(
    m: &MeasurementSet,
    profile: &ReferenceProfile,
    warnings: &mut Vec<String>,
) -> Vec<Check> {
    let mut checks = vec![
        Check {
            name: "loudness".to_string(),
            value: m.loudness.integrated_lufs,
            target: profile.lufs_target,
            tol_below: profile.tol_lufs,
            tol_above: profile.tol_lufs,
            invert: false,
            weight: WEIGHT_LOUDNESS,
        },
        Check {
            name: "true_peak".to_string(),
            value: m.true_peak.true_peak_db,
            target: profile.true_peak_target,
            tol_below: profile.tol_true_peak,
            tol_above: profile.tol_true_peak,
            invert: true,
            weight: WEIGHT_TRUE_PEAK,
        },
    ];

    // Context metrics share one budget, split over those present
    let context: [(&'static str, f64, f64, f64); 3] = [
        ("lra", m.loudness.lra, profile.lra_target, profile.tol_lra),
        ("dynamic_range", m.dynamic_range_db, profile.dr_target, profile.tol_dr),
        ("stereo_width", m.stereo.width, profile.stereo_target, profile.tol_stereo),
    ];
    let present = context.iter().filter(|(_, v, _, _)| v.is_finite()).count();
    if present > 0 {
        let weight = WEIGHT_CONTEXT_BUDGET / present as f64;
        for (name, value, target, tol) in context {
            checks.push(Check {
                name: name.to_string(),
                value,
                target,
                tol_below: tol,
                tol_above: tol,
                invert: false,
                weight,
            });
        }
    }

    for (key, band) in &profile.bands {
        match m.bands.get(key) {
            Some(value) => {
                checks.push(Check {
                    name: key.clone(),
                    value,
                    target: band.target_db,
                    tol_below: band.tol_db,
                    tol_above: band.tol_db,
                    invert: false,
                    weight: band_weight(key),
                });
            }
            None => warnings.push(format!("band {key} not measured, skipped")),
        }
    }

    // Raw-signal health issues never enter the weighted score when a
    // reference is present, but they still deserve a flag.
    if m.clipped_samples > 0 {
        warnings.push(format!("{} hard-clipped samples", m.clipped_samples));
    }
    if m.dc_offset > 0.01 {
        warnings.push(format!("dc offset {:.4}", m.dc_offset));
    }

    checks
}

/// Absolute fallback: clipping rate and DC offset against zero
/// targets, penalized only when present.
fn health_checks(m: &MeasurementSet) -> Vec<Check> {
    let clips_per_second = if m.duration_secs > 0.0 {
        m.clipped_samples as f64 / m.duration_secs
    } else {
        0.0
    };
    vec![
        Check {
            name: "clipping".to_string(),
            value: clips_per_second,
            target: 0.0,
            tol_below: 1.0,
            tol_above: 1.0,
            invert: true,
            weight: 0.5,
        },
        Check {
            name: "dc_offset".to_string(),
            value: m.dc_offset,
            target: 0.0,
            tol_below: 0.01,
            tol_above: 0.01,
            invert: true,
            weight: 0.5,
        },
    ]
}
