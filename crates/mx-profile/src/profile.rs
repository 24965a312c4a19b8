//! Reference profile model
//!
//! A profile is built once offline and then read-only for scoring.
//! Any tolerance change bumps the patch version so regenerated
//! profiles stay distinguishable from the corpus they came from.

use crate::error::ProfileResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-metric tolerance clamp ranges. Tolerances outside these are
/// auto-clamped with a warning, never rejected.
pub mod tolerance_limits {
    /// LUFS tolerance range (dB)
    pub const LUFS: (f64, f64) = (0.3, 1.5);
    /// True-peak tolerance range (dB)
    pub const TRUE_PEAK: (f64, f64) = (0.1, 2.0);
    /// Dynamic-range / LRA tolerance range (dB)
    pub const DR_LRA: (f64, f64) = (0.8, 4.0);
    /// Stereo-width tolerance range (ratio)
    pub const STEREO: (f64, f64) = (0.02, 0.15);
    /// Band tolerance range (dB)
    pub const BAND: (f64, f64) = (0.5, 3.0);
}

/// Clamp a tolerance into its documented range, warning when the raw
/// value fell outside it.
pub fn clamp_tolerance(metric: &str, raw: f64, limits: (f64, f64)) -> f64 {
    let clamped = raw.clamp(limits.0, limits.1);
    if (clamped - raw).abs() > f64::EPSILON {
        log::warn!(
            "tolerance for {metric} out of range: {raw:.3} clamped to {clamped:.3} \
             (allowed {:.3}..{:.3})",
            limits.0,
            limits.1
        );
    }
    clamped
}

/// Target and tolerance for one frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandTarget {
    /// Median relative energy across the corpus (dB)
    pub target_db: f64,
    /// Clamped robust spread (dB)
    pub tol_db: f64,
}

/// Genre-level reference targets built from a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    /// Genre key this profile describes
    pub genre: String,
    /// Semantic version, patch-bumped on tolerance changes
    pub version: String,
    /// Build or last-calibration timestamp
    pub generated_at: DateTime<Utc>,
    /// Tracks aggregated into the targets
    pub num_tracks: usize,
    /// `"linear_domain"` or the flagged `"legacy_db_domain"`
    pub aggregation_method: String,

    /// Integrated loudness target (LUFS)
    pub lufs_target: f64,
    /// Loudness tolerance (dB)
    pub tol_lufs: f64,
    /// True-peak target (dBTP)
    pub true_peak_target: f64,
    /// True-peak tolerance (dB)
    pub tol_true_peak: f64,
    /// Crest dynamic-range target (dB)
    pub dr_target: f64,
    /// Dynamic-range tolerance (dB)
    pub tol_dr: f64,
    /// Loudness-range target (LU)
    pub lra_target: f64,
    /// Loudness-range tolerance (LU)
    pub tol_lra: f64,
    /// Stereo-width target (ratio)
    pub stereo_target: f64,
    /// Stereo-width tolerance (ratio)
    pub tol_stereo: f64,
    /// Per-band targets, keyed by band-table key
    pub bands: BTreeMap<String, BandTarget>,
}

impl ReferenceProfile {
    /// Read a profile from JSON on disk.
    ///
    /// Hand-edited files can carry tolerances outside the documented
    /// ranges (zero included, which would poison every downstream
    /// division); they are clamped here, with a warning per field.
    pub fn load<P: AsRef<Path>>(path: P) -> ProfileResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut profile: Self = serde_json::from_str(&data)?;
        profile.clamp_tolerances();
        Ok(profile)
    }

    /// Force every tolerance into its documented range.
    pub fn clamp_tolerances(&mut self) {
        self.tol_lufs = clamp_tolerance("lufs", self.tol_lufs, tolerance_limits::LUFS);
        self.tol_true_peak =
            clamp_tolerance("true_peak", self.tol_true_peak, tolerance_limits::TRUE_PEAK);
        self.tol_dr = clamp_tolerance("dr", self.tol_dr, tolerance_limits::DR_LRA);
        self.tol_lra = clamp_tolerance("lra", self.tol_lra, tolerance_limits::DR_LRA);
        self.tol_stereo = clamp_tolerance("stereo", self.tol_stereo, tolerance_limits::STEREO);
        for (key, band) in &mut self.bands {
            band.tol_db = clamp_tolerance(key, band.tol_db, tolerance_limits::BAND);
        }
    }

    /// Write the profile as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ProfileResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Bump the patch component of the version string. Anything that
    /// does not parse as `major.minor.patch` restarts at `1.0.1`.
    pub fn bump_patch(&mut self) {
        let parts: Vec<u64> = self
            .version
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<_, _>>()
            .unwrap_or_default();
        self.version = match parts.as_slice() {
            [major, minor, patch] => format!("{major}.{minor}.{}", patch + 1),
            _ => "1.0.1".to_string(),
        };
    }

    /// Symmetric tolerance lookup for a band key, if the profile has
    /// that band.
    pub fn band(&self, key: &str) -> Option<&BandTarget> {
        self.bands.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ReferenceProfile {
        ReferenceProfile {
            genre: "techno".into(),
            version: "1.0.0".into(),
            generated_at: Utc::now(),
            num_tracks: 12,
            aggregation_method: "linear_domain".into(),
            lufs_target: -14.0,
            tol_lufs: 1.0,
            true_peak_target: -1.2,
            tol_true_peak: 0.5,
            dr_target: 9.0,
            tol_dr: 2.0,
            lra_target: 5.0,
            tol_lra: 2.0,
            stereo_target: 0.4,
            tol_stereo: 0.08,
            bands: BTreeMap::from([
                (
                    "mid".to_string(),
                    BandTarget {
                        target_db: -4.0,
                        tol_db: 1.5,
                    },
                ),
            ]),
        }
    }

    #[test]
    fn test_patch_bump() {
        let mut p = profile();
        p.bump_patch();
        assert_eq!(p.version, "1.0.1");
        p.bump_patch();
        assert_eq!(p.version, "1.0.2");

        p.version = "garbage".into();
        p.bump_patch();
        assert_eq!(p.version, "1.0.1");
    }

    #[test]
    fn test_clamp_tolerance() {
        assert_eq!(clamp_tolerance("dr", 10.0, tolerance_limits::DR_LRA), 4.0);
        assert_eq!(clamp_tolerance("dr", 0.1, tolerance_limits::DR_LRA), 0.8);
        assert_eq!(clamp_tolerance("dr", 2.5, tolerance_limits::DR_LRA), 2.5);
    }

    #[test]
    fn test_json_round_trip() {
        let p = profile();
        let json = serde_json::to_string(&p).unwrap();
        let back: ReferenceProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("techno.json");
        let p = profile();
        p.save(&path).unwrap();
        let back = ReferenceProfile::load(&path).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_load_clamps_out_of_range_tolerances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.json");
        let mut p = profile();
        p.tol_lufs = 0.0;
        p.tol_dr = -2.0;
        p.bands.get_mut("mid").unwrap().tol_db = 50.0;
        p.save(&path).unwrap();

        let back = ReferenceProfile::load(&path).unwrap();
        assert_eq!(back.tol_lufs, tolerance_limits::LUFS.0);
        assert_eq!(back.tol_dr, tolerance_limits::DR_LRA.0);
        assert_eq!(back.bands["mid"].tol_db, tolerance_limits::BAND.1);
        // Untouched fields survive unchanged
        assert_eq!(back.tol_true_peak, p.tol_true_peak);
    }
}
