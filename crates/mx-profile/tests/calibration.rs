//! End-to-end builder / calibrator / scorer flow on synthetic
//! measurement sets, no audio files involved.

use mx_dsp::bands::{BandEnergy, BandProfile};
use mx_dsp::loudness::{LoudnessResult, LraMode};
use mx_dsp::true_peak::OversampleMode;
use mx_dsp::{MeasurementSet, SpectralDescriptors, StereoImage, TruePeakResult};
use mx_profile::{
    build, calibrate_measurements, score, BuildOptions, CalibrateOptions, Classification,
    ProfileError, TrackMeasurement,
};
use std::path::PathBuf;

fn measurement(lufs: f64, tp_db: f64, dr: f64, lra: f64, width: f64, mid_db: f64) -> MeasurementSet {
    MeasurementSet {
        sample_rate: 48000,
        duration_secs: 120.0,
        loudness: LoudnessResult {
            integrated_lufs: lufs,
            short_term_lufs: lufs - 0.3,
            momentary_lufs: lufs + 1.2,
            lra,
            lra_legacy: lra + 0.4,
            lra_mode: LraMode::R128,
            blocks_total: 1200,
            blocks_gated: 1100,
        },
        normalization_gain_db: -14.0 - lufs,
        true_peak: TruePeakResult {
            channel_peaks_linear: vec![0.6, 0.6],
            channel_peaks_db: vec![tp_db, tp_db],
            true_peak_linear: 0.6,
            true_peak_db: tp_db,
            clipped_oversampled: 0,
            clipped_samples: 0,
            mode: OversampleMode::Legacy4x,
            broadcast_compliant: tp_db <= -1.0,
        },
        dynamic_range_db: dr,
        stereo: StereoImage {
            width,
            correlation: 0.7,
        },
        dc_offset: 0.0005,
        clipped_samples: 0,
        bands: BandProfile {
            bands: vec![BandEnergy {
                key: "mid".into(),
                low_hz: 500.0,
                high_hz: 2000.0,
                relative_db: Some(mid_db),
            }],
            frames_used: 500,
        },
        spectral: SpectralDescriptors {
            centroid_hz: 1800.0,
            rolloff_50_hz: 1400.0,
            rolloff_85_hz: 6500.0,
            flatness: 0.25,
            flux: 0.04,
        },
    }
}

fn track(name: &str, set: MeasurementSet) -> TrackMeasurement {
    TrackMeasurement {
        path: PathBuf::from(format!("{name}.wav")),
        measurements: set,
    }
}

/// Ten candidates, eight within the dynamic-range tolerance: coverage
/// sits exactly at 0.8, so a write goes through at `min_ok = 0.8` and
/// is refused at 0.9.
#[test]
fn test_coverage_gates_write_mode() {
    let corpus: Vec<MeasurementSet> = (0..10)
        .map(|i| measurement(-13.8, -1.4, 9.5 + 0.1 * i as f64, 5.0, 0.4, -4.0))
        .collect();
    let mut profile = build("techno", &corpus, &BuildOptions::default()).unwrap();
    profile.tol_dr = 3.0;
    profile.dr_target = 10.0;
    let base_version = profile.version.clone();

    let dr_values = [9.0, 9.5, 9.8, 10.0, 10.2, 10.5, 11.0, 12.5, 15.0, 16.0];
    let candidates: Vec<TrackMeasurement> = dr_values
        .iter()
        .enumerate()
        .map(|(i, &dr)| track(&format!("c{i}"), measurement(-13.8, -1.4, dr, 5.0, 0.4, -4.0)))
        .collect();

    // Dry run first: coverage is the worst per-metric pass rate
    let report = calibrate_measurements(&profile, &candidates, &CalibrateOptions::default()).unwrap();
    assert_eq!(report.num_tracks, 10);
    assert!((report.coverage_current - 0.8).abs() < 1e-9);
    assert!(!report.written);
    let dr_metric = report.metrics.iter().find(|m| m.name == "dr").unwrap();
    assert!((dr_metric.pass_rate_current - 0.8).abs() < 1e-9);
    assert_eq!(report.outliers.len(), 2);
    let outlier_paths: Vec<&PathBuf> = report.outliers.iter().map(|o| &o.path).collect();
    assert!(outlier_paths.contains(&&PathBuf::from("c8.wav")));
    assert!(outlier_paths.contains(&&PathBuf::from("c9.wav")));
    assert!(report.outliers.iter().all(|o| o.worst_metric == "dr"));

    // Write mode passes at the 0.8 floor
    let write = CalibrateOptions {
        min_ok: 0.8,
        write: true,
        output_path: None,
    };
    let report = calibrate_measurements(&profile, &candidates, &write).unwrap();
    assert!(report.written);
    let updated = report.updated_profile.unwrap();
    assert_ne!(updated.version, base_version);
    assert_eq!(updated.num_tracks, 10);

    // The same corpus is refused at a 0.9 floor
    let strict = CalibrateOptions {
        min_ok: 0.9,
        write: true,
        output_path: None,
    };
    let err = calibrate_measurements(&profile, &candidates, &strict).unwrap_err();
    match err {
        ProfileError::CoverageBelowMinimum { coverage, min_ok } => {
            assert!((coverage - 0.8).abs() < 1e-9);
            assert!((min_ok - 0.9).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }

    // A strict dry run still reports, with causes attached
    let strict_dry = CalibrateOptions {
        min_ok: 0.9,
        write: false,
        output_path: None,
    };
    let report = calibrate_measurements(&profile, &candidates, &strict_dry).unwrap();
    assert!(!report.written);
    assert!(report.likely_causes.iter().any(|c| c.contains("dr")));
}

/// Current tolerances pass every candidate but the tightened proposed
/// ones would not: the report still carries causes, while write mode
/// stays gated on current coverage.
#[test]
fn test_projected_coverage_shortfall_reports_causes() {
    let corpus: Vec<MeasurementSet> = (0..10)
        .map(|_| measurement(-13.8, -1.4, 10.0, 5.0, 0.4, -4.0))
        .collect();
    let mut profile = build("techno", &corpus, &BuildOptions::default()).unwrap();
    profile.dr_target = 10.0;
    profile.tol_dr = 4.0;

    // Eight on target, two at +3.5: inside the wide current tolerance,
    // outside the MAD-derived proposal (clamp floor 0.8)
    let dr_values = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 13.5, 13.5];
    let candidates: Vec<TrackMeasurement> = dr_values
        .iter()
        .enumerate()
        .map(|(i, &dr)| track(&format!("p{i}"), measurement(-13.8, -1.4, dr, 5.0, 0.4, -4.0)))
        .collect();

    let strict_dry = CalibrateOptions {
        min_ok: 0.9,
        write: false,
        output_path: None,
    };
    let report = calibrate_measurements(&profile, &candidates, &strict_dry).unwrap();
    assert!((report.coverage_current - 1.0).abs() < 1e-9);
    assert!((report.coverage_proposed - 0.8).abs() < 1e-9);
    assert!(report.likely_causes.iter().any(|c| c.contains("dr")));

    // Write mode keys on current coverage only
    let strict_write = CalibrateOptions {
        min_ok: 0.9,
        write: true,
        output_path: None,
    };
    let report = calibrate_measurements(&profile, &candidates, &strict_write).unwrap();
    assert!(report.written);
}

#[test]
fn test_built_profile_scores_its_own_corpus_highly() {
    let corpus: Vec<MeasurementSet> = (0..8)
        .map(|i| {
            measurement(
                -14.0 - 0.05 * i as f64,
                -1.5 + 0.02 * i as f64,
                9.0 + 0.1 * i as f64,
                5.0,
                0.4,
                -4.0 + 0.05 * i as f64,
            )
        })
        .collect();
    let profile = build("techno", &corpus, &BuildOptions::default()).unwrap();

    let result = score(&corpus[3], Some(&profile));
    assert!(result.score >= 85.0, "score {}", result.score);
    assert_eq!(result.classification, Classification::ReferenceGrade);
}

#[test]
fn test_calibration_written_profile_loads_back() {
    let corpus: Vec<MeasurementSet> = (0..6)
        .map(|i| measurement(-14.0, -1.5, 9.0 + 0.2 * i as f64, 5.0, 0.4, -4.0))
        .collect();
    let profile = build("house", &corpus, &BuildOptions::default()).unwrap();

    let candidates: Vec<TrackMeasurement> = corpus
        .iter()
        .enumerate()
        .map(|(i, set)| track(&format!("t{i}"), set.clone()))
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("house.json");
    let options = CalibrateOptions {
        min_ok: 0.8,
        write: true,
        output_path: Some(out.clone()),
    };
    let report = calibrate_measurements(&profile, &candidates, &options).unwrap();
    assert!(report.written);

    let loaded = mx_profile::ReferenceProfile::load(&out).unwrap();
    assert_eq!(loaded.genre, "house");
    assert_eq!(loaded.num_tracks, 6);
}
