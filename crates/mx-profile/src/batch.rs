//! Batch measurement runner
//!
//! Builder and calibrator both walk a set of files through the same
//! pipeline, and tracks are independent, so the work fans out over a
//! bounded pool of workers. Each worker owns one track end-to-end
//! (decode, resample, measure) and hands the finished
//! [`TrackMeasurement`] back over a channel; no PCM is ever shared
//! between threads.
//!
//! Per-file checkpointing: a file that fails to decode or measure is
//! logged and skipped, never aborts the batch. Cancellation is checked
//! between files.

use crate::loader;
use crossbeam_channel::{bounded, unbounded};
use mx_core::AnalysisConfig;
use mx_dsp::measurement::{self, MeasurementSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// Extensions the batch runner will pick up when scanning a directory.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "m4a", "aac", "ogg", "aiff", "aif"];

/// Worker pool settings.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Worker thread count; 0 means one per core
    pub workers: usize,
    /// Shared cancel flag, polled between files
    pub cancel: Option<Arc<AtomicBool>>,
}

impl BatchOptions {
    fn effective_workers(&self, jobs: usize) -> usize {
        let cap = if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        };
        cap.min(jobs).max(1)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// One successfully measured file.
#[derive(Debug, Clone)]
pub struct TrackMeasurement {
    /// Source file
    pub path: PathBuf,
    /// Full pipeline output
    pub measurements: MeasurementSet,
}

/// Recursively collect measurable audio files under a directory, in
/// sorted order so batches are reproducible.
pub fn collect_audio_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        })
        .collect();
    files.sort();
    files
}

/// Measure every file through the full pipeline on a worker pool.
///
/// Results come back in input order. Files that fail are warned about
/// and dropped from the output; the caller decides whether an empty
/// result is an error.
pub fn measure_files(
    paths: &[PathBuf],
    config: &AnalysisConfig,
    options: &BatchOptions,
) -> Vec<TrackMeasurement> {
    if paths.is_empty() {
        return Vec::new();
    }

    let workers = options.effective_workers(paths.len());
    log::info!("measuring {} files on {workers} workers", paths.len());

    let (job_tx, job_rx) = bounded::<(usize, &PathBuf)>(paths.len());
    let (result_tx, result_rx) = unbounded::<(usize, TrackMeasurement)>();

    let mut results: Vec<(usize, TrackMeasurement)> = std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((index, path)) = job_rx.recv() {
                    if options.is_cancelled() {
                        log::info!("batch cancelled, worker draining");
                        break;
                    }
                    match measure_one(path, config) {
                        Ok(measurements) => {
                            let _ = result_tx.send((
                                index,
                                TrackMeasurement {
                                    path: path.clone(),
                                    measurements,
                                },
                            ));
                        }
                        Err(e) => {
                            log::warn!("skipping {}: {e}", path.display());
                        }
                    }
                }
            });
        }

        for job in paths.iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);
        drop(result_tx);

        result_rx.iter().collect()
    });

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, m)| m).collect()
}

fn measure_one(path: &Path, config: &AnalysisConfig) -> crate::ProfileResult<MeasurementSet> {
    let pcm = loader::load_track(path, config.canonical_sample_rate)?;
    Ok(measurement::measure_track(&pcm, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn write_tone(path: &Path, amp: f64) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..48000 * 4 {
            let s = (amp * (2.0 * PI * 440.0 * i as f64 / 48000.0).sin()) as f32;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_corrupt_file_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        let bad = dir.path().join("bad.wav");
        write_tone(&good, 0.4);
        std::fs::write(&bad, b"definitely not audio").unwrap();

        let paths = vec![bad, good.clone()];
        let results = measure_files(&paths, &AnalysisConfig::default(), &BatchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, good);
    }

    #[test]
    fn test_results_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, amp) in [0.1, 0.2, 0.3, 0.4].iter().enumerate() {
            let path = dir.path().join(format!("t{i}.wav"));
            write_tone(&path, *amp);
            paths.push(path);
        }

        let options = BatchOptions {
            workers: 4,
            cancel: None,
        };
        let results = measure_files(&paths, &AnalysisConfig::default(), &options);
        assert_eq!(results.len(), 4);
        for (result, path) in results.iter().zip(paths.iter()) {
            assert_eq!(&result.path, path);
        }
        // Louder input, higher integrated loudness
        assert!(
            results[3].measurements.loudness.integrated_lufs
                > results[0].measurements.loudness.integrated_lufs
        );
    }

    #[test]
    fn test_cancelled_batch_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 0.3);
        let paths: Vec<PathBuf> = (0..8).map(|_| path.clone()).collect();

        let cancel = Arc::new(AtomicBool::new(true));
        let options = BatchOptions {
            workers: 2,
            cancel: Some(cancel),
        };
        let results = measure_files(&paths, &AnalysisConfig::default(), &options);
        assert!(results.len() < paths.len());
    }

    #[test]
    fn test_collect_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_tone(&dir.path().join("a.wav"), 0.2);
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let files = collect_audio_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.wav"));
    }
}
