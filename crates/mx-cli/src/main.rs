//! `mx` — measurement, profile building, calibration and scoring from
//! the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mx_core::AnalysisConfig;
use mx_dsp::measurement;
use mx_profile::{
    build_from_dir, calibrate, loader, score, BatchOptions, BuildOptions, CalibrateOptions,
    ReferenceProfile,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mx", version, about = "Audio measurement and conformance scoring")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure a mix and score it against a reference profile
    Score {
        /// Audio file to score
        file: PathBuf,
        /// Reference profile JSON; omit for technical-health scoring
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Use the 8x true-peak interpolator
        #[arg(long)]
        precise: bool,
        /// Emit the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure a single file and print the raw measurement set
    Measure {
        /// Audio file to measure
        file: PathBuf,
        /// Use the 8x true-peak interpolator
        #[arg(long)]
        precise: bool,
    },
    /// Build a reference profile from a directory of tracks
    BuildProfile {
        /// Genre key stamped on the profile
        genre: String,
        /// Directory scanned recursively for audio files
        input_dir: PathBuf,
        /// Output path; defaults to `<genre>.json`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads; defaults to one per core
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
    /// Calibrate an existing profile against candidate tracks
    Calibrate {
        /// Profile JSON to calibrate
        profile: PathBuf,
        /// Candidate audio files
        candidates: Vec<PathBuf>,
        /// Persist updated tolerances instead of only reporting
        #[arg(long)]
        write: bool,
        /// Minimum coverage required before a write is allowed
        #[arg(long, default_value_t = 0.8)]
        min_ok: f64,
        /// Where to write the updated profile; defaults to in-place
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads; defaults to one per core
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match cli.command {
        Command::Score {
            file,
            profile,
            precise,
            json,
        } => cmd_score(file, profile, precise, json),
        Command::Measure { file, precise } => cmd_measure(file, precise),
        Command::BuildProfile {
            genre,
            input_dir,
            output,
            workers,
        } => cmd_build(genre, input_dir, output, workers),
        Command::Calibrate {
            profile,
            candidates,
            write,
            min_ok,
            output,
            workers,
        } => cmd_calibrate(profile, candidates, write, min_ok, output, workers),
    }
}

fn config(precise: bool) -> AnalysisConfig {
    AnalysisConfig {
        precise_true_peak: precise,
        ..AnalysisConfig::default()
    }
}

fn cmd_score(file: PathBuf, profile: Option<PathBuf>, precise: bool, json: bool) -> Result<()> {
    let config = config(precise);
    let reference = profile
        .map(|p| ReferenceProfile::load(&p).with_context(|| format!("loading {}", p.display())))
        .transpose()?;

    let pcm = loader::load_track(&file, config.canonical_sample_rate)
        .with_context(|| format!("loading {}", file.display()))?;
    let measurements = measurement::measure_track(&pcm, &config)?;
    let result = score(&measurements, reference.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", file.display());
    println!(
        "  score          {:.1}  ({})",
        result.score,
        serde_json::to_value(result.classification)?
            .as_str()
            .unwrap_or("?")
    );
    println!("  penalty        {:.3}", result.penalty);
    for metric in &result.metrics {
        println!(
            "  {:<14} {:>8.2}  target {:>8.2}  n={:.2} [{}]",
            metric.name, metric.value, metric.target, metric.normalized, metric.severity
        );
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

fn cmd_measure(file: PathBuf, precise: bool) -> Result<()> {
    let config = config(precise);
    let pcm = loader::load_track(&file, config.canonical_sample_rate)
        .with_context(|| format!("loading {}", file.display()))?;
    let measurements = measurement::measure_track(&pcm, &config)?;
    println!("{}", serde_json::to_string_pretty(&measurements)?);
    Ok(())
}

fn cmd_build(
    genre: String,
    input_dir: PathBuf,
    output: Option<PathBuf>,
    workers: usize,
) -> Result<()> {
    let batch = BatchOptions {
        workers,
        cancel: None,
    };
    let profile = build_from_dir(
        &genre,
        &input_dir,
        &AnalysisConfig::default(),
        &BuildOptions::default(),
        &batch,
    )
    .with_context(|| format!("building profile from {}", input_dir.display()))?;

    let path = output.unwrap_or_else(|| PathBuf::from(format!("{genre}.json")));
    profile.save(&path)?;
    println!(
        "wrote {} ({} tracks, version {})",
        path.display(),
        profile.num_tracks,
        profile.version
    );
    Ok(())
}

fn cmd_calibrate(
    profile_path: PathBuf,
    candidates: Vec<PathBuf>,
    write: bool,
    min_ok: f64,
    output: Option<PathBuf>,
    workers: usize,
) -> Result<()> {
    let profile = ReferenceProfile::load(&profile_path)
        .with_context(|| format!("loading {}", profile_path.display()))?;
    let options = CalibrateOptions {
        min_ok,
        write,
        output_path: Some(output.unwrap_or(profile_path)),
    };
    let batch = BatchOptions {
        workers,
        cancel: None,
    };
    let report = calibrate(
        &profile,
        &candidates,
        &AnalysisConfig::default(),
        &options,
        &batch,
    )?;

    println!(
        "calibrated '{}' against {} tracks",
        report.genre, report.num_tracks
    );
    println!(
        "  coverage       {:.0}% current, {:.0}% proposed",
        report.coverage_current * 100.0,
        report.coverage_proposed * 100.0
    );
    println!(
        "  %OK            {:.0}% before, {:.0}% after",
        report.pct_ok_before * 100.0,
        report.pct_ok_after * 100.0
    );
    for metric in &report.metrics {
        println!(
            "  {:<14} tol {:.2} -> {:.2}  pass {:.0}% -> {:.0}%",
            metric.name,
            metric.tol_current,
            metric.tol_proposed,
            metric.pass_rate_current * 100.0,
            metric.pass_rate_proposed * 100.0
        );
    }
    for cause in &report.likely_causes {
        println!("  cause: {cause}");
    }
    if report.written {
        println!("  profile updated");
    }
    Ok(())
}
