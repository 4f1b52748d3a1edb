//! ridgeprint: CLI tool for minutiae extraction, fingerprint comparison,
//! and matcher parameter experimentation.
//!
//! Runs the extraction pipeline on image files with configurable
//! parameters. Useful for:
//!
//! - Inspecting which minutiae a capture or gallery photo yields
//! - Measuring per-stage durations to identify bottlenecks
//! - Tuning matcher tolerances and the decision threshold
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin ridgeprint -- extract [OPTIONS] <IMAGE>
//! cargo run --release --bin ridgeprint -- match <PROBE> <REFERENCE>
//! cargo run --release --bin ridgeprint -- rank <PROBE> <GALLERY>...
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default
//! `warn`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ridgeprint_pipeline::diagnostics::ExtractionDiagnostics;
use ridgeprint_pipeline::{
    CaptureSource, ExtractorConfig, FeatureSet, MatchResult, MatcherConfig, SystemClock,
    extract_with_diagnostics,
};
use tracing_subscriber::EnvFilter;

/// Minutiae extraction and tolerant matching for fingerprint images.
#[derive(Parser)]
#[command(name = "ridgeprint", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Full extractor config as a JSON string.
    ///
    /// Missing fields take their default values.
    #[arg(long, global = true)]
    extractor_config_json: Option<String>,

    /// Full matcher config as a JSON string.
    ///
    /// Missing fields take their default values.
    #[arg(long, global = true)]
    matcher_config_json: Option<String>,

    /// Override the matcher's decision threshold (0.0-1.0).
    #[arg(long, global = true)]
    threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract minutiae from one image.
    Extract {
        /// Path to the input image (PNG, JPEG, BMP, WebP).
        image: PathBuf,

        /// Treat the image as a gallery photo (enables enhancement).
        #[arg(long)]
        gallery: bool,

        /// Print the feature set as JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Print per-stage timing and count diagnostics.
        #[arg(long)]
        diagnostics: bool,

        /// Number of runs for averaging diagnostics.
        #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        runs: usize,
    },
    /// Extract two images and compare the probe against the reference.
    Match {
        /// Path to the probe image.
        probe: PathBuf,

        /// Path to the reference image.
        reference: PathBuf,

        /// Treat the probe as a gallery photo.
        #[arg(long)]
        probe_gallery: bool,

        /// Treat the reference as a gallery photo.
        #[arg(long)]
        reference_gallery: bool,
    },
    /// Rank gallery images by similarity to a probe capture.
    Rank {
        /// Path to the probe image.
        probe: PathBuf,

        /// Paths to the gallery images.
        #[arg(required = true)]
        gallery: Vec<PathBuf>,

        /// Treat gallery images as gallery photos (enables enhancement).
        #[arg(long)]
        gallery_source: bool,
    },
}

/// Parse the extractor config from `--extractor-config-json`.
fn extractor_config(cli: &Cli) -> Result<ExtractorConfig, String> {
    cli.extractor_config_json.as_ref().map_or_else(
        || Ok(ExtractorConfig::default()),
        |json| {
            serde_json::from_str(json)
                .map_err(|e| format!("Error parsing --extractor-config-json: {e}"))
        },
    )
}

/// Parse the matcher config and apply `--threshold`.
fn matcher_config(cli: &Cli) -> Result<MatcherConfig, String> {
    let mut config: MatcherConfig = match cli.matcher_config_json {
        Some(ref json) => serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --matcher-config-json: {e}"))?,
        None => MatcherConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!("--threshold must be within 0.0-1.0, got {threshold}"));
        }
        config.decision_threshold = threshold;
    }
    Ok(config)
}

/// Read and extract one image file.
fn extract_file(
    path: &Path,
    source: CaptureSource,
    config: &ExtractorConfig,
) -> Result<FeatureSet, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), ?source, "loaded image");
    ridgeprint_pipeline::extract_from_bytes(&bytes, source, config.clone())
        .map_err(|e| format!("Error processing {}: {e}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Error serializing output: {e}"))?;
    println!("{json}");
    Ok(())
}

fn print_feature_table(features: &FeatureSet) {
    println!(
        "{} minutiae in {}x{}",
        features.len(),
        features.dimensions.width,
        features.dimensions.height,
    );
    println!("{:>5} {:>5}  {:<12} {:>8}", "x", "y", "kind", "angle");
    println!("{}", "-".repeat(34));
    for m in &features.minutiae {
        println!("{:>5} {:>5}  {:<12} {:>8.4}", m.x, m.y, m.kind, m.angle);
    }
}

#[allow(clippy::fn_params_excessive_bools)]
fn run_extract(
    cli: &Cli,
    image: &Path,
    gallery: bool,
    json: bool,
    diagnostics: bool,
    runs: usize,
) -> Result<(), String> {
    let config = extractor_config(cli)?;
    let source = CaptureSource::from_gallery_flag(gallery);
    let bytes =
        std::fs::read(image).map_err(|e| format!("Error reading {}: {e}", image.display()))?;
    let decoded = ridgeprint_pipeline::grayscale::decode(&bytes)
        .map_err(|e| format!("Error decoding {}: {e}", image.display()))?;

    eprintln!("Image: {} ({} bytes)", image.display(), bytes.len());

    let clock = SystemClock::new();
    let mut all_diagnostics = Vec::with_capacity(runs);
    let mut features = FeatureSet::default();
    for _ in 0..runs {
        let (staged, diag) = extract_with_diagnostics(decoded.clone(), source, config.clone(), &clock);
        for degradation in &staged.degradations {
            eprintln!("Degraded {}: {}", degradation.stage, degradation.reason);
        }
        features = staged.features;
        all_diagnostics.push(diag);
    }

    if json {
        print_json(&features)?;
    } else {
        print_feature_table(&features);
    }

    if diagnostics {
        if json {
            print_json(&all_diagnostics)?;
        } else if let Some(last) = all_diagnostics.last() {
            println!();
            println!("{}", last.report());
        }
        if runs > 1 {
            print_multi_run_summary(&all_diagnostics);
        }
    }
    Ok(())
}

fn run_match(
    cli: &Cli,
    probe: &Path,
    reference: &Path,
    probe_gallery: bool,
    reference_gallery: bool,
) -> Result<(), String> {
    let extractor = extractor_config(cli)?;
    let matcher = matcher_config(cli)?;

    let probe_features =
        extract_file(probe, CaptureSource::from_gallery_flag(probe_gallery), &extractor)?;
    let reference_features = extract_file(
        reference,
        CaptureSource::from_gallery_flag(reference_gallery),
        &extractor,
    )?;

    print_json(&match_report(&probe_features, &reference_features, &matcher))
}

/// Score the pair once and report both the decision and its breakdown.
fn match_report(
    probe: &FeatureSet,
    reference: &FeatureSet,
    matcher: &MatcherConfig,
) -> serde_json::Value {
    let breakdown = ridgeprint_pipeline::score_features(probe, reference, matcher);
    let result = MatchResult::from_similarity(breakdown.similarity, matcher.decision_threshold);
    serde_json::json!({
        "probe_minutiae": probe.len(),
        "reference_minutiae": reference.len(),
        "result": result,
        "breakdown": breakdown,
    })
}

fn run_rank(cli: &Cli, probe: &Path, gallery: &[PathBuf], gallery_source: bool) -> Result<(), String> {
    let extractor = extractor_config(cli)?;
    let matcher = matcher_config(cli)?;

    let probe_features = extract_file(probe, CaptureSource::Capture, &extractor)?;
    let source = CaptureSource::from_gallery_flag(gallery_source);
    let gallery_features = gallery
        .iter()
        .map(|path| extract_file(path, source, &extractor))
        .collect::<Result<Vec<_>, _>>()?;

    let hits = ridgeprint_pipeline::rank_gallery(&probe_features, &gallery_features, &matcher);
    let ranked: Vec<serde_json::Value> = hits
        .iter()
        .map(|hit| {
            serde_json::json!({
                "path": gallery[hit.index].display().to_string(),
                "minutiae": gallery_features[hit.index].len(),
                "similarity": hit.result.similarity,
                "is_match": hit.result.is_match,
            })
        })
        .collect();
    print_json(&ranked)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match &cli.command {
        Command::Extract {
            image,
            gallery,
            json,
            diagnostics,
            runs,
        } => run_extract(&cli, image, *gallery, *json, *diagnostics, *runs),
        Command::Match {
            probe,
            reference,
            probe_gallery,
            reference_gallery,
        } => run_match(&cli, probe, reference, *probe_gallery, *reference_gallery),
        Command::Rank {
            probe,
            gallery,
            gallery_source,
        } => run_rank(&cli, probe, gallery, *gallery_source),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&ExtractionDiagnostics) -> std::time::Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ExtractionDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Preprocess", |d| d.preprocess.duration),
        ("Binarize", |d| d.binarize.duration),
        ("Skeletonize", |d| d.skeletonize.duration),
        ("Minutiae", |d| d.minutiae.duration),
    ];

    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
