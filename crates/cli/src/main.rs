//! vidpress command-line entry point.
//!
//! Scans a folder for videos, runs the compression pipeline over them, and
//! prints a completion summary. Also exposes the maintenance passes:
//! metadata repair for already-converted pairs and a realized-savings
//! report.

mod state;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vidpress::driver::{self, FileOutcome};
use vidpress::{run_batch, scan_videos, BatchEntry, BatchOptions, EncoderBackend};
use vidpress_config::Config;

#[derive(Parser, Debug)]
#[command(name = "vidpress", version, about = "Batch video compressor")]
struct Args {
    /// Folder to scan; defaults to the last-used folder.
    root: Option<PathBuf>,

    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Force the HQ tier for every file, ignoring embedded ratings.
    #[arg(long)]
    force_hq: bool,

    /// Override the target bitrate (Mbps) for every file.
    #[arg(long, value_name = "MBPS")]
    bitrate: Option<f64>,

    /// Delete the archived _OLD copies after successful replacement.
    #[arg(long)]
    delete_archived: bool,

    /// Scan only the top level of the folder.
    #[arg(long)]
    no_recursive: bool,

    /// Probe and estimate only; print the plan without encoding.
    #[arg(long)]
    dry_run: bool,

    /// Re-copy metadata from _OLD archives onto their converted files.
    #[arg(long)]
    repair_metadata: bool,

    /// Report realized savings over existing _OLD/converted pairs.
    #[arg(long)]
    report: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = load_config(&args.config);
    let backend = match EncoderBackend::from_name(&config.encoder.backend) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let state_file = state::state_file_path();
    let root = match resolve_root(args.root.clone(), state_file.as_deref()) {
        Some(root) => root,
        None => {
            eprintln!("No folder given and no remembered folder; pass one as an argument.");
            return ExitCode::FAILURE;
        }
    };

    if args.report {
        println!("{}", driver::savings_report(&root));
        return ExitCode::SUCCESS;
    }

    if args.repair_metadata {
        let summary = driver::repair_metadata(&root);
        println!(
            "Repaired {} file(s), {} failed",
            summary.repaired, summary.failed
        );
        return if summary.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let recursive = config.scan.recursive && !args.no_recursive;
    let files = scan_videos(&root, recursive);
    if files.is_empty() {
        println!("No videos to process in {}", root.display());
        return ExitCode::SUCCESS;
    }
    info!(folder = %root.display(), files = files.len(), "Selected videos");

    let entries: Vec<BatchEntry> = files
        .into_iter()
        .map(|path| BatchEntry {
            path,
            force_hq: args.force_hq,
            bitrate_override: args.bitrate,
        })
        .collect();

    let options = BatchOptions {
        backend,
        min_ratio_percent: config.batch.min_ratio_percent,
        delete_archived: config.batch.delete_archived || args.delete_archived,
        unattended: true,
        dry_run: args.dry_run,
    };

    let summary = run_batch(&entries, &options);
    print_summary(&summary, args.dry_run);

    if let Some(state_file) = &state_file {
        if let Err(e) = state::write_last_dir(state_file, &root) {
            warn!(error = %e, "Could not record last-used folder");
        }
    }

    if summary.integrity_failures() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Loads configuration, falling back to defaults when the file is absent.
fn load_config(path: &std::path::Path) -> Config {
    if path.is_file() {
        match Config::load(path) {
            Ok(config) => return config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
            }
        }
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    config
}

/// Picks the folder to operate on: explicit argument first, then the
/// remembered last-used folder.
fn resolve_root(arg: Option<PathBuf>, state_file: Option<&std::path::Path>) -> Option<PathBuf> {
    if let Some(root) = arg {
        if root.is_dir() {
            return Some(root);
        }
        eprintln!("Not a directory: {}", root.display());
        return None;
    }
    let remembered = state_file.and_then(state::read_last_dir)?;
    println!("Using last folder: {}", remembered.display());
    Some(remembered)
}

fn print_summary(summary: &vidpress::BatchSummary, dry_run: bool) {
    if dry_run {
        println!("Planned {} file(s):", summary.planned());
        for report in &summary.reports {
            if let FileOutcome::Planned { plan } = &report.outcome {
                let tag = if plan.settings.fallback { " [fallback]" } else { "" };
                println!(
                    "  {}: {}x{} {} at {:.1} Mbps{} -> {} predicted ({:.1}% saved)",
                    report.path.display(),
                    plan.probe.width,
                    plan.probe.height,
                    plan.probe.duration_hms(),
                    plan.settings.bitrate_mbps,
                    tag,
                    driver::format_size(plan.estimate.predicted_mb),
                    plan.estimate.savings_percent(),
                );
            }
        }
        return;
    }

    println!(
        "Done: {} converted, {} skipped, {} failed ({} integrity), {} saved",
        summary.converted(),
        summary.skipped(),
        summary.failed(),
        summary.integrity_failures(),
        driver::format_size(summary.total_saved_mb()),
    );
}
