//! Batch driver: runs the probe → policy → estimate → encode → metadata →
//! replace pipeline over a selection of files.
//!
//! One file's failure never aborts the batch. Every file ends in exactly
//! one outcome, collected into a [`BatchSummary`]; the rollback-failure
//! case is counted separately because it is the only outcome that can
//! leave a directory inconsistent.

use crate::encode::{run_encode, EncodeJob, EncoderBackend};
use crate::estimate::{estimate_output_size, SizeEstimate};
use crate::metadata::{copy_metadata, sync_timestamp};
use crate::policy::{decide_export_settings, ExportSettings, PolicyTable};
use crate::probe::{probe_video, VideoProbe};
use crate::replace::{archive_source_stem, is_archive_stem, FileTriplet, ReplaceError};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// One file selected for processing, with its per-file overrides.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub path: PathBuf,
    /// Force the HQ tier regardless of the embedded rating.
    pub force_hq: bool,
    /// Replaces the policy bitrate (Mbps); the codec is never overridden.
    pub bitrate_override: Option<f64>,
}

impl BatchEntry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            force_hq: false,
            bitrate_override: None,
        }
    }
}

/// Batch-wide settings, resolved from configuration and CLI flags.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub backend: EncoderBackend,
    /// Minimum predicted savings (percent) to encode in unattended mode.
    pub min_ratio_percent: f32,
    /// Remove the `_OLD` archive after a successful replacement.
    pub delete_archived: bool,
    /// Apply the savings gate without asking.
    pub unattended: bool,
    /// Plan and estimate only; no encoding, no file changes.
    pub dry_run: bool,
}

/// The per-file decision state before any encoding happens.
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub probe: VideoProbe,
    pub settings: ExportSettings,
    pub estimate: SizeEstimate,
}

/// Terminal state of one file in the batch.
#[derive(Debug)]
pub enum FileOutcome {
    /// Encoded and replaced; `saved_mb` is realized, not predicted.
    Converted { output: PathBuf, saved_mb: f64 },
    /// Gate declined the file; nothing was changed.
    Skipped { reason: String },
    /// Dry run: decision recorded, nothing executed.
    Planned { plan: FilePlan },
    /// Failed cleanly; the original is intact.
    Failed { reason: String },
    /// Replace rollback failed; the directory needs manual inspection.
    IntegrityFailure { reason: String },
}

/// Outcome of one file, keyed by its path.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Aggregated results of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn converted(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Converted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn planned(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Planned { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn integrity_failures(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::IntegrityFailure { .. }))
    }

    /// Realized savings over all converted files, in MB.
    pub fn total_saved_mb(&self) -> f64 {
        self.reports
            .iter()
            .map(|r| match &r.outcome {
                FileOutcome::Converted { saved_mb, .. } => *saved_mb,
                _ => 0.0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Runs the full pipeline over `entries`, strictly in order.
pub fn run_batch(entries: &[BatchEntry], options: &BatchOptions) -> BatchSummary {
    let table = PolicyTable::default();
    let mut summary = BatchSummary::default();

    info!(files = entries.len(), dry_run = options.dry_run, "Batch starting");

    for entry in entries {
        let outcome = process_file(entry, options, &table);
        match &outcome {
            FileOutcome::Converted { output, saved_mb } => {
                info!(path = %entry.path.display(), output = %output.display(),
                    saved_mb = format!("{:.1}", saved_mb), "Converted");
            }
            FileOutcome::Skipped { reason } => {
                info!(path = %entry.path.display(), reason = %reason, "Skipped");
            }
            FileOutcome::Planned { .. } => {}
            FileOutcome::Failed { reason } => {
                warn!(path = %entry.path.display(), reason = %reason, "Failed");
            }
            FileOutcome::IntegrityFailure { reason } => {
                error!(path = %entry.path.display(), reason = %reason, "Integrity failure");
            }
        }
        summary.reports.push(FileReport {
            path: entry.path.clone(),
            outcome,
        });
    }

    info!(
        converted = summary.converted(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        integrity_failures = summary.integrity_failures(),
        "Batch finished"
    );
    summary
}

/// Probes and decides settings for one entry without touching any file.
///
/// A probe failure substitutes the placeholder record with a warning; the
/// degenerate numbers then fail the unattended gate on their own.
pub fn plan_file(entry: &BatchEntry, table: &PolicyTable) -> FilePlan {
    let probe = match probe_video(&entry.path) {
        Ok(p) => p,
        Err(e) => {
            warn!(path = %entry.path.display(), error = %e,
                "Probe failed, substituting placeholder record");
            VideoProbe::sentinel()
        }
    };
    plan_from_probe(probe, entry, table)
}

/// The pure decision step, separated from the probing IO.
pub fn plan_from_probe(probe: VideoProbe, entry: &BatchEntry, table: &PolicyTable) -> FilePlan {
    let mut settings = decide_export_settings(table, &probe, entry.force_hq);
    if let Some(bitrate) = entry.bitrate_override {
        // A manual bitrate replaces the table decision and makes the
        // estimate trustworthy again.
        settings.bitrate_mbps = bitrate;
        settings.fallback = false;
    }
    let estimate = estimate_output_size(&probe, &settings);
    FilePlan {
        probe,
        settings,
        estimate,
    }
}

/// Whether a path is itself an `_OLD` archive or already has an `_OLD`
/// sibling from a previous run.
///
/// The scanner filters these out, but the driver guards again so callers
/// handing it paths directly cannot re-encode an archive.
fn already_processed(path: &Path) -> bool {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return false;
    };
    if is_archive_stem(&stem) {
        return true;
    }

    let Some(parent) = path.parent() else {
        return false;
    };
    let Ok(entries) = std::fs::read_dir(parent) else {
        return false;
    };
    entries.flatten().any(|sibling| {
        sibling
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .and_then(|s| archive_source_stem(&s).map(str::to_string))
            .as_deref()
            == Some(stem.as_str())
    })
}

fn process_file(entry: &BatchEntry, options: &BatchOptions, table: &PolicyTable) -> FileOutcome {
    if already_processed(&entry.path) {
        return FileOutcome::Skipped {
            reason: "archived copy already present".to_string(),
        };
    }

    let plan = plan_file(entry, table);

    if options.dry_run {
        return FileOutcome::Planned { plan };
    }

    if options.unattended && !plan.estimate.is_worthwhile(options.min_ratio_percent) {
        return FileOutcome::Skipped {
            reason: format!(
                "predicted savings {:.1}% below threshold {:.1}%",
                plan.estimate.savings_percent(),
                options.min_ratio_percent
            ),
        };
    }

    let triplet = FileTriplet::plan(&entry.path);
    let job = EncodeJob {
        input: entry.path.clone(),
        output: triplet.output.clone(),
        backend: options.backend,
        bitrate_mbps: plan.settings.bitrate_mbps,
    };

    if let Err(e) = run_encode(&job) {
        // Drop the partial output; the original was never touched.
        let _ = std::fs::remove_file(&triplet.output);
        return FileOutcome::Failed {
            reason: format!("encode failed: {}", e),
        };
    }

    // Metadata and timestamp propagation are best-effort.
    if let Err(e) = copy_metadata(&entry.path, &triplet.output) {
        warn!(path = %entry.path.display(), error = %e, "Metadata copy failed");
    }
    if let Err(e) = sync_timestamp(&entry.path, &triplet.output) {
        warn!(path = %entry.path.display(), error = %e, "Timestamp sync failed");
    }

    let promoted = match triplet.commit() {
        Ok(p) => p,
        Err(e @ ReplaceError::RollbackFailed { .. }) => {
            return FileOutcome::IntegrityFailure {
                reason: e.to_string(),
            };
        }
        Err(e) => {
            let _ = std::fs::remove_file(&triplet.output);
            return FileOutcome::Failed {
                reason: format!("replace failed: {}", e),
            };
        }
    };

    if options.delete_archived {
        if let Err(e) = std::fs::remove_file(&triplet.archived) {
            warn!(path = %triplet.archived.display(), error = %e,
                "Could not delete archived copy");
        }
    }

    let output_mb = std::fs::metadata(&promoted)
        .map(|m| m.len() as f64 / 1e6)
        .unwrap_or(0.0);
    FileOutcome::Converted {
        output: promoted,
        saved_mb: plan.estimate.input_mb - output_mb,
    }
}

/// An archived original matched with its converted counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePair {
    pub archived: PathBuf,
    pub converted: PathBuf,
}

/// Finds `_OLD` archives whose converted `.mp4` counterpart still exists
/// beside them.
pub fn find_archive_pairs(root: &Path) -> Vec<ArchivePair> {
    let mut pairs = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let stem = match path.file_stem() {
            Some(s) => s.to_string_lossy().into_owned(),
            None => continue,
        };
        if !is_archive_stem(&stem) {
            continue;
        }
        let (Some(parent), Some(source)) = (path.parent(), archive_source_stem(&stem)) else {
            continue;
        };

        let converted = parent.join(format!("{}.mp4", source));
        if converted.is_file() {
            pairs.push(ArchivePair {
                archived: path.to_path_buf(),
                converted,
            });
        } else {
            warn!(archived = %path.display(), "No converted counterpart found");
        }
    }

    pairs.sort_by(|a, b| a.archived.cmp(&b.archived));
    pairs
}

/// Results of a metadata repair pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub repaired: usize,
    pub failed: usize,
}

/// Re-runs metadata copy and timestamp sync from each archived original
/// onto its converted counterpart. For outputs produced before metadata
/// propagation existed, or when a previous run's exiftool step failed.
pub fn repair_metadata(root: &Path) -> RepairSummary {
    let mut summary = RepairSummary::default();

    for pair in find_archive_pairs(root) {
        let copied = copy_metadata(&pair.archived, &pair.converted);
        let synced = sync_timestamp(&pair.archived, &pair.converted);
        match (copied, synced) {
            (Ok(tags), Ok(())) => {
                info!(converted = %pair.converted.display(), tags, "Metadata repaired");
                summary.repaired += 1;
            }
            (copied, synced) => {
                if let Err(e) = copied {
                    warn!(converted = %pair.converted.display(), error = %e,
                        "Metadata copy failed during repair");
                }
                if let Err(e) = synced {
                    warn!(converted = %pair.converted.display(), error = %e,
                        "Timestamp sync failed during repair");
                }
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Realized before/after totals over all archive pairs under a folder.
#[derive(Debug, Default, PartialEq)]
pub struct SavingsReport {
    pub pairs: usize,
    pub before_mb: f64,
    pub after_mb: f64,
}

impl SavingsReport {
    /// Realized size reduction as a percentage of the original total.
    pub fn savings_percent(&self) -> f64 {
        if self.before_mb <= 0.0 {
            return 0.0;
        }
        (1.0 - self.after_mb / self.before_mb) * 100.0
    }
}

impl std::fmt::Display for SavingsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pair(s): {} -> {} ({:.1}% saved)",
            self.pairs,
            format_size(self.before_mb),
            format_size(self.after_mb),
            self.savings_percent()
        )
    }
}

/// Sums file sizes across every archive/converted pair under `root`.
pub fn savings_report(root: &Path) -> SavingsReport {
    let mut report = SavingsReport::default();

    for pair in find_archive_pairs(root) {
        let before = std::fs::metadata(&pair.archived).map(|m| m.len()).unwrap_or(0);
        let after = std::fs::metadata(&pair.converted).map(|m| m.len()).unwrap_or(0);
        report.pairs += 1;
        report.before_mb += before as f64 / 1e6;
        report.after_mb += after as f64 / 1e6;
    }
    report
}

/// Formats a size in MB as a GB or MB label.
pub fn format_size(mb: f64) -> String {
    if mb >= 1000.0 {
        format!("{:.2} GB", mb / 1000.0)
    } else {
        format!("{:.1} MB", mb)
    }
}
