//! Transactional replacement of an original video with its encoded output.
//!
//! The commit is two renames: the original is archived under an `_OLD`
//! name, then the encoded output is promoted to the original's stem with an
//! `.mp4` extension. A failed archive leaves everything untouched; a failed
//! promote rolls the archive back. A failed rollback is the one outcome
//! that can strand files mid-operation, so it is reported as its own
//! variant and logged loudly. Original bytes are never deleted here.
//!
//! Renames stay within one directory, so same-volume atomicity is assumed.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

/// Suffix appended to the original's stem when it is archived.
const ARCHIVE_SUFFIX: &str = "_OLD";

/// Error type for replace operations.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// Archiving the original failed; nothing was changed.
    #[error("Failed to archive original {path}: {source}")]
    ArchiveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Promoting the output failed; the archive rename was rolled back.
    #[error("Failed to promote output {path}: {source}")]
    PromoteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Promote failed AND the rollback rename failed. The original now
    /// sits under its archive name with no converted replacement in
    /// place. Data-integrity fatal: requires manual inspection.
    #[error("Rollback failed, original left at {archived}: {source}")]
    RollbackFailed {
        archived: PathBuf,
        source: std::io::Error,
    },
}

/// The three paths involved in one replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTriplet {
    /// The original video, untouched until commit.
    pub original: PathBuf,
    /// The encoded output, sitting at its staging name.
    pub output: PathBuf,
    /// Where the original goes when archived.
    pub archived: PathBuf,
}

impl FileTriplet {
    /// Plans a replacement for `original`: picks a collision-free archive
    /// name and a collision-free staging name for the encoder to write to.
    pub fn plan(original: &Path) -> Self {
        Self {
            original: original.to_path_buf(),
            output: disambiguate(&original.with_extension("mp4")),
            archived: archived_path(original),
        }
    }

    /// The name the output is promoted to: the original's stem with an
    /// `.mp4` extension.
    pub fn promoted(&self) -> PathBuf {
        self.original.with_extension("mp4")
    }

    /// Commits the replacement: archive the original, promote the output.
    ///
    /// Returns the promoted path. On a promote failure the archive rename
    /// is undone before returning, so the directory is back in its
    /// pre-commit state; only [`ReplaceError::RollbackFailed`] leaves it
    /// otherwise.
    pub fn commit(&self) -> Result<PathBuf, ReplaceError> {
        std::fs::rename(&self.original, &self.archived).map_err(|source| {
            ReplaceError::ArchiveFailed {
                path: self.original.clone(),
                source,
            }
        })?;

        // The staged output usually sits at the promoted name already (any
        // non-mp4 original leaves that name free at plan time); it is not a
        // collision with itself. Anything else still there after archiving
        // is a foreign file and must not be clobbered.
        let promoted = if self.output == self.promoted() {
            self.promoted()
        } else {
            disambiguate(&self.promoted())
        };

        if let Err(source) = std::fs::rename(&self.output, &promoted) {
            return match std::fs::rename(&self.archived, &self.original) {
                Ok(()) => Err(ReplaceError::PromoteFailed {
                    path: self.output.clone(),
                    source,
                }),
                Err(rollback_err) => {
                    error!(
                        archived = %self.archived.display(),
                        original = %self.original.display(),
                        error = %rollback_err,
                        "Rollback failed, original stranded under archive name"
                    );
                    Err(ReplaceError::RollbackFailed {
                        archived: self.archived.clone(),
                        source: rollback_err,
                    })
                }
            };
        }

        info!(
            original = %self.archived.display(),
            replacement = %promoted.display(),
            "Replacement committed"
        );
        Ok(promoted)
    }
}

/// The archive name for an original: `{stem}_OLD{ext}`, disambiguated with
/// a ` {n}` counter when that name is taken.
pub fn archived_path(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}{}", stem, ARCHIVE_SUFFIX);
    if let Some(ext) = original.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    disambiguate(&original.with_file_name(name))
}

/// Returns `candidate` if free, otherwise the first `{stem} {n}{ext}`
/// (n = 1, 2, ...) that does not exist.
pub fn disambiguate(candidate: &Path) -> PathBuf {
    if !candidate.exists() {
        return candidate.to_path_buf();
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = candidate.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1u32.. {
        let mut name = format!("{} {}", stem, n);
        if let Some(ext) = &ext {
            name.push('.');
            name.push_str(ext);
        }
        let next = candidate.with_file_name(name);
        if !next.exists() {
            return next;
        }
    }
    unreachable!("counter space exhausted");
}

/// Whether a file stem names an archived original (`foo_OLD`,
/// `foo_OLD 2`, ...).
pub fn is_archive_stem(stem: &str) -> bool {
    match stem.rsplit_once(' ') {
        Some((base, counter)) if counter.chars().all(|c| c.is_ascii_digit()) => {
            base.ends_with(ARCHIVE_SUFFIX)
        }
        _ => stem.ends_with(ARCHIVE_SUFFIX),
    }
}

/// The stem an archive name refers back to (`foo_OLD 2` -> `foo`), or
/// `None` if the stem is not an archive name.
pub fn archive_source_stem(stem: &str) -> Option<&str> {
    let base = match stem.rsplit_once(' ') {
        Some((base, counter)) if counter.chars().all(|c| c.is_ascii_digit()) => base,
        _ => stem,
    };
    base.strip_suffix(ARCHIVE_SUFFIX)
}
