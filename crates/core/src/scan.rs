//! Directory scanning for candidate videos.
//!
//! Walks a folder (recursively or one level) and keeps files with a video
//! extension, skipping dotfiles, hidden directories, archived `_OLD`
//! copies, and files that already have an `_OLD` sibling from a previous
//! run.

use crate::replace::{archive_source_stem, is_archive_stem};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions considered video files, matched case-insensitively.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];

/// Whether a path carries one of the recognized video extensions.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Scans `root` for videos eligible for compression.
///
/// With `recursive` false only the top level is examined. Results come
/// back sorted so batch order is stable across runs.
pub fn scan_videos(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut candidates: Vec<PathBuf> = Vec::new();
    // (directory, stem) pairs already archived by a previous run.
    let mut archived: HashSet<(PathBuf, String)> = HashSet::new();

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let stem = match path.file_stem() {
            Some(s) => s.to_string_lossy().into_owned(),
            None => continue,
        };

        if is_archive_stem(&stem) {
            if let (Some(parent), Some(source)) = (path.parent(), archive_source_stem(&stem)) {
                archived.insert((parent.to_path_buf(), source.to_string()));
            }
            continue;
        }

        if is_video_file(path) {
            candidates.push(path.to_path_buf());
        }
    }

    candidates.retain(|path| {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let processed = archived.contains(&(parent, stem));
        if processed {
            debug!(path = %path.display(), "Skipping, archived sibling present");
        }
        !processed
    });

    candidates.sort();
    candidates
}
