//! Persistence of the last-used directory between runs.
//!
//! A single-line hidden file in the home directory remembers where the
//! previous batch ran, so invoking without a root argument resumes there.

use std::path::{Path, PathBuf};

/// File name of the state file in the home directory.
const STATE_FILE_NAME: &str = ".vidpress_last_dir";

/// Path of the state file, or `None` when no home directory is known.
pub fn state_file_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(STATE_FILE_NAME))
}

/// Reads the remembered directory; `None` when the file is missing, empty,
/// or the directory no longer exists.
pub fn read_last_dir(state_file: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(state_file).ok()?;
    let line = content.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let dir = PathBuf::from(line);
    if dir.is_dir() {
        Some(dir)
    } else {
        None
    }
}

/// Records `dir` as the last-used directory. Failures are non-fatal for
/// the batch, callers log and move on.
pub fn write_last_dir(state_file: &Path, dir: &Path) -> std::io::Result<()> {
    std::fs::write(state_file, format!("{}\n", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let home = TempDir::new().unwrap();
        let state = home.path().join(STATE_FILE_NAME);
        let target = home.path().join("videos");
        std::fs::create_dir(&target).unwrap();

        write_last_dir(&state, &target).unwrap();
        assert_eq!(read_last_dir(&state), Some(target));
    }

    #[test]
    fn test_missing_file() {
        let home = TempDir::new().unwrap();
        assert_eq!(read_last_dir(&home.path().join(STATE_FILE_NAME)), None);
    }

    #[test]
    fn test_stale_directory_ignored() {
        let home = TempDir::new().unwrap();
        let state = home.path().join(STATE_FILE_NAME);
        std::fs::write(&state, "/definitely/not/a/real/dir\n").unwrap();
        assert_eq!(read_last_dir(&state), None);
    }

    #[test]
    fn test_empty_file_ignored() {
        let home = TempDir::new().unwrap();
        let state = home.path().join(STATE_FILE_NAME);
        std::fs::write(&state, "\n").unwrap();
        assert_eq!(read_last_dir(&state), None);
    }
}
