//! Metadata propagation from the original file to the encoded output.
//!
//! Encoders strip camera tags, so after an encode the allowlisted tags are
//! read from the original with `exiftool -json` and written back onto the
//! output in a single batched exiftool call. Timestamp reconciliation
//! prefers the embedded CreateDate and falls back to copying the original's
//! filesystem times. Everything here is best-effort from the batch's point
//! of view: callers log failures and continue.

use chrono::{Local, NaiveDateTime, TimeZone};
use filetime::FileTime;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// exiftool failed to execute or exited non-zero.
    #[error("exiftool failed: {0}")]
    ExiftoolFailed(String),

    /// exiftool JSON output could not be decoded.
    #[error("Failed to parse exiftool output: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error during metadata handling.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Allowlisted (source tag, destination tag) pairs.
///
/// Device* names are how some cameras expose their identity; they map onto
/// the standard EXIF tags so photo managers recognize the output.
const TAG_MAP: &[(&str, &str)] = &[
    ("Rating", "Rating"),
    ("DeviceManufacturer", "Make"),
    ("DeviceModelName", "Model"),
    ("DeviceSerialNo", "SerialNumber"),
    ("CameraLensModel", "LensModel"),
    ("CameraFocalLength35mmEquivalent", "FocalLengthIn35mmFilm"),
    ("Make", "Make"),
    ("Model", "Model"),
    ("Software", "Software"),
    ("CreateDate", "DateTimeOriginal"),
    ("GPSAltitude", "GPSAltitude"),
    ("GPSAltitudeRef", "GPSAltitudeRef"),
    ("GPSLatitude", "GPSLatitude"),
    ("GPSLongitude", "GPSLongitude"),
    ("Rotation", "Rotation"),
];

/// Copies allowlisted tags from `source` onto `dest`.
///
/// Returns the number of tags written. Zero matching tags is not an error;
/// the write call is skipped entirely.
pub fn copy_metadata(source: &Path, dest: &Path) -> Result<usize, MetadataError> {
    let tags = read_tags(source)?;
    let args = build_copy_args(&tags);

    if args.is_empty() {
        debug!(source = %source.display(), "No allowlisted tags to copy");
        return Ok(0);
    }
    let count = args.len();

    // -P preserves the destination's file times; the encode's own mtime is
    // reconciled separately by sync_timestamp.
    let output = Command::new("exiftool")
        .arg("-P")
        .arg("-overwrite_original")
        .args(&args)
        .arg(dest)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MetadataError::ExiftoolFailed(format!(
            "tag write exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    info!(dest = %dest.display(), tags = count, "Copied metadata tags");
    Ok(count)
}

/// Dumps all tags of a file as a JSON object.
fn read_tags(path: &Path) -> Result<serde_json::Value, MetadataError> {
    let output = Command::new("exiftool").arg("-json").arg(path).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MetadataError::ExiftoolFailed(format!(
            "tag dump exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    // exiftool emits an array with one object per input file.
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    Ok(parsed
        .as_array()
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

/// Builds `-DstTag=value` write arguments for every allowlisted tag present
/// in the dump with a non-empty value.
pub fn build_copy_args(tags: &serde_json::Value) -> Vec<String> {
    let mut args = Vec::new();
    for &(src_tag, dst_tag) in TAG_MAP {
        if let Some(value) = tags.get(src_tag).and_then(tag_value_to_string) {
            args.push(format!("-{}={}", dst_tag, value));
        }
    }
    args
}

/// Renders a JSON tag value as text; empty and structured values are skipped.
fn tag_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Aligns the output's file times with the original's creation time.
///
/// Reads the embedded CreateDate from `source`; when it parses, both the
/// access and modification times of `dest` are set to it. Otherwise the
/// original's filesystem times are copied over instead. Either way the
/// output ends up carrying the best known original creation time.
pub fn sync_timestamp(source: &Path, dest: &Path) -> Result<(), MetadataError> {
    if let Some(file_time) = read_create_date(source).and_then(|s| parse_create_date(&s)) {
        filetime::set_file_times(dest, file_time, file_time)?;
        debug!(dest = %dest.display(), "File times set from embedded CreateDate");
        return Ok(());
    }

    copy_file_times(source, dest)?;
    debug!(dest = %dest.display(), "File times copied from original");
    Ok(())
}

/// Reads the raw CreateDate string, already formatted as
/// `%Y:%m:%d %H:%M:%S` by exiftool's `-d`.
fn read_create_date(path: &Path) -> Option<String> {
    let output = Command::new("exiftool")
        .args(["-CreateDate", "-d", "%Y:%m:%d %H:%M:%S", "-s3"])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Parses an exiftool-formatted local datetime into a file time.
pub fn parse_create_date(raw: &str) -> Option<FileTime> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(FileTime::from_unix_time(local.timestamp(), 0))
}

/// Copies the source file's access and modification times onto the
/// destination (the `touch -r` fallback).
pub fn copy_file_times(source: &Path, dest: &Path) -> Result<(), MetadataError> {
    let meta = std::fs::metadata(source)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    let atime = FileTime::from_last_access_time(&meta);
    filetime::set_file_times(dest, atime, mtime)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_build_copy_args_maps_device_tags() {
        let tags = json!({
            "DeviceManufacturer": "GoPro",
            "DeviceModelName": "HERO11 Black",
            "Rating": 5,
            "SourceFile": "/tmp/clip.mov"
        });
        let args = build_copy_args(&tags);

        assert!(args.contains(&"-Make=GoPro".to_string()));
        assert!(args.contains(&"-Model=HERO11 Black".to_string()));
        assert!(args.contains(&"-Rating=5".to_string()));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_build_copy_args_skips_empty_and_unlisted() {
        let tags = json!({
            "Make": "   ",
            "Duration": "0:00:40",
            "GPSLatitude": "47 deg 36' 22.8\" N"
        });
        let args = build_copy_args(&tags);
        assert_eq!(args, vec!["-GPSLatitude=47 deg 36' 22.8\" N".to_string()]);
    }

    #[test]
    fn test_build_copy_args_create_date_remap() {
        let tags = json!({ "CreateDate": "2024:06:01 12:00:00" });
        let args = build_copy_args(&tags);
        assert_eq!(args, vec!["-DateTimeOriginal=2024:06:01 12:00:00".to_string()]);
    }

    #[test]
    fn test_build_copy_args_empty_dump() {
        assert!(build_copy_args(&serde_json::Value::Null).is_empty());
        assert!(build_copy_args(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_create_date() {
        let a = parse_create_date("2024:06:01 12:00:00").expect("valid datetime");
        let b = parse_create_date("2024:06:01 12:00:01").expect("valid datetime");
        assert!(b > a);
        assert_eq!(b.unix_seconds() - a.unix_seconds(), 1);

        assert!(parse_create_date("0000:00:00 00:00:00").is_none());
        assert!(parse_create_date("not a date").is_none());
        assert!(parse_create_date("").is_none());
    }

    #[test]
    fn test_copy_file_times() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("original.mov");
        let dst = dir.path().join("converted.mp4");
        std::fs::write(&src, b"src").unwrap();
        std::fs::write(&dst, b"dst").unwrap();

        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(&src, stamp, stamp).unwrap();

        copy_file_times(&src, &dst).unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), stamp);
    }

    #[test]
    fn test_copy_file_times_missing_source() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("converted.mp4");
        std::fs::write(&dst, b"dst").unwrap();

        let result = copy_file_times(&dir.path().join("gone.mov"), &dst);
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }
}
