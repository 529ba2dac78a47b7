//! Probe module for extracting technical attributes from video files.
//!
//! Runs ffprobe once per file to collect codec, dimensions, frame rate,
//! bitrate, duration and size, and exiftool once for the quality rating.
//! Output is positional (`-of default=noprint_wrappers=1:nokey=1`), so the
//! parser depends on the requested field order staying fixed.

use std::path::Path;
use std::process::Command;
use std::time::SystemTime;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute or exited non-zero.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// ffprobe output did not contain the expected fields.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Technical attributes of a single video file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    /// Codec name of the first video stream (e.g., "hevc", "h264").
    pub codec: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frame rate in frames per second.
    pub frame_rate: f64,
    /// Video bitrate in Mbps, when the container reports one.
    pub bitrate_mbps: Option<f64>,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Raw quality rating tag, when present (e.g., "4").
    pub rating: Option<String>,
    /// Last modified time of the file.
    pub modified_at: SystemTime,
    /// True when this record is the defensive placeholder substituted
    /// after a probe failure, not a real measurement.
    pub sentinel: bool,
}

impl VideoProbe {
    /// Placeholder record substituted when probing fails.
    ///
    /// Downstream classification treats it as an unknown resolution, so the
    /// policy lookup misses and the estimate is visibly degenerate. The
    /// `sentinel` flag keeps it distinguishable from a real tiny video.
    pub fn sentinel() -> Self {
        Self {
            codec: "h264".to_string(),
            width: 1,
            height: 1,
            frame_rate: 1.0,
            bitrate_mbps: None,
            duration_secs: 1.0,
            size_bytes: 1,
            rating: None,
            modified_at: SystemTime::UNIX_EPOCH,
            sentinel: true,
        }
    }

    /// File size in MB (decimal, bytes / 1e6).
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1e6
    }

    /// Duration formatted as `H:MM:SS`.
    pub fn duration_hms(&self) -> String {
        format_duration(self.duration_secs)
    }
}

/// Format a duration in seconds as `H:MM:SS` (seconds truncated).
pub fn format_duration(duration_secs: f64) -> String {
    let total = duration_secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Probes a video file with ffprobe and exiftool.
///
/// Runs:
/// `ffprobe -v error -select_streams v:0
///  -show_entries stream=codec_name,width,height,bit_rate,r_frame_rate
///  -show_entries format=duration,size
///  -of default=noprint_wrappers=1:nokey=1 <path>`
///
/// A probe failure is returned as an error; callers decide whether to
/// substitute [`VideoProbe::sentinel`] and keep going.
pub fn probe_video(path: &Path) -> Result<VideoProbe, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name,width,height,bit_rate,r_frame_rate",
            "-show_entries",
            "format=duration,size",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut probe = parse_probe_output(&stdout)?;

    probe.rating = read_rating(path);
    if let Ok(metadata) = std::fs::metadata(path) {
        probe.modified_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    }

    Ok(probe)
}

/// Parses positional ffprobe output into a [`VideoProbe`].
///
/// Field order (one value per line):
/// codec_name, width, height, r_frame_rate, bit_rate, duration, size.
pub fn parse_probe_output(stdout: &str) -> Result<VideoProbe, ProbeError> {
    let lines: Vec<&str> = stdout.trim().lines().map(str::trim).collect();
    if lines.len() < 7 {
        return Err(ProbeError::ParseError(format!(
            "expected 7 fields, got {}",
            lines.len()
        )));
    }

    let codec = lines[0].to_string();
    let width = lines[1]
        .parse::<u32>()
        .map_err(|e| ProbeError::ParseError(format!("width '{}': {}", lines[1], e)))?;
    let height = lines[2]
        .parse::<u32>()
        .map_err(|e| ProbeError::ParseError(format!("height '{}': {}", lines[2], e)))?;
    let frame_rate = parse_frame_rate(lines[3])
        .ok_or_else(|| ProbeError::ParseError(format!("frame rate '{}'", lines[3])))?;
    // Bitrate is frequently "N/A"; that is not an error.
    let bitrate_mbps = lines[4].parse::<f64>().ok().map(|bps| bps / 1e6);
    let duration_secs = lines[5]
        .parse::<f64>()
        .map_err(|e| ProbeError::ParseError(format!("duration '{}': {}", lines[5], e)))?;
    let size_bytes = lines[6]
        .parse::<u64>()
        .map_err(|e| ProbeError::ParseError(format!("size '{}': {}", lines[6], e)))?;

    Ok(VideoProbe {
        codec,
        width,
        height,
        frame_rate,
        bitrate_mbps,
        duration_secs,
        size_bytes,
        rating: None,
        modified_at: SystemTime::UNIX_EPOCH,
        sentinel: false,
    })
}

/// Parses a frame-rate value, either as a fraction "num/den" or a plain float.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num = num.trim().parse::<f64>().ok()?;
        let den = den.trim().parse::<f64>().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    raw.trim().parse::<f64>().ok()
}

/// Reads the XMP rating tag via `exiftool -XMP:Rating`.
///
/// Exiftool prints `XMP Rating : <value>`; the value is the text after the
/// last colon. A missing tool, non-zero exit, or absent tag all yield `None`.
pub fn read_rating(path: &Path) -> Option<String> {
    let output = Command::new("exiftool")
        .arg("-XMP:Rating")
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_rating_output(&stdout)
}

/// Extracts the rating value from exiftool's tabular output.
pub fn parse_rating_output(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = trimmed.rsplit(':').next()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
