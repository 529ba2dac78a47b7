//! Encode invocation via HandBrakeCLI.
//!
//! This crate never touches video bitstreams itself; it builds the exact
//! HandBrakeCLI argument list and blocks on the child process. No retries
//! and no timeout, a failed encode is reported and the caller moves on.

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error type for encode operations.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Configured backend name is not recognized.
    #[error("Unknown encoder backend: {0}")]
    UnknownBackend(String),

    /// HandBrakeCLI exited non-zero or was killed by a signal.
    #[error("HandBrakeCLI failed: {0}")]
    EncoderFailed(String),

    /// IO error launching the encoder.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named encoder backend passed to HandBrakeCLI's `-e` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderBackend {
    /// Hardware H.265 via VideoToolbox.
    VideoToolboxH265,
    /// Software x265.
    SoftwareX265,
}

impl EncoderBackend {
    /// Resolves a configured backend name. Unknown names are a hard
    /// configuration error, not a silent default.
    pub fn from_name(name: &str) -> Result<Self, EncodeError> {
        match name {
            "vt_h265" => Ok(EncoderBackend::VideoToolboxH265),
            "x265" => Ok(EncoderBackend::SoftwareX265),
            other => Err(EncodeError::UnknownBackend(other.to_string())),
        }
    }

    /// The HandBrakeCLI encoder identifier.
    pub fn codec_arg(&self) -> &'static str {
        match self {
            EncoderBackend::VideoToolboxH265 => "vt_h265",
            EncoderBackend::SoftwareX265 => "x265",
        }
    }
}

/// One encode invocation: input, destination, backend and target bitrate.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub backend: EncoderBackend,
    /// Target average bitrate in Mbps; passed to HandBrake in kbps.
    pub bitrate_mbps: f64,
}

impl EncodeJob {
    /// Target bitrate in kbps, as HandBrakeCLI's `-b` expects.
    pub fn bitrate_kbps(&self) -> u64 {
        (self.bitrate_mbps * 1000.0).round() as u64
    }

    /// Builds the full HandBrakeCLI argument list.
    pub fn command_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
            "-o".to_string(),
            self.output.to_string_lossy().into_owned(),
            "-e".to_string(),
            self.backend.codec_arg().to_string(),
            "-b".to_string(),
            self.bitrate_kbps().to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "--encopts".to_string(),
            "keyint=60".to_string(),
            "--optimize".to_string(),
            "--cfr".to_string(),
            "--keep-display-aspect".to_string(),
        ]
    }
}

/// Runs HandBrakeCLI for one job, blocking until it exits.
pub fn run_encode(job: &EncodeJob) -> Result<(), EncodeError> {
    info!(
        input = %job.input.display(),
        output = %job.output.display(),
        backend = job.backend.codec_arg(),
        bitrate_kbps = job.bitrate_kbps(),
        "Starting encode"
    );

    let status = Command::new("HandBrakeCLI").args(job.command_args()).status()?;

    if !status.success() {
        return Err(EncodeError::EncoderFailed(format!(
            "exited with status {} for {}",
            status,
            job.input.display()
        )));
    }

    info!(output = %job.output.display(), "Encode finished");
    Ok(())
}
