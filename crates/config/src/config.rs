//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Encoder-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Named encoder backend ("vt_h265" or "x265")
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_backend() -> String {
    "vt_h265".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

/// Batch-processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Minimum predicted compression ratio (percent) required to encode
    /// a file in unattended mode.
    #[serde(default = "default_min_ratio_percent")]
    pub min_ratio_percent: f32,
    /// Delete the archived `_OLD` copy after a successful replacement.
    #[serde(default)]
    pub delete_archived: bool,
}

fn default_min_ratio_percent() -> f32 {
    10.0
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_ratio_percent: default_min_ratio_percent(),
            delete_archived: false,
        }
    }
}

/// Directory-scan configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Walk the selected folder recursively (false = one level only).
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: default_recursive(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - ENCODER_BACKEND -> encoder.backend
    /// - BATCH_MIN_RATIO_PERCENT -> batch.min_ratio_percent
    /// - BATCH_DELETE_ARCHIVED -> batch.delete_archived
    /// - SCAN_RECURSIVE -> scan.recursive
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ENCODER_BACKEND") {
            if !val.trim().is_empty() {
                self.encoder.backend = val;
            }
        }

        if let Ok(val) = env::var("BATCH_MIN_RATIO_PERCENT") {
            if let Ok(ratio) = val.parse::<f32>() {
                self.batch.min_ratio_percent = ratio;
            }
        }

        if let Ok(val) = env::var("BATCH_DELETE_ARCHIVED") {
            if let Some(flag) = parse_bool(&val) {
                self.batch.delete_archived = flag;
            }
        }

        if let Ok(val) = env::var("SCAN_RECURSIVE") {
            if let Some(flag) = parse_bool(&val) {
                self.scan.recursive = flag;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Accept "true", "1", "yes" as true; "false", "0", "no" as false.
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
