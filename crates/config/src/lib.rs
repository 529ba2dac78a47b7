//! Configuration crate for vidpress

mod config;

pub use config::{BatchConfig, Config, ConfigError, EncoderConfig, ScanConfig};
