//! Core library for vidpress, a batch video-compression orchestrator.
//!
//! vidpress never touches video bitstreams itself. It probes files with
//! ffprobe, decides target settings from an immutable policy table,
//! estimates whether the encode is worth it, drives HandBrakeCLI, copies
//! camera metadata back with exiftool, and swaps the result into place
//! with a rollback-safe rename pair.

pub mod driver;
pub mod encode;
pub mod estimate;
pub mod metadata;
pub mod policy;
pub mod probe;
pub mod replace;
pub mod scan;

pub use driver::{
    run_batch, savings_report, BatchEntry, BatchOptions, BatchSummary, FileOutcome, FileReport,
};
pub use encode::{EncodeError, EncodeJob, EncoderBackend};
pub use estimate::{estimate_output_size, SizeEstimate};
pub use metadata::MetadataError;
pub use policy::{
    decide_export_settings, ExportSettings, PolicyTable, QualityTier, ResolutionClass,
};
pub use probe::{probe_video, ProbeError, VideoProbe};
pub use replace::{FileTriplet, ReplaceError};
pub use scan::scan_videos;
