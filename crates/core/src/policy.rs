//! Policy engine mapping probed video attributes to target encode settings.
//!
//! Classification buckets resolution (with a ±10% tolerance band, both
//! orientations), frame rate (nearest multiple of 30), and quality tier
//! (rating- or override-driven), then resolves a target bitrate from an
//! immutable per-codec table. A lookup miss yields a tagged fallback rather
//! than an error so a whole batch never stops on one odd file.

use crate::probe::VideoProbe;
use serde::{Deserialize, Serialize};

/// Bitrate (Mbps) reported when no policy entry matches. Deliberately
/// implausible so a fallback estimate reads as "do not trust this".
pub const FALLBACK_BITRATE_MBPS: f64 = 999.0;

/// Resolution tolerance band, as a fraction of the reference dimensions.
const RESOLUTION_TOLERANCE: f64 = 0.10;

/// Resolution bucket for a video, derived from its pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionClass {
    /// 3840x2160 ±10%, either orientation.
    Res4k,
    /// 2704x1520 ±10%, either orientation.
    Res27k,
    /// 1920x1080 ±10%, either orientation.
    Res1080p,
    /// No reference resolution matched.
    Unknown,
}

impl std::fmt::Display for ResolutionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionClass::Res4k => write!(f, "4k"),
            ResolutionClass::Res27k => write!(f, "2.7k"),
            ResolutionClass::Res1080p => write!(f, "1080p"),
            ResolutionClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reference resolutions checked in order, largest first.
const REFERENCE_RESOLUTIONS: &[(u32, u32, ResolutionClass)] = &[
    (3840, 2160, ResolutionClass::Res4k),
    (2704, 1520, ResolutionClass::Res27k),
    (1920, 1080, ResolutionClass::Res1080p),
];

/// Classifies pixel dimensions against the reference resolutions.
///
/// Each axis must fall within ±10% of the reference; portrait videos are
/// matched by checking the swapped orientation as well.
pub fn classify_resolution(width: u32, height: u32) -> ResolutionClass {
    for &(ref_w, ref_h, class) in REFERENCE_RESOLUTIONS {
        if (within_tolerance(width, ref_w) && within_tolerance(height, ref_h))
            || (within_tolerance(width, ref_h) && within_tolerance(height, ref_w))
        {
            return class;
        }
    }
    ResolutionClass::Unknown
}

fn within_tolerance(actual: u32, reference: u32) -> bool {
    let lo = reference as f64 * (1.0 - RESOLUTION_TOLERANCE);
    let hi = reference as f64 * (1.0 + RESOLUTION_TOLERANCE);
    let actual = actual as f64;
    actual >= lo && actual <= hi
}

/// Frame-rate bucket, keyed by the nearest multiple of 30 fps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameRateClass {
    Fps30,
    Fps60,
    Fps120,
}

impl FrameRateClass {
    /// Buckets a frame rate: anything at or below 30 fps (24, 25, 29.97)
    /// is the 30 bucket; above, the rate rounds to the nearest multiple
    /// of 30. Multiples without a table row (90, 150, ...) return `None`.
    pub fn from_fps(fps: f64) -> Option<Self> {
        if fps <= 30.0 {
            return Some(FrameRateClass::Fps30);
        }
        match (fps / 30.0).round() as u32 {
            1 => Some(FrameRateClass::Fps30),
            2 => Some(FrameRateClass::Fps60),
            4 => Some(FrameRateClass::Fps120),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameRateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameRateClass::Fps30 => write!(f, "30"),
            FrameRateClass::Fps60 => write!(f, "60"),
            FrameRateClass::Fps120 => write!(f, "120"),
        }
    }
}

/// Coarse encode-quality selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    Lq,
    Hq,
}

impl QualityTier {
    /// HQ when explicitly forced or when the probed rating parses as an
    /// integer >= 5. Garbage or absent ratings stay LQ, never an error.
    pub fn determine(rating: Option<&str>, force_hq: bool) -> Self {
        if force_hq {
            return QualityTier::Hq;
        }
        match rating.and_then(|r| r.trim().parse::<i64>().ok()) {
            Some(r) if r >= 5 => QualityTier::Hq,
            _ => QualityTier::Lq,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Lq => write!(f, "LQ"),
            QualityTier::Hq => write!(f, "HQ"),
        }
    }
}

/// One row of the policy table: target bitrates for a resolution and
/// frame-rate bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub resolution: ResolutionClass,
    pub frame_rate: FrameRateClass,
    pub lq_mbps: f64,
    pub hq_mbps: f64,
}

/// Static mapping from video characteristics to target bitrates, keyed for
/// one codec identifier. Constructed once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Codec identifier the table applies to.
    pub codec: String,
    pub entries: Vec<PolicyEntry>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let row = |resolution, frame_rate, lq_mbps, hq_mbps| PolicyEntry {
            resolution,
            frame_rate,
            lq_mbps,
            hq_mbps,
        };
        use FrameRateClass::{Fps120, Fps30, Fps60};
        use ResolutionClass::{Res1080p, Res27k, Res4k};

        Self {
            codec: "vt_h265".to_string(),
            entries: vec![
                row(Res4k, Fps30, 25.0, 60.0),
                row(Res4k, Fps60, 30.0, 70.0),
                row(Res4k, Fps120, 50.0, 100.0),
                row(Res27k, Fps30, 15.0, 35.0),
                row(Res27k, Fps60, 20.0, 45.0),
                row(Res27k, Fps120, 35.0, 70.0),
                row(Res1080p, Fps30, 8.0, 15.0),
                row(Res1080p, Fps60, 10.0, 20.0),
                row(Res1080p, Fps120, 20.0, 40.0),
            ],
        }
    }
}

impl PolicyTable {
    /// Looks up the target bitrate for a classified video.
    ///
    /// Returns `None` on any missing key: unknown resolution, unbucketable
    /// frame rate, or a codec the table is not keyed for.
    pub fn lookup(
        &self,
        codec: &str,
        resolution: ResolutionClass,
        frame_rate: Option<FrameRateClass>,
        tier: QualityTier,
    ) -> Option<f64> {
        if codec != self.codec {
            return None;
        }
        let frame_rate = frame_rate?;
        self.entries
            .iter()
            .find(|e| e.resolution == resolution && e.frame_rate == frame_rate)
            .map(|e| match tier {
                QualityTier::Lq => e.lq_mbps,
                QualityTier::Hq => e.hq_mbps,
            })
    }
}

/// Target encode parameters for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Target average bitrate in Mbps.
    pub bitrate_mbps: f64,
    /// Target codec identifier.
    pub codec: String,
    /// True when no policy entry matched and the sentinel bitrate was
    /// substituted; callers must not trust estimates derived from it.
    pub fallback: bool,
}

/// Decides export settings for a probed video.
///
/// 1. Quality tier from the force flag or the probed rating.
/// 2. Resolution and frame-rate classification.
/// 3. Table lookup; a miss yields the tagged fallback settings.
/// 4. Clamp to the known input bitrate so the target never exceeds the
///    source.
pub fn decide_export_settings(
    table: &PolicyTable,
    probe: &VideoProbe,
    force_hq: bool,
) -> ExportSettings {
    let tier = QualityTier::determine(probe.rating.as_deref(), force_hq);
    let resolution = classify_resolution(probe.width, probe.height);
    let frame_rate = FrameRateClass::from_fps(probe.frame_rate);

    match table.lookup(&table.codec, resolution, frame_rate, tier) {
        Some(table_mbps) => {
            let bitrate_mbps = match probe.bitrate_mbps {
                Some(input) => table_mbps.min(input),
                None => table_mbps,
            };
            ExportSettings {
                bitrate_mbps,
                codec: table.codec.clone(),
                fallback: false,
            }
        }
        None => ExportSettings {
            bitrate_mbps: FALLBACK_BITRATE_MBPS,
            codec: table.codec.clone(),
            fallback: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_probe(
        width: u32,
        height: u32,
        fps: f64,
        bitrate_mbps: Option<f64>,
        rating: Option<&str>,
    ) -> VideoProbe {
        VideoProbe {
            codec: "hevc".to_string(),
            width,
            height,
            frame_rate: fps,
            bitrate_mbps,
            duration_secs: 60.0,
            size_bytes: 500_000_000,
            rating: rating.map(str::to_string),
            modified_at: std::time::SystemTime::UNIX_EPOCH,
            sentinel: false,
        }
    }

    #[test]
    fn test_classify_resolution_exact() {
        assert_eq!(classify_resolution(3840, 2160), ResolutionClass::Res4k);
        assert_eq!(classify_resolution(2704, 1520), ResolutionClass::Res27k);
        assert_eq!(classify_resolution(1920, 1080), ResolutionClass::Res1080p);
    }

    #[test]
    fn test_classify_resolution_tolerance_band() {
        // 10% under 4K on both axes still classifies as 4K.
        assert_eq!(classify_resolution(3456, 1944), ResolutionClass::Res4k);
        // Outside every band.
        assert_eq!(classify_resolution(3000, 1688), ResolutionClass::Unknown);
    }

    #[test]
    fn test_classify_resolution_portrait() {
        assert_eq!(classify_resolution(2160, 3840), ResolutionClass::Res4k);
        assert_eq!(classify_resolution(1080, 1920), ResolutionClass::Res1080p);
    }

    #[test]
    fn test_classify_resolution_degenerate() {
        assert_eq!(classify_resolution(1, 1), ResolutionClass::Unknown);
        assert_eq!(classify_resolution(640, 480), ResolutionClass::Unknown);
    }

    #[test]
    fn test_frame_rate_buckets() {
        assert_eq!(FrameRateClass::from_fps(24.0), Some(FrameRateClass::Fps30));
        assert_eq!(FrameRateClass::from_fps(29.97), Some(FrameRateClass::Fps30));
        // Exactly 30 stays in the 30 bucket, never rounds up.
        assert_eq!(FrameRateClass::from_fps(30.0), Some(FrameRateClass::Fps30));
        assert_eq!(FrameRateClass::from_fps(59.94), Some(FrameRateClass::Fps60));
        assert_eq!(FrameRateClass::from_fps(60.0), Some(FrameRateClass::Fps60));
        assert_eq!(FrameRateClass::from_fps(120.0), Some(FrameRateClass::Fps120));
        // 90 rounds to a multiple with no table row.
        assert_eq!(FrameRateClass::from_fps(90.0), None);
    }

    #[test]
    fn test_quality_tier_table() {
        assert_eq!(QualityTier::determine(Some("5"), false), QualityTier::Hq);
        assert_eq!(QualityTier::determine(Some("4"), false), QualityTier::Lq);
        assert_eq!(QualityTier::determine(Some("abc"), false), QualityTier::Lq);
        assert_eq!(QualityTier::determine(None, false), QualityTier::Lq);
        assert_eq!(QualityTier::determine(Some("1"), true), QualityTier::Hq);
    }

    #[test]
    fn test_decide_4k30_lq_clamped() {
        // 4K/30fps/LQ at 50 Mbps input: table says 25, min(25, 50) = 25.
        let table = PolicyTable::default();
        let probe = make_probe(3840, 2160, 30.0, Some(50.0), None);
        let settings = decide_export_settings(&table, &probe, false);

        assert!(!settings.fallback);
        assert!((settings.bitrate_mbps - 25.0).abs() < f64::EPSILON);
        assert_eq!(settings.codec, "vt_h265");
    }

    #[test]
    fn test_decide_clamps_to_low_input_bitrate() {
        // Input already below the table value: never upscale.
        let table = PolicyTable::default();
        let probe = make_probe(3840, 2160, 30.0, Some(12.0), None);
        let settings = decide_export_settings(&table, &probe, false);

        assert!((settings.bitrate_mbps - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decide_unknown_resolution_falls_back() {
        let table = PolicyTable::default();
        let probe = make_probe(640, 480, 30.0, Some(2.0), None);
        let settings = decide_export_settings(&table, &probe, false);

        assert!(settings.fallback);
        assert!((settings.bitrate_mbps - FALLBACK_BITRATE_MBPS).abs() < f64::EPSILON);
        assert_eq!(settings.codec, "vt_h265");
    }

    #[test]
    fn test_decide_sentinel_probe_falls_back() {
        let table = PolicyTable::default();
        let settings = decide_export_settings(&table, &VideoProbe::sentinel(), false);
        assert!(settings.fallback);
    }

    #[test]
    fn test_decide_hq_from_rating() {
        let table = PolicyTable::default();
        let probe = make_probe(1920, 1080, 60.0, None, Some("5"));
        let settings = decide_export_settings(&table, &probe, false);

        assert!(!settings.fallback);
        assert!((settings.bitrate_mbps - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lookup_wrong_codec_misses() {
        let table = PolicyTable::default();
        assert_eq!(
            table.lookup(
                "libx264",
                ResolutionClass::Res4k,
                Some(FrameRateClass::Fps30),
                QualityTier::Lq
            ),
            None
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // Bitrate clamp invariant: with a known input bitrate and a
        // successful lookup, the target never exceeds the source.
        #[test]
        fn prop_bitrate_never_exceeds_input(
            width in 1u32..8000,
            height in 1u32..4500,
            fps in 1.0f64..240.0,
            input_mbps in 0.1f64..200.0,
            rating in proptest::option::of("[0-9]{1}"),
            force_hq in proptest::bool::ANY,
        ) {
            let table = PolicyTable::default();
            let probe = make_probe(width, height, fps, Some(input_mbps), rating.as_deref());
            let settings = decide_export_settings(&table, &probe, force_hq);

            if !settings.fallback {
                prop_assert!(
                    settings.bitrate_mbps <= input_mbps + 1e-9,
                    "target {} exceeds input {}",
                    settings.bitrate_mbps,
                    input_mbps
                );
            }
        }

        // Classification is deterministic and total.
        #[test]
        fn prop_classification_total(
            width in 1u32..10000,
            height in 1u32..10000,
        ) {
            let a = classify_resolution(width, height);
            let b = classify_resolution(width, height);
            prop_assert_eq!(a, b);
            // Swapping orientation never changes the bucket.
            prop_assert_eq!(a, classify_resolution(height, width));
        }

        // Every decision carries the table codec, fallback or not.
        #[test]
        fn prop_codec_always_from_table(
            width in 1u32..8000,
            height in 1u32..4500,
            fps in 1.0f64..240.0,
        ) {
            let table = PolicyTable::default();
            let probe = make_probe(width, height, fps, None, None);
            let settings = decide_export_settings(&table, &probe, false);
            prop_assert_eq!(settings.codec, table.codec);
        }
    }
}
