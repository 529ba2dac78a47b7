//! Output-size estimation from target bitrate and duration.
//!
//! The estimate is purely arithmetic: a target of N Mbps over D seconds
//! produces N * D * 0.125 MB (decimal megabytes). It exists to decide,
//! before spending encode time, whether a file is worth compressing.

use crate::policy::ExportSettings;
use crate::probe::VideoProbe;
use serde::{Deserialize, Serialize};

/// Megabytes per second of stream at 1 Mbps.
const MB_PER_MBPS_SECOND: f64 = 0.125;

/// Predicted output size for one file, alongside the measured input size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeEstimate {
    /// Predicted output size in MB.
    pub predicted_mb: f64,
    /// Measured input size in MB.
    pub input_mb: f64,
    /// Carried over from the export settings: true when the bitrate is the
    /// policy fallback and the prediction is meaningless.
    pub fallback: bool,
}

impl SizeEstimate {
    /// Predicted size reduction as a percentage of the input size.
    ///
    /// Negative when the prediction exceeds the input. A zero-sized input
    /// reports 0% rather than dividing by zero.
    pub fn savings_percent(&self) -> f64 {
        if self.input_mb <= 0.0 {
            return 0.0;
        }
        (1.0 - self.predicted_mb / self.input_mb) * 100.0
    }

    /// Whether the predicted savings clear the configured threshold.
    ///
    /// Fallback estimates never qualify, whatever the arithmetic says.
    pub fn is_worthwhile(&self, min_ratio_percent: f32) -> bool {
        !self.fallback && self.savings_percent() >= min_ratio_percent as f64
    }
}

/// Predicts the output size for a probed video at the decided settings.
pub fn estimate_output_size(probe: &VideoProbe, settings: &ExportSettings) -> SizeEstimate {
    SizeEstimate {
        predicted_mb: settings.bitrate_mbps * probe.duration_secs * MB_PER_MBPS_SECOND,
        input_mb: probe.size_mb(),
        fallback: settings.fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FALLBACK_BITRATE_MBPS;
    use proptest::prelude::*;

    fn make_probe(duration_secs: f64, size_bytes: u64) -> VideoProbe {
        VideoProbe {
            codec: "hevc".to_string(),
            width: 3840,
            height: 2160,
            frame_rate: 30.0,
            bitrate_mbps: Some(50.0),
            duration_secs,
            size_bytes,
            rating: None,
            modified_at: std::time::SystemTime::UNIX_EPOCH,
            sentinel: false,
        }
    }

    fn settings(bitrate_mbps: f64, fallback: bool) -> ExportSettings {
        ExportSettings {
            bitrate_mbps,
            codec: "vt_h265".to_string(),
            fallback,
        }
    }

    #[test]
    fn test_estimate_4k30_scenario() {
        // 500 MB input, 40 s, target 25 Mbps: 25 * 40 * 0.125 = 125 MB,
        // a 75% predicted saving.
        let probe = make_probe(40.0, 500_000_000);
        let estimate = estimate_output_size(&probe, &settings(25.0, false));

        assert!((estimate.predicted_mb - 125.0).abs() < 1e-9);
        assert!((estimate.input_mb - 500.0).abs() < 1e-9);
        assert!((estimate.savings_percent() - 75.0).abs() < 1e-9);
        assert!(estimate.is_worthwhile(10.0));
    }

    #[test]
    fn test_savings_threshold() {
        // 100 MB input predicted down to 95 MB: 5% savings, below a 10%
        // threshold but above 4%.
        let probe = make_probe(80.0, 100_000_000);
        let estimate = estimate_output_size(&probe, &settings(9.5, false));

        assert!((estimate.savings_percent() - 5.0).abs() < 1e-6);
        assert!(!estimate.is_worthwhile(10.0));
        assert!(estimate.is_worthwhile(4.0));
    }

    #[test]
    fn test_negative_savings() {
        // Prediction larger than the input.
        let probe = make_probe(100.0, 10_000_000);
        let estimate = estimate_output_size(&probe, &settings(8.0, false));

        assert!(estimate.savings_percent() < 0.0);
        assert!(!estimate.is_worthwhile(10.0));
    }

    #[test]
    fn test_fallback_never_worthwhile() {
        let probe = make_probe(40.0, 500_000_000);
        // Even with arithmetic that would clear any threshold.
        let estimate = estimate_output_size(&probe, &settings(0.001, true));

        assert!(estimate.savings_percent() > 99.0);
        assert!(!estimate.is_worthwhile(10.0));
    }

    #[test]
    fn test_sentinel_probe_degenerate_estimate() {
        // The placeholder record with the fallback bitrate yields a
        // prediction vastly larger than its 1-byte "input".
        let estimate = estimate_output_size(
            &VideoProbe::sentinel(),
            &settings(FALLBACK_BITRATE_MBPS, true),
        );

        assert!(estimate.predicted_mb > 100.0);
        assert!(estimate.input_mb < 1e-3);
        assert!(!estimate.is_worthwhile(0.0));
    }

    #[test]
    fn test_zero_duration() {
        let estimate = estimate_output_size(&make_probe(0.0, 100_000_000), &settings(25.0, false));
        assert!((estimate.predicted_mb).abs() < f64::EPSILON);
        assert!((estimate.savings_percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_size_input() {
        let estimate = estimate_output_size(&make_probe(10.0, 0), &settings(5.0, false));
        assert!((estimate.savings_percent()).abs() < f64::EPSILON);
        assert!(!estimate.is_worthwhile(10.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // The prediction scales linearly with both bitrate and duration
        // and is never negative.
        #[test]
        fn prop_estimate_linear_and_nonnegative(
            bitrate in 0.0f64..1000.0,
            duration in 0.0f64..100_000.0,
            size in 1u64..1_000_000_000_000,
        ) {
            let probe = make_probe(duration, size);
            let estimate = estimate_output_size(&probe, &settings(bitrate, false));

            prop_assert!(estimate.predicted_mb >= 0.0);
            prop_assert!(
                (estimate.predicted_mb - bitrate * duration * 0.125).abs() < 1e-6
            );

            let doubled = estimate_output_size(&probe, &settings(bitrate * 2.0, false));
            prop_assert!(doubled.predicted_mb >= estimate.predicted_mb);
        }

        // Worthwhile implies the non-fallback path and positive headroom.
        #[test]
        fn prop_worthwhile_implies_savings(
            bitrate in 0.1f64..200.0,
            duration in 1.0f64..10_000.0,
            size in 1_000_000u64..1_000_000_000_000,
            threshold in 0.0f32..100.0,
        ) {
            let probe = make_probe(duration, size);
            let estimate = estimate_output_size(&probe, &settings(bitrate, false));

            if estimate.is_worthwhile(threshold) {
                prop_assert!(estimate.predicted_mb < estimate.input_mb);
            }
        }
    }
}
