//! Detector configuration.
//!
//! All thresholds are compared against raw sensor values; all windows are
//! milliseconds. Configuration files are JSON and may name only the fields
//! they want to override.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for shot detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Sound level above which a sample counts as a sound event.
    pub sound_threshold: f32,
    /// Motion magnitude above which a spike may be a shot.
    pub motion_shot_threshold: f32,
    /// Motion magnitude above which a spike counts as a deliberate tap.
    pub motion_tap_threshold: f32,

    /// Maximum distance between a motion spike and the last sound event (ms).
    pub correlation_window_ms: u64,
    /// Minimum spacing between two accepted shots (ms).
    pub shot_debounce_ms: u64,

    /// Taps needed to start a session from idle.
    pub start_tap_count: u32,
    /// Window in which the start taps must land (ms).
    pub start_tap_window_ms: u64,

    /// How long to wait for a second shot before scoring a first-shot hit (ms).
    pub first_shot_timeout_ms: u64,
    /// Delay after the second shot before miss taps are counted (ms).
    pub miss_window_delay_ms: u64,
    /// How long miss taps are counted (ms).
    pub miss_window_duration_ms: u64,
    /// Taps needed to flag a miss.
    pub miss_tap_count: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sound_threshold: -10.0,      // dBFS
            motion_shot_threshold: 10.0, // recoil
            motion_tap_threshold: 15.0,  // sharp knock on the stock
            correlation_window_ms: 200,
            shot_debounce_ms: 500,
            start_tap_count: 3,
            start_tap_window_ms: 1000,
            first_shot_timeout_ms: 3000,
            miss_window_delay_ms: 2000,
            miss_window_duration_ms: 5000,
            miss_tap_count: 2,
        }
    }
}

impl DetectorConfig {
    /// Checks every field. The first offending field is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("sound_threshold", self.sound_threshold),
            ("motion_shot_threshold", self.motion_shot_threshold),
            ("motion_tap_threshold", self.motion_tap_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteThreshold { name, value });
            }
        }

        let windows = [
            ("correlation_window_ms", self.correlation_window_ms),
            ("shot_debounce_ms", self.shot_debounce_ms),
            ("start_tap_window_ms", self.start_tap_window_ms),
            ("first_shot_timeout_ms", self.first_shot_timeout_ms),
            ("miss_window_delay_ms", self.miss_window_delay_ms),
            ("miss_window_duration_ms", self.miss_window_duration_ms),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(ConfigError::NonPositiveWindow { name });
            }
        }

        if self.start_tap_count == 0 {
            return Err(ConfigError::ZeroCount {
                name: "start_tap_count",
            });
        }
        if self.miss_tap_count == 0 {
            return Err(ConfigError::ZeroCount {
                name: "miss_tap_count",
            });
        }

        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Total time from the second shot until a second-shot hit is scored.
    pub fn second_shot_resolution_ms(&self) -> u64 {
        self.miss_window_delay_ms + self.miss_window_duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.correlation_window_ms, 200);
        assert_eq!(config.shot_debounce_ms, 500);
        assert_eq!(config.start_tap_count, 3);
        assert_eq!(config.start_tap_window_ms, 1000);
        assert_eq!(config.first_shot_timeout_ms, 3000);
        assert_eq!(config.miss_tap_count, 2);
        assert_eq!(config.second_shot_resolution_ms(), 7000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = DetectorConfig {
            miss_window_duration_ms: 0,
            ..DetectorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveWindow {
                name: "miss_window_duration_ms"
            })
        );
    }

    #[test]
    fn test_rejects_non_finite_threshold() {
        let config = DetectorConfig {
            motion_tap_threshold: f32::NAN,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteThreshold {
                name: "motion_tap_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_counts() {
        let config = DetectorConfig {
            start_tap_count: 0,
            ..DetectorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCount {
                name: "start_tap_count"
            })
        );
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            DetectorConfig::from_json_str(r#"{"sound_threshold": -20.0, "miss_tap_count": 3}"#)
                .unwrap();
        assert_eq!(config.sound_threshold, -20.0);
        assert_eq!(config.miss_tap_count, 3);
        assert_eq!(config.first_shot_timeout_ms, 3000);
    }

    #[test]
    fn test_json_validation_applies() {
        let err = DetectorConfig::from_json_str(r#"{"shot_debounce_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveWindow { .. }));

        let err = DetectorConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DetectorConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
