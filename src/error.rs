//! Error types for the shot sensing engine.
//!
//! Sample and timer handlers never fail: they either emit events or do
//! nothing. Errors only surface from configuration, sensor subscription,
//! scorecard bookkeeping and trace replay.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SensorStream;

/// A rejected detector configuration. The previous configuration stays in force.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A threshold is NaN or infinite.
    #[error("threshold `{name}` must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f32 },

    /// A window, delay or timeout is zero.
    #[error("window `{name}` must be positive")]
    NonPositiveWindow { name: &'static str },

    /// A gesture count is zero.
    #[error("count `{name}` must be at least 1")]
    ZeroCount { name: &'static str },

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The configuration document is not valid JSON for `DetectorConfig`.
    #[error("invalid config document: {0}")]
    Parse(String),
}

/// A sensor stream could not be obtained.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The platform refused access (e.g. microphone permission).
    #[error("{} stream permission denied", .0.as_str())]
    PermissionDenied(SensorStream),

    /// The device has no such sensor.
    #[error("{} sensor not present", .0.as_str())]
    NotPresent(SensorStream),

    /// The source was already subscribed once and cannot hand out another feed.
    #[error("{} source already subscribed", .0.as_str())]
    AlreadySubscribed(SensorStream),
}

impl SensorError {
    /// The stream this error refers to.
    pub fn stream(&self) -> SensorStream {
        match self {
            SensorError::PermissionDenied(stream)
            | SensorError::NotPresent(stream)
            | SensorError::AlreadySubscribed(stream) => *stream,
        }
    }
}

/// Scorecard bookkeeping errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoundError {
    /// Every target of the round already has a result.
    #[error("round is complete ({0} targets recorded)")]
    RoundComplete(usize),

    /// A round needs at least one target.
    #[error("round must have at least one target")]
    EmptyRound,

    /// Scorecard JSON could not be produced or parsed.
    #[error("invalid scorecard JSON: {0}")]
    Json(String),
}

/// Errors reported by the async detector host.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// The detector task has shut down.
    #[error("detector task has stopped")]
    Stopped,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while replaying a recorded sensor trace.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A trace line is not a valid record.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Round(#[from] RoundError),

    /// Output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}
