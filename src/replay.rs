//! Recorded-session replay.
//!
//! A trace is a JSON-lines file, one record per line:
//!
//! ```text
//! {"activate":{"t":0}}
//! {"sound":{"level":-5.0,"t":0}}
//! {"motion":{"magnitude":12.0,"t":10}}
//! {"advance":{"t":4000}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Replay feeds the
//! records through a [`ShotPipeline`] in file order and scores every outcome
//! into a [`Round`].

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::error::{ConfigError, ReplayError};
use crate::pipeline::{ShotPipeline, TimedEvent};
use crate::round::Round;
use crate::types::{DetectorEvent, MotionSample, SoundSample};

/// One line of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceRecord {
    Motion(MotionSample),
    Sound(SoundSample),
    Activate { t: u64 },
    Deactivate { t: u64 },
    /// Lets pending timers run without a sample.
    Advance { t: u64 },
}

impl TraceRecord {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            TraceRecord::Motion(sample) => sample.timestamp_ms,
            TraceRecord::Sound(sample) => sample.timestamp_ms,
            TraceRecord::Activate { t }
            | TraceRecord::Deactivate { t }
            | TraceRecord::Advance { t } => *t,
        }
    }
}

/// Parses a trace from any buffered reader.
pub fn parse_trace(reader: impl BufRead) -> Result<Vec<TraceRecord>, ReplayError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| ReplayError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| ReplayError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Reads and parses a trace file.
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>, ReplayError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(std::io::BufReader::new(file))
}

/// Result of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub events: Vec<TimedEvent>,
    pub round: Round,
    /// Outcomes that arrived after the round was already complete.
    pub unscored: usize,
    pub samples: usize,
}

/// Feeds trace records through a pipeline and keeps the scorecard.
#[derive(Debug)]
pub struct Replayer {
    pipeline: ShotPipeline,
    round: Round,
    events: Vec<TimedEvent>,
    unscored: usize,
}

impl Replayer {
    pub fn new(config: DetectorConfig, round: Round) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline: ShotPipeline::new(config)?,
            round,
            events: Vec::new(),
            unscored: 0,
        })
    }

    /// Applies one record and returns the events it produced.
    pub fn apply(&mut self, record: &TraceRecord) -> Vec<TimedEvent> {
        let events = match *record {
            TraceRecord::Motion(sample) => self.pipeline.push_motion(sample),
            TraceRecord::Sound(sample) => self.pipeline.push_sound(sample),
            TraceRecord::Activate { t } => self.pipeline.activate_at(t),
            TraceRecord::Deactivate { t } => self.pipeline.deactivate_at(t),
            TraceRecord::Advance { t } => self.pipeline.advance_to(t),
        };

        for timed in &events {
            if let DetectorEvent::Outcome(target) = &timed.event {
                if let Err(err) = self.round.record_detected(target) {
                    warn!(at_ms = timed.at_ms, error = %err, "outcome not scored");
                    self.unscored += 1;
                }
            }
        }
        self.events.extend(events.iter().cloned());
        events
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn pipeline(&self) -> &ShotPipeline {
        &self.pipeline
    }

    pub fn finish(self) -> ReplayReport {
        info!(
            score = self.round.score(),
            targets = self.round.results().len(),
            events = self.events.len(),
            "replay finished"
        );
        ReplayReport {
            samples: self.pipeline.total_samples(),
            events: self.events,
            round: self.round,
            unscored: self.unscored,
        }
    }
}

/// Replays a whole trace.
pub fn replay(
    records: &[TraceRecord],
    config: DetectorConfig,
    round: Round,
) -> Result<ReplayReport, ReplayError> {
    let mut replayer = Replayer::new(config, round)?;
    for record in records {
        replayer.apply(record);
    }
    Ok(replayer.finish())
}
