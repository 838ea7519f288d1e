//! Core data types for the shot sensing engine.
//!
//! This module defines the samples the detector ingests, the phases it moves
//! through, and the events it emits. Everything that crosses a module boundary
//! gets a type here; raw tuples never leave a function.
//!
//! Timestamps are monotonic milliseconds supplied by the sensor feeds. The
//! engine never reads a wall clock on its own.

use serde::{Deserialize, Serialize};

/// A single motion-magnitude sample.
///
/// The motion feed reports the magnitude of the 3-axis accelerometer vector.
/// Sources that deliver raw axes can use [`MotionSample::from_axes`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Monotonic timestamp in milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: u64,

    /// Magnitude of the acceleration vector, in the feed's units.
    pub magnitude: f32,
}

impl MotionSample {
    /// Creates a motion sample from a precomputed magnitude.
    pub fn new(timestamp_ms: u64, magnitude: f32) -> Self {
        Self {
            timestamp_ms,
            magnitude,
        }
    }

    /// Creates a motion sample from raw accelerometer axes.
    pub fn from_axes(timestamp_ms: u64, accel: [f32; 3]) -> Self {
        let x2 = accel[0] * accel[0];
        let y2 = accel[1] * accel[1];
        let z2 = accel[2] * accel[2];
        Self::new(timestamp_ms, (x2 + y2 + z2).sqrt())
    }

    /// Non-finite magnitudes are discarded by the detector.
    pub fn is_well_formed(&self) -> bool {
        self.magnitude.is_finite()
    }
}

/// A single sound-level sample from the periodic level feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundSample {
    /// Monotonic timestamp in milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: u64,

    /// Sound level (typically dBFS, so usually negative).
    pub level: f32,
}

impl SoundSample {
    pub fn new(timestamp_ms: u64, level: f32) -> Self {
        Self {
            timestamp_ms,
            level,
        }
    }

    /// Non-finite levels are discarded by the detector.
    pub fn is_well_formed(&self) -> bool {
        self.level.is_finite()
    }
}

/// The two sensor feeds the detector depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStream {
    /// Accelerometer magnitude feed.
    Motion,
    /// Microphone level feed.
    Sound,
}

impl SensorStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStream::Motion => "motion",
            SensorStream::Sound => "sound",
        }
    }
}

/// Phase of the per-target state machine.
///
/// Resolution is transient: the detector emits the outcome and re-enters
/// `AwaitingFirstShot` (session active) or `Idle` in the same update, so it
/// never shows up as a stored phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorPhase {
    /// Session inactive. Only the start gesture is listened for.
    Idle,
    /// Session active, no shot accepted yet for this target.
    AwaitingFirstShot,
    /// One shot accepted; the first-shot timeout is running.
    AwaitingSecondShot,
    /// Two shots accepted; waiting before miss taps are counted.
    MissWindowPending,
    /// Miss taps are being counted until the window closes.
    MissWindowOpen,
}

impl DetectorPhase {
    /// True for every phase that belongs to an active session.
    pub fn is_active(&self) -> bool {
        !matches!(self, DetectorPhase::Idle)
    }

    /// True when a correlated motion spike may be accepted as a shot.
    pub fn accepts_shots(&self) -> bool {
        matches!(
            self,
            DetectorPhase::AwaitingFirstShot | DetectorPhase::AwaitingSecondShot
        )
    }
}

/// Final result of one target attempt.
///
/// Serialized with the scorecard tags used by the field app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Target broken with the first shot.
    #[serde(rename = "acierto1", alias = "hit_first_shot")]
    HitFirstShot,
    /// Target broken with the second shot.
    #[serde(rename = "acierto2", alias = "hit_second_shot")]
    HitSecondShot,
    /// Both shots missed.
    #[serde(rename = "fallo", alias = "miss")]
    Miss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::HitFirstShot => "hit-on-first-shot",
            Outcome::HitSecondShot => "hit-on-second-shot",
            Outcome::Miss => "miss",
        }
    }

    /// Whether the target counts towards the score.
    pub fn is_hit(&self) -> bool {
        !matches!(self, Outcome::Miss)
    }

    /// Number of shots fired at the target.
    pub fn shots_fired(&self) -> u8 {
        match self {
            Outcome::HitFirstShot => 1,
            Outcome::HitSecondShot | Outcome::Miss => 2,
        }
    }
}

/// Outcome of a resolved attempt together with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub outcome: Outcome,
    /// Timestamp of the first accepted shot.
    pub first_shot_ms: Option<u64>,
    /// Timestamp of the second accepted shot.
    pub second_shot_ms: Option<u64>,
    /// Miss taps counted while the window was open.
    pub miss_taps: u32,
}

impl TargetOutcome {
    /// Builds an outcome from the accepted shot timestamps.
    pub fn from_shots(outcome: Outcome, shots: &[u64], miss_taps: u32) -> Self {
        Self {
            outcome,
            first_shot_ms: shots.first().copied(),
            second_shot_ms: shots.get(1).copied(),
            miss_taps,
        }
    }
}

/// Events emitted by the shot detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DetectorEvent {
    /// The start gesture activated a session.
    SessionStarted,
    /// A correlated motion spike was accepted as shot 1 or 2.
    ShotAccepted { shot: u8, at_ms: u64 },
    /// A miss tap was counted but the miss is not confirmed yet.
    MissTap { count: u32, at_ms: u64 },
    /// A target attempt resolved.
    Outcome(TargetOutcome),
    /// A required stream could not be subscribed.
    SensorUnavailable { stream: SensorStream },
}

impl DetectorEvent {
    /// The resolved outcome, if this is an outcome event.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            DetectorEvent::Outcome(target) => Some(target.outcome),
            _ => None,
        }
    }

    /// Vibration on/off pattern (ms) a consumer may play for this event.
    pub fn haptic_pattern(&self) -> &'static [u64] {
        match self {
            DetectorEvent::SessionStarted => &[600, 300, 600, 300, 600, 300],
            DetectorEvent::Outcome(target) => match target.outcome {
                Outcome::HitFirstShot => &[400, 300, 400, 300],
                Outcome::HitSecondShot => &[400, 300, 400, 300, 400, 300, 400, 300],
                Outcome::Miss => &[80, 80, 80, 80, 80, 80, 80, 80],
            },
            DetectorEvent::ShotAccepted { .. } => &[150],
            DetectorEvent::MissTap { .. } => &[50],
            DetectorEvent::SensorUnavailable { .. } => &[],
        }
    }

    /// True for the terminal per-target event.
    pub fn is_outcome(&self) -> bool {
        matches!(self, DetectorEvent::Outcome(_))
    }
}
