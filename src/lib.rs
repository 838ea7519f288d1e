//! Shot Sensing Engine Library
//!
//! Turns a phone's motion-magnitude and sound-level feeds into clay-target
//! shooting events: the start of a session, each accepted shot, and the
//! outcome of every target (hit on the first shot, hit on the second shot,
//! or a miss flagged by tapping the stock).
//!
//! # Design Philosophy
//!
//! - **Two sensors or nothing**: a motion spike is only a shot when a loud
//!   sound happened right next to it.
//! - **Timers are owned**: every timer the detector schedules is cancelled
//!   when its phase ends, and a late firing from a superseded phase is
//!   ignored.
//! - **Clock agnostic**: the same state machine runs on a virtual clock for
//!   replay and FFI, or on tokio for a live host.
//!
//! # Example
//!
//! ```
//! use shot_sensing::pipeline::ShotPipeline;
//! use shot_sensing::types::{MotionSample, Outcome, SoundSample};
//!
//! let mut pipeline = ShotPipeline::with_defaults();
//! pipeline.activate_at(0);
//! pipeline.push_sound(SoundSample::new(0, -5.0));
//! pipeline.push_motion(MotionSample::new(10, 12.0));
//!
//! let events = pipeline.advance_to(5_000);
//! assert_eq!(events[0].event.outcome(), Some(Outcome::HitFirstShot));
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod pipeline;
pub mod replay;
pub mod round;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod shot_detection;
pub mod timers;
pub mod types;

#[cfg(test)]
mod stress_tests;

// Re-export commonly used types
pub use config::DetectorConfig;
pub use error::{ConfigError, ReplayError, RoundError, RuntimeError, SensorError};
pub use pipeline::{ShotPipeline, TimedEvent};
pub use round::Round;
pub use shot_detection::ShotDetector;
pub use timers::{TimerService, VirtualTimers};
pub use types::{
    DetectorEvent, DetectorPhase, MotionSample, Outcome, SensorStream, SoundSample, TargetOutcome,
};
