/// Deterministic shot detection pipeline.
///
/// Drives a [`ShotDetector`] on a virtual clock taken from the sample
/// timestamps themselves, so a recorded session always replays to the same
/// events.
///
/// # Ordering
///
/// Before an input stamped `t` is handled, every timer due at or before `t`
/// fires in due order, with the clock set to each timer's due time. A timer
/// due exactly at `t` therefore wins over the sample at `t`. An input stamped
/// earlier than the clock never moves the clock back.
///
/// Every event comes back as a [`TimedEvent`] carrying the virtual time at
/// which it was emitted.
use serde::Serialize;
use tracing::trace;

use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::shot_detection::ShotDetector;
use crate::timers::VirtualTimers;
use crate::types::*;

/// An event together with the virtual time it was emitted at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: DetectorEvent,
}

/// Shot detector bound to a virtual clock.
#[derive(Debug)]
pub struct ShotPipeline {
    detector: ShotDetector<VirtualTimers>,

    // Counters
    total_samples: usize,
    events_emitted: usize,
}

impl ShotPipeline {
    /// Creates a pipeline with a validated configuration.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_detector(ShotDetector::new(
            config,
            VirtualTimers::new(),
        )?))
    }

    /// Creates a pipeline with the default configuration.
    pub fn with_defaults() -> Self {
        Self::from_detector(ShotDetector::with_defaults(VirtualTimers::new()))
    }

    fn from_detector(detector: ShotDetector<VirtualTimers>) -> Self {
        Self {
            detector,
            total_samples: 0,
            events_emitted: 0,
        }
    }

    /// Processes one motion sample.
    pub fn push_motion(&mut self, sample: MotionSample) -> Vec<TimedEvent> {
        let mut events = self.advance_to(sample.timestamp_ms);
        self.total_samples += 1;
        let at_ms = self.now_ms();
        if let Some(event) = self.detector.on_motion_sample(sample) {
            events.push(self.stamp(at_ms, event));
        }
        events
    }

    /// Processes one sound sample. Only timers can produce events here.
    pub fn push_sound(&mut self, sample: SoundSample) -> Vec<TimedEvent> {
        let events = self.advance_to(sample.timestamp_ms);
        self.total_samples += 1;
        self.detector.on_sound_sample(sample);
        events
    }

    /// Fires every timer due at or before `t_ms` and moves the clock to it.
    pub fn advance_to(&mut self, t_ms: u64) -> Vec<TimedEvent> {
        let mut events = Vec::new();
        while let Some((due, fired)) = self.detector.timers_mut().pop_due(t_ms) {
            trace!(due, kind = fired.token.kind.as_str(), "timer due");
            if let Some(event) = self.detector.on_timer(fired) {
                events.push(self.stamp(due, event));
            }
        }
        self.detector.timers_mut().set_now(t_ms);
        events
    }

    /// Starts a session at `t_ms` without the tap gesture.
    pub fn activate_at(&mut self, t_ms: u64) -> Vec<TimedEvent> {
        let events = self.advance_to(t_ms);
        self.detector.activate();
        events
    }

    /// Ends the session at `t_ms`. Anything still pending is discarded.
    pub fn deactivate_at(&mut self, t_ms: u64) -> Vec<TimedEvent> {
        let events = self.advance_to(t_ms);
        self.detector.deactivate();
        events
    }

    /// Replaces the detector configuration.
    pub fn configure(&mut self, config: DetectorConfig) -> Result<(), ConfigError> {
        self.detector.configure(config)
    }

    /// Reports a stream that could not be subscribed.
    pub fn sensor_unavailable(&mut self, stream: SensorStream) -> Option<TimedEvent> {
        let at_ms = self.now_ms();
        self.detector
            .sensor_unavailable(stream)
            .map(|event| self.stamp(at_ms, event))
    }

    /// Accept input again after a capability error.
    pub fn sensors_restored(&mut self) {
        self.detector.sensors_restored();
    }

    /// Current virtual time.
    pub fn now_ms(&self) -> u64 {
        self.detector.timers().now_ms()
    }

    pub fn phase(&self) -> DetectorPhase {
        self.detector.phase()
    }

    pub fn detector(&self) -> &ShotDetector<VirtualTimers> {
        &self.detector
    }

    /// Total samples handed to the pipeline.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Total events returned so far.
    pub fn events_emitted(&self) -> usize {
        self.events_emitted
    }

    fn stamp(&mut self, at_ms: u64, event: DetectorEvent) -> TimedEvent {
        self.events_emitted += 1;
        TimedEvent { at_ms, event }
    }
}
