//! Shot Event Detection Module.
//!
//! Fuses the motion-magnitude feed and the sound-level feed into per-target
//! outcomes:
//! - Start gesture: a burst of taps while idle starts a session
//! - Shot acceptance: a motion spike close to the latest sound event
//! - Debounce: one physical report never counts as two shots
//! - Miss confirmation: taps after the second shot flag a miss
//!
//! The detector owns every timer it schedules. Each outstanding timer lives
//! in a slot as a handle plus the epoch token it was scheduled under, and a
//! firing only takes effect when both still match. The epoch advances on
//! every phase change, resolution and deactivation.

use tracing::{debug, info, trace, warn};

use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::timers::{FiredTimer, TimerHandle, TimerKind, TimerService, TimerToken};
use crate::types::{
    DetectorEvent, DetectorPhase, MotionSample, Outcome, SensorStream, SoundSample,
    TargetOutcome,
};

/// State of the target currently being attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorState {
    pub phase: DetectorPhase,
    /// Timestamp of the latest sound sample above threshold.
    pub last_sound_event_ms: Option<u64>,
    /// Accepted shots, at most two, strictly increasing.
    pub shot_timestamps: Vec<u64>,
    /// Miss taps counted in the open window.
    pub tap_count: u32,
    /// Used for the shot debounce.
    pub last_accepted_shot_ms: Option<u64>,
    /// Start taps counted while idle.
    pub start_tap_count: u32,
    /// Invalidates timers scheduled under a superseded state.
    pub epoch: u64,
}

impl DetectorState {
    fn new(epoch: u64) -> Self {
        Self {
            phase: DetectorPhase::Idle,
            last_sound_event_ms: None,
            shot_timestamps: Vec::with_capacity(2),
            tap_count: 0,
            last_accepted_shot_ms: None,
            start_tap_count: 0,
            epoch,
        }
    }
}

/// A timer the detector is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outstanding {
    handle: TimerHandle,
    token: TimerToken,
}

/// Timer-driven shot event detector.
#[derive(Debug)]
pub struct ShotDetector<T: TimerService> {
    config: DetectorConfig,
    timers: T,
    state: DetectorState,

    // Session flag: where a resolved attempt returns to
    session_active: bool,

    // Timer slots
    start_tap_timer: Option<Outstanding>,
    first_shot_timer: Option<Outstanding>,
    // Delay and duration run back to back and share one slot
    miss_timer: Option<Outstanding>,

    // Capability tracking
    unavailable: Vec<SensorStream>,

    // Statistics
    outcomes_emitted: u64,
    samples_discarded: u64,
}

impl<T: TimerService> ShotDetector<T> {
    /// Create a detector with a validated configuration.
    pub fn new(config: DetectorConfig, timers: T) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, timers))
    }

    /// Create a detector with the default configuration.
    pub fn with_defaults(timers: T) -> Self {
        Self::build(DetectorConfig::default(), timers)
    }

    fn build(config: DetectorConfig, timers: T) -> Self {
        Self {
            config,
            timers,
            state: DetectorState::new(0),
            session_active: false,
            start_tap_timer: None,
            first_shot_timer: None,
            miss_timer: None,
            unavailable: Vec::new(),
            outcomes_emitted: 0,
            samples_discarded: 0,
        }
    }

    pub fn phase(&self) -> DetectorPhase {
        self.state.phase
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    /// Whether a session is running (explicitly or via the start gesture).
    pub fn is_session_active(&self) -> bool {
        self.session_active
    }

    /// Whether a capability error is holding the detector in idle.
    pub fn is_capability_lost(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// Number of timers the detector is currently waiting on.
    pub fn outstanding_timers(&self) -> usize {
        [self.start_tap_timer, self.first_shot_timer, self.miss_timer]
            .iter()
            .flatten()
            .count()
    }

    /// Total outcomes emitted since creation.
    pub fn outcomes_emitted(&self) -> u64 {
        self.outcomes_emitted
    }

    /// Total malformed samples dropped since creation.
    pub fn samples_discarded(&self) -> u64 {
        self.samples_discarded
    }

    // =========================================================================
    // SESSION CONTROL
    // =========================================================================

    /// Replace the configuration. An invalid configuration is rejected and
    /// the current one stays in force.
    ///
    /// A successful reconfiguration also clears any capability error, since
    /// the host is expected to resubscribe afterwards. Timers already running
    /// keep the delay they were scheduled with.
    pub fn configure(&mut self, config: DetectorConfig) -> Result<(), ConfigError> {
        if let Err(err) = config.validate() {
            warn!(error = %err, "rejected detector configuration");
            return Err(err);
        }
        self.config = config;
        self.unavailable.clear();
        debug!("detector reconfigured");
        Ok(())
    }

    /// Start a session without the tap gesture.
    pub fn activate(&mut self) {
        if self.is_capability_lost() {
            trace!("activate ignored: sensor capability lost");
            return;
        }
        if self.session_active {
            return;
        }
        self.cancel_slot(TimerKind::StartTapWindow);
        self.state.start_tap_count = 0;
        self.session_active = true;
        self.enter(DetectorPhase::AwaitingFirstShot);
        info!("session activated");
    }

    /// End the session. Cancels every timer and discards the partial attempt
    /// without emitting an outcome.
    pub fn deactivate(&mut self) {
        self.cancel_all_timers();
        self.session_active = false;
        self.reset_attempt();
        self.state.phase = DetectorPhase::Idle;
        self.bump_epoch();
        debug!(epoch = self.state.epoch, "session deactivated");
    }

    /// Report that a required stream could not be subscribed.
    ///
    /// Signals once per stream. The detector drops to idle and ignores all
    /// input until [`configure`](Self::configure) or
    /// [`sensors_restored`](Self::sensors_restored).
    pub fn sensor_unavailable(&mut self, stream: SensorStream) -> Option<DetectorEvent> {
        if self.unavailable.contains(&stream) {
            return None;
        }
        warn!(stream = stream.as_str(), "sensor stream unavailable");
        self.deactivate();
        self.unavailable.push(stream);
        Some(DetectorEvent::SensorUnavailable { stream })
    }

    /// The host resubscribed successfully; accept input again.
    pub fn sensors_restored(&mut self) {
        if !self.unavailable.is_empty() {
            debug!("sensor streams restored");
        }
        self.unavailable.clear();
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// Process a motion-magnitude sample.
    pub fn on_motion_sample(&mut self, sample: MotionSample) -> Option<DetectorEvent> {
        if !sample.is_well_formed() {
            self.samples_discarded += 1;
            trace!(t = sample.timestamp_ms, "discarded non-finite motion sample");
            return None;
        }
        if self.is_capability_lost() {
            return None;
        }

        match self.state.phase {
            DetectorPhase::Idle => self.count_start_tap(sample),
            DetectorPhase::MissWindowOpen => self.count_miss_tap(sample),
            phase if phase.accepts_shots() => self.try_accept_shot(sample),
            _ => None,
        }
    }

    /// Process a sound-level sample. Only the latest qualifying timestamp is
    /// kept; nothing is counted.
    pub fn on_sound_sample(&mut self, sample: SoundSample) {
        if !sample.is_well_formed() {
            self.samples_discarded += 1;
            trace!(t = sample.timestamp_ms, "discarded non-finite sound sample");
            return;
        }
        if self.is_capability_lost() || !self.state.phase.is_active() {
            return;
        }
        if sample.level > self.config.sound_threshold {
            self.state.last_sound_event_ms = Some(sample.timestamp_ms);
        }
    }

    /// Deliver a fired timer. Stale firings are ignored.
    pub fn on_timer(&mut self, fired: FiredTimer) -> Option<DetectorEvent> {
        if !self.is_current(fired) {
            trace!(
                kind = fired.token.kind.as_str(),
                timer_epoch = fired.token.epoch,
                epoch = self.state.epoch,
                "ignored stale timer"
            );
            return None;
        }

        match fired.token.kind {
            TimerKind::StartTapWindow => {
                self.start_tap_timer = None;
                trace!(taps = self.state.start_tap_count, "start tap window lapsed");
                self.state.start_tap_count = 0;
                None
            }
            TimerKind::FirstShotTimeout => {
                self.first_shot_timer = None;
                Some(self.resolve(Outcome::HitFirstShot))
            }
            TimerKind::MissWindowDelay => {
                self.miss_timer = None;
                self.enter(DetectorPhase::MissWindowOpen);
                self.state.tap_count = 0;
                self.arm(TimerKind::MissWindowDuration, self.config.miss_window_duration_ms);
                None
            }
            TimerKind::MissWindowDuration => {
                self.miss_timer = None;
                Some(self.resolve(Outcome::HitSecondShot))
            }
        }
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn count_start_tap(&mut self, sample: MotionSample) -> Option<DetectorEvent> {
        if sample.magnitude <= self.config.motion_tap_threshold {
            return None;
        }

        self.state.start_tap_count += 1;
        if self.state.start_tap_count == 1 {
            self.cancel_slot(TimerKind::StartTapWindow);
            self.arm(TimerKind::StartTapWindow, self.config.start_tap_window_ms);
        }
        trace!(
            t = sample.timestamp_ms,
            taps = self.state.start_tap_count,
            "start tap"
        );

        if self.state.start_tap_count < self.config.start_tap_count {
            return None;
        }

        self.cancel_slot(TimerKind::StartTapWindow);
        self.state.start_tap_count = 0;
        self.session_active = true;
        self.enter(DetectorPhase::AwaitingFirstShot);
        info!(t = sample.timestamp_ms, "session started by tap gesture");
        Some(DetectorEvent::SessionStarted)
    }

    fn try_accept_shot(&mut self, sample: MotionSample) -> Option<DetectorEvent> {
        if sample.magnitude <= self.config.motion_shot_threshold {
            return None;
        }
        let now = sample.timestamp_ms;

        // Only sounds processed before the spike can confirm it.
        let correlated = self
            .state
            .last_sound_event_ms
            .is_some_and(|sound| now.abs_diff(sound) < self.config.correlation_window_ms);
        if !correlated {
            return None;
        }

        if let Some(last) = self.state.last_accepted_shot_ms {
            if now.saturating_sub(last) < self.config.shot_debounce_ms {
                trace!(t = now, last, "shot debounced");
                return None;
            }
        }

        self.state.last_accepted_shot_ms = Some(now);
        self.state.shot_timestamps.push(now);
        let number = self.state.shot_timestamps.len() as u8;
        debug!(t = now, shot = number, "shot accepted");

        if number == 1 {
            self.enter(DetectorPhase::AwaitingSecondShot);
            self.arm(TimerKind::FirstShotTimeout, self.config.first_shot_timeout_ms);
        } else {
            self.cancel_slot(TimerKind::FirstShotTimeout);
            self.enter(DetectorPhase::MissWindowPending);
            self.arm(TimerKind::MissWindowDelay, self.config.miss_window_delay_ms);
        }

        Some(DetectorEvent::ShotAccepted {
            shot: number,
            at_ms: now,
        })
    }

    fn count_miss_tap(&mut self, sample: MotionSample) -> Option<DetectorEvent> {
        if sample.magnitude <= self.config.motion_tap_threshold {
            return None;
        }

        self.state.tap_count += 1;
        debug!(t = sample.timestamp_ms, taps = self.state.tap_count, "miss tap");

        if self.state.tap_count < self.config.miss_tap_count {
            return Some(DetectorEvent::MissTap {
                count: self.state.tap_count,
                at_ms: sample.timestamp_ms,
            });
        }

        self.cancel_slot(TimerKind::MissWindowDuration);
        Some(self.resolve(Outcome::Miss))
    }

    /// Emit the outcome and start over with a fresh attempt.
    fn resolve(&mut self, outcome: Outcome) -> DetectorEvent {
        let target = TargetOutcome::from_shots(
            outcome,
            &self.state.shot_timestamps,
            self.state.tap_count,
        );

        self.cancel_all_timers();
        self.reset_attempt();
        self.state.phase = if self.session_active {
            DetectorPhase::AwaitingFirstShot
        } else {
            DetectorPhase::Idle
        };
        self.bump_epoch();
        self.outcomes_emitted += 1;

        info!(
            outcome = outcome.as_str(),
            first_shot = ?target.first_shot_ms,
            second_shot = ?target.second_shot_ms,
            "target resolved"
        );
        DetectorEvent::Outcome(target)
    }

    fn enter(&mut self, phase: DetectorPhase) {
        let from = self.state.phase;
        self.state.phase = phase;
        self.bump_epoch();
        debug!(from = ?from, to = ?phase, epoch = self.state.epoch, "phase transition");
    }

    fn bump_epoch(&mut self) {
        self.state.epoch += 1;
    }

    fn reset_attempt(&mut self) {
        let epoch = self.state.epoch;
        let phase = self.state.phase;
        self.state = DetectorState::new(epoch);
        self.state.phase = phase;
    }

    fn arm(&mut self, kind: TimerKind, delay_ms: u64) {
        let token = TimerToken {
            kind,
            epoch: self.state.epoch,
        };
        let handle = self.timers.schedule(delay_ms, token);
        debug!(kind = kind.as_str(), delay_ms, epoch = token.epoch, "timer armed");
        *self.slot_mut(kind) = Some(Outstanding { handle, token });
    }

    fn cancel_slot(&mut self, kind: TimerKind) {
        if let Some(outstanding) = self.slot_mut(kind).take() {
            self.timers.cancel(outstanding.handle);
        }
    }

    fn cancel_all_timers(&mut self) {
        self.cancel_slot(TimerKind::StartTapWindow);
        self.cancel_slot(TimerKind::FirstShotTimeout);
        self.cancel_slot(TimerKind::MissWindowDelay);
    }

    fn slot(&self, kind: TimerKind) -> Option<Outstanding> {
        match kind {
            TimerKind::StartTapWindow => self.start_tap_timer,
            TimerKind::FirstShotTimeout => self.first_shot_timer,
            TimerKind::MissWindowDelay | TimerKind::MissWindowDuration => self.miss_timer,
        }
    }

    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<Outstanding> {
        match kind {
            TimerKind::StartTapWindow => &mut self.start_tap_timer,
            TimerKind::FirstShotTimeout => &mut self.first_shot_timer,
            TimerKind::MissWindowDelay | TimerKind::MissWindowDuration => &mut self.miss_timer,
        }
    }

    fn is_current(&self, fired: FiredTimer) -> bool {
        if fired.token.epoch != self.state.epoch {
            return false;
        }
        let expected_phase = match fired.token.kind {
            TimerKind::StartTapWindow => DetectorPhase::Idle,
            TimerKind::FirstShotTimeout => DetectorPhase::AwaitingSecondShot,
            TimerKind::MissWindowDelay => DetectorPhase::MissWindowPending,
            TimerKind::MissWindowDuration => DetectorPhase::MissWindowOpen,
        };
        if self.state.phase != expected_phase {
            return false;
        }
        self.slot(fired.token.kind)
            .is_some_and(|o| o.handle == fired.handle && o.token == fired.token)
    }
}

impl<T: TimerService> Drop for ShotDetector<T> {
    fn drop(&mut self) {
        self.cancel_all_timers();
    }
}

// ============================================================================
// TESTS
// ============================================================================
