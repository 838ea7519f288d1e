//! C FFI Bindings for the mobile host
//!
//! This module exposes the shot detector to mobile platforms via C ABI.
//! The host feeds sensor samples and clock ticks; events are queued inside
//! the handle until polled. The queue holds at most [`MAX_PENDING_EVENTS`];
//! when it is full the oldest event is dropped.
//!
//! Memory Safety:
//! - Strings returned by `shot_detector_poll_event_json()` must be freed
//!   with `shot_free_string()`
//! - The detector instance must be freed with `shot_detector_destroy()`
//! - NULL checks are performed on all inputs
//!
//! Thread Safety:
//! - The detector is NOT thread-safe. Use a single thread or mutex.

use std::collections::VecDeque;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use tracing::warn;

use crate::config::DetectorConfig;
use crate::pipeline::{ShotPipeline, TimedEvent};
use crate::types::{DetectorEvent, DetectorPhase, MotionSample, Outcome, SensorStream, SoundSample};

// ============================================================================
// OPAQUE HANDLE TYPES
// ============================================================================

/// Capacity of the per-engine event queue.
pub const MAX_PENDING_EVENTS: usize = 256;

/// Opaque handle to a shot detector.
#[derive(Debug)]
pub struct ShotEngine {
    pipeline: ShotPipeline,
    pending: VecDeque<TimedEvent>,
    dropped: u64,
}

impl ShotEngine {
    fn queue(&mut self, events: Vec<TimedEvent>) {
        for event in events {
            if self.pending.len() == MAX_PENDING_EVENTS {
                self.pending.pop_front();
                self.dropped += 1;
                warn!(dropped = self.dropped, "event queue full, dropped oldest event");
            }
            self.pending.push_back(event);
        }
    }
}

/// Result status codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotStatus {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer provided.
    NullPointer = 1,
    /// Invalid parameter value (including a rejected configuration).
    InvalidParameter = 2,
    /// No event is waiting.
    NoEvent = 3,
}

/// Detector configuration as seen from C.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct ShotConfig {
    pub sound_threshold: f32,
    pub motion_shot_threshold: f32,
    pub motion_tap_threshold: f32,
    pub correlation_window_ms: u64,
    pub shot_debounce_ms: u64,
    pub start_tap_count: u32,
    pub start_tap_window_ms: u64,
    pub first_shot_timeout_ms: u64,
    pub miss_window_delay_ms: u64,
    pub miss_window_duration_ms: u64,
    pub miss_tap_count: u32,
}

impl From<&DetectorConfig> for ShotConfig {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            sound_threshold: config.sound_threshold,
            motion_shot_threshold: config.motion_shot_threshold,
            motion_tap_threshold: config.motion_tap_threshold,
            correlation_window_ms: config.correlation_window_ms,
            shot_debounce_ms: config.shot_debounce_ms,
            start_tap_count: config.start_tap_count,
            start_tap_window_ms: config.start_tap_window_ms,
            first_shot_timeout_ms: config.first_shot_timeout_ms,
            miss_window_delay_ms: config.miss_window_delay_ms,
            miss_window_duration_ms: config.miss_window_duration_ms,
            miss_tap_count: config.miss_tap_count,
        }
    }
}

impl From<&ShotConfig> for DetectorConfig {
    fn from(config: &ShotConfig) -> Self {
        Self {
            sound_threshold: config.sound_threshold,
            motion_shot_threshold: config.motion_shot_threshold,
            motion_tap_threshold: config.motion_tap_threshold,
            correlation_window_ms: config.correlation_window_ms,
            shot_debounce_ms: config.shot_debounce_ms,
            start_tap_count: config.start_tap_count,
            start_tap_window_ms: config.start_tap_window_ms,
            first_shot_timeout_ms: config.first_shot_timeout_ms,
            miss_window_delay_ms: config.miss_window_delay_ms,
            miss_window_duration_ms: config.miss_window_duration_ms,
            miss_tap_count: config.miss_tap_count,
        }
    }
}

/// One polled event.
///
/// `kind`: 0=SessionStarted, 1=ShotAccepted, 2=MissTap, 3=Outcome,
/// 4=SensorUnavailable. Fields that do not apply to the kind are zero.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct ShotEvent {
    /// Virtual time the event was emitted at.
    pub at_ms: u64,
    pub kind: i32,
    /// Outcome (1=hit first shot, 2=hit second shot, 3=miss).
    pub outcome: i32,
    /// Shot number for ShotAccepted.
    pub shot: i32,
    /// Tap count for MissTap and Outcome.
    pub taps: u32,
    /// Shot timestamps; 0 when the shot was not fired.
    pub first_shot_ms: u64,
    pub second_shot_ms: u64,
    /// Stream (0=motion, 1=sound) for SensorUnavailable.
    pub stream: i32,
}

impl From<&TimedEvent> for ShotEvent {
    fn from(timed: &TimedEvent) -> Self {
        let mut out = ShotEvent {
            at_ms: timed.at_ms,
            ..Default::default()
        };
        match &timed.event {
            DetectorEvent::SessionStarted => out.kind = 0,
            DetectorEvent::ShotAccepted { shot, at_ms } => {
                out.kind = 1;
                out.shot = *shot as i32;
                if *shot == 1 {
                    out.first_shot_ms = *at_ms;
                } else {
                    out.second_shot_ms = *at_ms;
                }
            }
            DetectorEvent::MissTap { count, .. } => {
                out.kind = 2;
                out.taps = *count;
            }
            DetectorEvent::Outcome(target) => {
                out.kind = 3;
                out.outcome = outcome_code(target.outcome);
                out.taps = target.miss_taps;
                out.first_shot_ms = target.first_shot_ms.unwrap_or(0);
                out.second_shot_ms = target.second_shot_ms.unwrap_or(0);
            }
            DetectorEvent::SensorUnavailable { stream } => {
                out.kind = 4;
                out.stream = stream_code(*stream);
            }
        }
        out
    }
}

fn outcome_code(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::HitFirstShot => 1,
        Outcome::HitSecondShot => 2,
        Outcome::Miss => 3,
    }
}

fn stream_code(stream: SensorStream) -> i32 {
    match stream {
        SensorStream::Motion => 0,
        SensorStream::Sound => 1,
    }
}

fn stream_from_code(code: i32) -> Option<SensorStream> {
    match code {
        0 => Some(SensorStream::Motion),
        1 => Some(SensorStream::Sound),
        _ => None,
    }
}

// ============================================================================
// DETECTOR LIFECYCLE
// ============================================================================

/// Fill `out` with the default configuration.
///
/// # Safety
/// - `out` must be a valid pointer to a ShotConfig.
#[no_mangle]
pub unsafe extern "C" fn shot_config_default(out: *mut ShotConfig) -> ShotStatus {
    if out.is_null() {
        return ShotStatus::NullPointer;
    }
    *out = ShotConfig::from(&DetectorConfig::default());
    ShotStatus::Ok
}

/// Create a new shot detector.
///
/// # Safety
/// - `config` must be a valid pointer to ShotConfig.
/// - The returned pointer must be freed with `shot_detector_destroy()`.
///
/// # Returns
/// - Pointer to ShotEngine on success.
/// - NULL if `config` is NULL or invalid.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_create(config: *const ShotConfig) -> *mut ShotEngine {
    if config.is_null() {
        return ptr::null_mut();
    }

    let config = DetectorConfig::from(&*config);
    match ShotPipeline::new(config) {
        Ok(pipeline) => Box::into_raw(Box::new(ShotEngine {
            pipeline,
            pending: VecDeque::new(),
            dropped: 0,
        })),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy a shot detector. Outstanding timers and queued events are dropped.
///
/// # Safety
/// - `engine` must be a valid pointer from `shot_detector_create()`.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_destroy(engine: *mut ShotEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Replace the configuration. On `InvalidParameter` the old one stays.
///
/// # Safety
/// - `engine` and `config` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_configure(
    engine: *mut ShotEngine,
    config: *const ShotConfig,
) -> ShotStatus {
    if engine.is_null() || config.is_null() {
        return ShotStatus::NullPointer;
    }

    let engine = &mut *engine;
    match engine.pipeline.configure(DetectorConfig::from(&*config)) {
        Ok(()) => ShotStatus::Ok,
        Err(_) => ShotStatus::InvalidParameter,
    }
}

// ============================================================================
// SESSION CONTROL
// ============================================================================

/// Start a session at `timestamp_ms` without the tap gesture.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_activate(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let events = engine.pipeline.activate_at(timestamp_ms);
    engine.queue(events);
    ShotStatus::Ok
}

/// End the session at `timestamp_ms`, discarding any partial attempt.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_deactivate(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let events = engine.pipeline.deactivate_at(timestamp_ms);
    engine.queue(events);
    ShotStatus::Ok
}

/// Report that a stream could not be subscribed (0=motion, 1=sound).
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_sensor_unavailable(
    engine: *mut ShotEngine,
    stream: i32,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let Some(stream) = stream_from_code(stream) else {
        return ShotStatus::InvalidParameter;
    };
    let engine = &mut *engine;
    if let Some(event) = engine.pipeline.sensor_unavailable(stream) {
        engine.pending.push_back(event);
    }
    ShotStatus::Ok
}

/// The host resubscribed both streams successfully.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_sensors_restored(engine: *mut ShotEngine) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    (*engine).pipeline.sensors_restored();
    ShotStatus::Ok
}

// ============================================================================
// SAMPLE PROCESSING
// ============================================================================

/// Process a motion-magnitude sample.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_motion(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
    magnitude: f32,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let events = engine
        .pipeline
        .push_motion(MotionSample::new(timestamp_ms, magnitude));
    engine.queue(events);
    ShotStatus::Ok
}

/// Process a raw accelerometer sample; the magnitude is computed here.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_motion_axes(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
    accel_x: f32,
    accel_y: f32,
    accel_z: f32,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let sample = MotionSample::from_axes(timestamp_ms, [accel_x, accel_y, accel_z]);
    let events = engine.pipeline.push_motion(sample);
    engine.queue(events);
    ShotStatus::Ok
}

/// Process a sound-level sample.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_sound(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
    level: f32,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let events = engine
        .pipeline
        .push_sound(SoundSample::new(timestamp_ms, level));
    engine.queue(events);
    ShotStatus::Ok
}

/// Advance the clock without a sample, firing any due timers.
///
/// # Safety
/// - `engine` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_advance(
    engine: *mut ShotEngine,
    timestamp_ms: u64,
) -> ShotStatus {
    if engine.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    let events = engine.pipeline.advance_to(timestamp_ms);
    engine.queue(events);
    ShotStatus::Ok
}

// ============================================================================
// EVENT RETRIEVAL
// ============================================================================

/// Pop the oldest queued event into `out`.
///
/// # Safety
/// - `engine` must be a valid pointer.
/// - `out` must be a valid pointer to a ShotEvent.
///
/// # Returns
/// - `Ok` with `out` filled, or `NoEvent` when the queue is empty.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_poll_event(
    engine: *mut ShotEngine,
    out: *mut ShotEvent,
) -> ShotStatus {
    if engine.is_null() || out.is_null() {
        return ShotStatus::NullPointer;
    }
    let engine = &mut *engine;
    match engine.pending.pop_front() {
        Some(event) => {
            *out = ShotEvent::from(&event);
            ShotStatus::Ok
        }
        None => ShotStatus::NoEvent,
    }
}

/// Pop the oldest queued event as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer.
///
/// # Returns
/// - JSON string (MUST be freed with `shot_free_string()`).
/// - NULL when the queue is empty.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_poll_event_json(engine: *mut ShotEngine) -> *mut c_char {
    if engine.is_null() {
        return ptr::null_mut();
    }
    let engine = &mut *engine;
    let Some(event) = engine.pending.pop_front() else {
        return ptr::null_mut();
    };
    serde_json::to_string(&event)
        .ok()
        .and_then(|json| CString::new(json).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// Free a string returned by `shot_detector_poll_event_json()`.
///
/// # Safety
/// - `ptr` must be a string returned by this library.
/// - Must not be called more than once for the same pointer.
#[no_mangle]
pub unsafe extern "C" fn shot_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// STATUS QUERIES
// ============================================================================

/// Number of events waiting to be polled.
///
/// # Safety
/// - `engine` must be NULL or a valid pointer from `shot_detector_create()`.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_pending_events(engine: *const ShotEngine) -> u32 {
    if engine.is_null() {
        return 0;
    }
    (*engine).pending.len() as u32
}

/// Number of events dropped because the queue was full.
///
/// # Safety
/// - `engine` must be NULL or a valid pointer from `shot_detector_create()`.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_dropped_events(engine: *const ShotEngine) -> u64 {
    if engine.is_null() {
        return 0;
    }
    (*engine).dropped
}

/// Current phase (0=Idle, 1=AwaitingFirstShot, 2=AwaitingSecondShot,
/// 3=MissWindowPending, 4=MissWindowOpen), or -1 for NULL.
///
/// # Safety
/// - `engine` must be NULL or a valid pointer from `shot_detector_create()`.
#[no_mangle]
pub unsafe extern "C" fn shot_detector_phase(engine: *const ShotEngine) -> i32 {
    if engine.is_null() {
        return -1;
    }
    match (*engine).pipeline.phase() {
        DetectorPhase::Idle => 0,
        DetectorPhase::AwaitingFirstShot => 1,
        DetectorPhase::AwaitingSecondShot => 2,
        DetectorPhase::MissWindowPending => 3,
        DetectorPhase::MissWindowOpen => 4,
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Get the library version string.
///
/// # Returns
/// - Static string, do NOT free.
#[no_mangle]
pub extern "C" fn shot_version() -> *const c_char {
    static VERSION: &[u8] = concat!("shot-sensing/", env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    unsafe fn create() -> *mut ShotEngine {
        let mut config = ShotConfig::from(&DetectorConfig::default());
        assert_eq!(shot_config_default(&mut config), ShotStatus::Ok);
        let engine = shot_detector_create(&config);
        assert!(!engine.is_null());
        engine
    }

    #[test]
    fn test_engine_lifecycle() {
        unsafe {
            let engine = create();
            assert_eq!(shot_detector_phase(engine), 0);
            assert_eq!(shot_detector_activate(engine, 0), ShotStatus::Ok);
            assert_eq!(shot_detector_phase(engine), 1);
            assert_eq!(shot_detector_deactivate(engine, 10), ShotStatus::Ok);
            assert_eq!(shot_detector_phase(engine), 0);
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        unsafe {
            let mut config = ShotConfig::from(&DetectorConfig::default());
            config.correlation_window_ms = 0;
            assert!(shot_detector_create(&config).is_null());

            let engine = create();
            assert_eq!(
                shot_detector_configure(engine, &config),
                ShotStatus::InvalidParameter
            );
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_hit_first_shot_polled() {
        unsafe {
            let engine = create();
            shot_detector_activate(engine, 0);
            shot_detector_sound(engine, 0, -5.0);
            shot_detector_motion(engine, 10, 12.0);
            shot_detector_advance(engine, 5000);
            assert_eq!(shot_detector_pending_events(engine), 2);

            let mut event = ShotEvent::default();
            assert_eq!(shot_detector_poll_event(engine, &mut event), ShotStatus::Ok);
            assert_eq!(event.kind, 1);
            assert_eq!(event.shot, 1);

            assert_eq!(shot_detector_poll_event(engine, &mut event), ShotStatus::Ok);
            assert_eq!(event.kind, 3);
            assert_eq!(event.outcome, 1);
            assert_eq!(event.at_ms, 3010);
            assert_eq!(event.first_shot_ms, 10);
            assert_eq!(event.second_shot_ms, 0);

            assert_eq!(shot_detector_poll_event(engine, &mut event), ShotStatus::NoEvent);
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_unpolled_queue_keeps_newest_events() {
        unsafe {
            let engine = create();
            shot_detector_activate(engine, 0);
            // Each target yields a shot and an outcome: 400 events in total.
            for i in 0..200u64 {
                let t = i * 5000;
                shot_detector_sound(engine, t, -5.0);
                shot_detector_motion(engine, t + 10, 12.0);
            }
            shot_detector_advance(engine, 2_000_000);

            assert_eq!(shot_detector_pending_events(engine) as usize, MAX_PENDING_EVENTS);
            assert_eq!(shot_detector_dropped_events(engine), 144);

            let mut event = ShotEvent::default();
            assert_eq!(shot_detector_poll_event(engine, &mut event), ShotStatus::Ok);
            assert_eq!(event.kind, 1);
            assert_eq!(event.at_ms, 72 * 5000 + 10);
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_tap_gesture_from_axes() {
        unsafe {
            let engine = create();
            for t in [0, 200, 400] {
                shot_detector_motion_axes(engine, t, 12.0, 12.0, 0.0);
            }
            let json = shot_detector_poll_event_json(engine);
            assert!(!json.is_null());
            let text = CStr::from_ptr(json).to_str().unwrap().to_string();
            shot_free_string(json);
            assert!(text.contains("session_started"));
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_sensor_unavailable() {
        unsafe {
            let engine = create();
            assert_eq!(
                shot_detector_sensor_unavailable(engine, 7),
                ShotStatus::InvalidParameter
            );
            assert_eq!(shot_detector_sensor_unavailable(engine, 1), ShotStatus::Ok);
            assert_eq!(shot_detector_sensor_unavailable(engine, 1), ShotStatus::Ok);
            assert_eq!(shot_detector_pending_events(engine), 1);

            let mut event = ShotEvent::default();
            shot_detector_poll_event(engine, &mut event);
            assert_eq!(event.kind, 4);
            assert_eq!(event.stream, 1);

            assert_eq!(shot_detector_sensors_restored(engine), ShotStatus::Ok);
            shot_detector_destroy(engine);
        }
    }

    #[test]
    fn test_version() {
        let version = shot_version();
        assert!(!version.is_null());

        unsafe {
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(version_str.starts_with("shot-sensing/"));
        }
    }

    #[test]
    fn test_null_safety() {
        unsafe {
            assert!(shot_detector_create(ptr::null()).is_null());
            assert_eq!(shot_detector_activate(ptr::null_mut(), 0), ShotStatus::NullPointer);
            assert_eq!(
                shot_detector_motion(ptr::null_mut(), 0, 1.0),
                ShotStatus::NullPointer
            );
            assert_eq!(
                shot_detector_poll_event(ptr::null_mut(), ptr::null_mut()),
                ShotStatus::NullPointer
            );
            assert_eq!(shot_config_default(ptr::null_mut()), ShotStatus::NullPointer);
            assert_eq!(shot_detector_phase(ptr::null()), -1);
            assert_eq!(shot_detector_pending_events(ptr::null()), 0);
            assert_eq!(shot_detector_dropped_events(ptr::null()), 0);
            assert!(shot_detector_poll_event_json(ptr::null_mut()).is_null());
            shot_detector_destroy(ptr::null_mut());
        }
    }
}
