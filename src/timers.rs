//! Timer service abstraction.
//!
//! The detector schedules timers through [`TimerService`] and keeps the
//! returned [`TimerHandle`] together with the [`TimerToken`] it scheduled
//! under. When a timer fires, the detector checks that the token still
//! matches its current epoch and the handle it holds for that slot; a stale
//! firing is ignored even if cancellation lost a race.
//!
//! [`VirtualTimers`] is a deterministic implementation driven by sample
//! timestamps. It backs the replay pipeline, the FFI and the tests. The async
//! host in `runtime` provides a tokio-backed implementation.

use std::collections::{BTreeMap, HashMap};

/// What a timer is for. Each kind occupies one slot in the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Resets the start-tap counter when the tap window lapses.
    StartTapWindow,
    /// Scores a first-shot hit when no second shot arrives.
    FirstShotTimeout,
    /// Opens the miss-tap window after the second shot.
    MissWindowDelay,
    /// Scores a second-shot hit when the miss window closes.
    MissWindowDuration,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::StartTapWindow => "start_tap_window",
            TimerKind::FirstShotTimeout => "first_shot_timeout",
            TimerKind::MissWindowDelay => "miss_window_delay",
            TimerKind::MissWindowDuration => "miss_window_duration",
        }
    }
}

/// Identity of a timer from the detector's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    /// Detector epoch at scheduling time.
    pub epoch: u64,
}

/// Opaque handle returned by a [`TimerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// A timer that has come due, as delivered back to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub token: TimerToken,
}

/// Schedules one-shot callbacks.
///
/// Implementations may deliver late but never early. `cancel` must be
/// idempotent: cancelling a fired or already cancelled timer is a no-op.
pub trait TimerService {
    fn schedule(&mut self, delay_ms: u64, token: TimerToken) -> TimerHandle;

    fn cancel(&mut self, handle: TimerHandle);
}

/// Deterministic timer wheel on a virtual millisecond clock.
///
/// Timers due at the same instant fire in scheduling order.
#[derive(Debug, Default)]
pub struct VirtualTimers {
    now_ms: u64,
    next_id: u64,
    pending: BTreeMap<(u64, TimerHandle), TimerToken>,
    due_by_handle: HashMap<TimerHandle, u64>,
}

impl VirtualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Moves the clock forward. The clock never runs backwards.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Number of outstanding timers.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Due time of the earliest outstanding timer.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.keys().next().map(|&(due, _)| due)
    }

    /// Removes and returns the earliest timer due at or before `until_ms`,
    /// advancing the clock to its due time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(u64, FiredTimer)> {
        let (&(due, handle), _) = self.pending.iter().next()?;
        if due > until_ms {
            return None;
        }
        let token = self.pending.remove(&(due, handle))?;
        self.due_by_handle.remove(&handle);
        self.set_now(due);
        Some((due, FiredTimer { handle, token }))
    }
}

impl TimerService for VirtualTimers {
    fn schedule(&mut self, delay_ms: u64, token: TimerToken) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let due = self.now_ms.saturating_add(delay_ms);
        self.pending.insert((due, handle), token);
        self.due_by_handle.insert(handle, due);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(due) = self.due_by_handle.remove(&handle) {
            self.pending.remove(&(due, handle));
        }
    }
}
