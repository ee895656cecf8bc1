//! Debounced dispatcher: coalesces bursts of triggers into one delayed
//! invocation. Driven by an explicit clock value so schedules are
//! deterministic and testable without wall-clock sleeps.

use std::time::Duration;

/// A pending-at-most-one dispatcher. Each [`trigger`](Debounce::trigger)
/// cancels any scheduled-but-not-yet-fired invocation and reschedules it
/// `delay` after the trigger (last write wins, nothing is queued).
#[derive(Debug)]
pub struct Debounce<T> {
    delay: Duration,
    pending: Option<(Duration, T)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration) -> Self {
        Debounce {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules (or reschedules) the action to fire `delay` after `now`,
    /// replacing any pending payload with this one.
    pub fn trigger(&mut self, now: Duration, payload: T) {
        self.pending = Some((now + self.delay, payload));
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Yields the payload once the quiescence window has elapsed; the
    /// schedule is consumed.
    pub fn fire(&mut self, now: Duration) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if now >= *deadline => self.pending.take().map(|(_, p)| p),
            _ => None,
        }
    }
}
