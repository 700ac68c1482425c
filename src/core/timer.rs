//! Debounce timer - fires once a fixed delay after the last `schedule()`.
//!
//! Units use two of these:
//! 1. Loading indicator: a user play() that has to wait for data first shows
//!    a "preplay" state, promoted to "loading" if the wait exceeds the delay
//! 2. User activity: controls stay visible until the pointer has been idle
//!    for the delay
//!
//! The timer is polled; it owns no thread. Callers pass `now` explicitly so
//! tests can step time without sleeping.

use log::trace;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            deadline: None,
        }
    }

    pub fn set_delay(&mut self, delay_ms: u64) {
        self.delay = Duration::from_millis(delay_ms);
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }

    /// Arm (or re-arm) the timer relative to `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
        trace!("DebounceTimer: armed for {}ms", self.delay.as_millis());
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            trace!("DebounceTimer: cancelled");
        }
    }

    /// True exactly once when the deadline has passed; disarms the timer.
    pub fn fire_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
