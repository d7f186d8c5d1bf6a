//! Cooperative Timers
//!
//! The controller has no timer interrupts of its own. It keeps deadlines
//! here and the dispatch loop sleeps until the earliest one, then feeds a
//! [`TimerEvent`] back through the same entry point as stack events.

use embassy_time::{Duration, Instant};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// Periodic re-check for pending light changes
    PeriodicTick,
    /// The awaited indication confirmation did not arrive in time
    ConfirmationTimeout,
}

/// Single-shot deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer. A running timer is stopped first so there is never more
    /// than one deadline outstanding.
    pub fn start(&mut self, now: Instant, after: Duration) {
        self.stop();
        self.deadline = Some(now + after);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return true if the deadline has passed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Free-running periodic deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTimer {
    period: Duration,
    next: Option<Instant>,
}

impl PeriodicTimer {
    pub const fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// (Re)start counting a full period from `now`.
    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Return true if a tick is due and schedule the following one.
    ///
    /// Ticks missed while the dispatcher was busy collapse into one.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now >= next => {
                let mut following = next + self.period;
                if following <= now {
                    following = now + self.period;
                }
                self.next = Some(following);
                true
            }
            _ => false,
        }
    }
}
