// src/engine/timers.rs

//! Deadline table for the session watchdogs.
//!
//! Each watchdog has at most one pending deadline. Re-arming replaces it and
//! cancelling drops it, so a cancelled timer can never fire later: there is
//! nothing left to fire.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use super::Watchdog;

#[derive(Debug, Default)]
pub struct TimerTable {
    deadlines: BTreeMap<Watchdog, Instant>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delay too large to represent as an instant means the watchdog
    /// never fires; any earlier deadline for it is dropped.
    pub fn arm(&mut self, watchdog: Watchdog, now: Instant, delay: Duration) {
        match now.checked_add(delay) {
            Some(deadline) => {
                self.deadlines.insert(watchdog, deadline);
            }
            None => {
                self.deadlines.remove(&watchdog);
            }
        }
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every watchdog whose deadline has passed, earliest
    /// first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Watchdog> {
        let mut expired: Vec<(Instant, Watchdog)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(watchdog, deadline)| (*deadline, *watchdog))
            .collect();
        expired.sort();

        for (_, watchdog) in &expired {
            self.deadlines.remove(watchdog);
        }
        expired.into_iter().map(|(_, w)| w).collect()
    }
}
