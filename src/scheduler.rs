//! Periodic timers for a single-threaded event loop
//!
//! The loop asks [`TimerQueue::handle`] which timers are due, dispatches them
//! to their owners, then sleeps for [`TimerQueue::next_wake`].

use std::time::{Duration, Instant};

/// Idle delay reported when no timer is registered
pub const IDLE_WITHOUT_TIMERS: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Periodic callback registration
pub trait Scheduler {
    /// Register a timer firing every `period`. `user_data` is handed back
    /// unchanged each time the timer fires.
    fn register_periodic(&mut self, period: Duration, user_data: u32) -> TimerId;

    /// Remove a timer. Returns false if it was not registered.
    fn deregister(&mut self, id: TimerId) -> bool;
}

/// A timer that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub user_data: u32,
}

#[derive(Debug)]
struct Timer {
    id: TimerId,
    period: Duration,
    next_due: Instant,
    user_data: u32,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Period of a registered timer
    #[cfg(test)]
    pub fn period(&self, id: TimerId) -> Option<Duration> {
        self.timers.iter().find(|t| t.id == id).map(|t| t.period)
    }

    /// Fire every timer due at `now`.
    ///
    /// A timer that fell behind fires once and is rescheduled one period
    /// after `now`; missed periods are not replayed.
    pub fn handle(&mut self, now: Instant) -> Vec<FiredTimer> {
        let mut fired = Vec::new();
        for timer in &mut self.timers {
            if now >= timer.next_due {
                fired.push(FiredTimer {
                    id: timer.id,
                    user_data: timer.user_data,
                });
                timer.next_due = now + timer.period;
            }
        }
        fired
    }

    /// Time until the next timer is due
    pub fn next_wake(&self, now: Instant) -> Duration {
        self.timers
            .iter()
            .map(|t| t.next_due.saturating_duration_since(now))
            .min()
            .unwrap_or(IDLE_WITHOUT_TIMERS)
    }
}

impl Scheduler for TimerQueue {
    fn register_periodic(&mut self, period: Duration, user_data: u32) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            period,
            next_due: Instant::now() + period,
            user_data,
        });
        id
    }

    fn deregister(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }
}
