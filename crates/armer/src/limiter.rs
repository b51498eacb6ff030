#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// Sliding window call counter.
///
/// Every call to [`RateLimiter::triggered`] counts, including the ones that
/// end up refused.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    calls: VecDeque<DateTime<Utc>>,
    window: Duration,
    max_calls: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_calls: usize) -> Self {
        Self {
            calls: VecDeque::new(),
            window,
            max_calls,
        }
    }

    /// Record a call at `now` and report whether the window is over budget.
    pub fn triggered(&mut self, now: DateTime<Utc>) -> bool {
        self.calls.push_back(now);
        let floor = now - self.window;
        while self.calls.front().is_some_and(|call| *call < floor) {
            self.calls.pop_front();
        }
        self.calls.len() > self.max_calls
    }
}
