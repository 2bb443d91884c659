//! Bounded retry budget for dependency connection at startup.

use std::time::Duration;

/// How many times to try connecting, and how long to wait between failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never zero.
    pub attempts: u32,
    /// Pause after each failed attempt except the last.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `attempts` is clamped to at least one.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Whether `attempt` (1-based) is the final one in the budget.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.attempts
    }
}
