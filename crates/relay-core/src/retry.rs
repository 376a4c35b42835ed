use std::time::Duration;

use crate::error::AppError;

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same wait after every attempt.
    Fixed,
    /// `base_delay * attempt` — 1x, 2x, 3x, ...
    Linear,
}

/// Injectable retry policy: attempt bound, backoff schedule, and the
/// retryable-fault predicate.
///
/// `max_attempts` counts the initial call, so `max_attempts = 3` means at
/// most two retries. Waits happen between attempts, never after the last.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Wait before the attempt following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay * attempt.max(1),
        }
    }

    /// Whether another attempt should follow `attempt` (1-indexed) after the
    /// given fault. Retry is conditional on classification, not universal.
    pub fn should_retry(&self, error: &AppError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Total configured wait across a full retry cycle (for tests and logs).
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for_attempt(a)).sum()
    }
}
