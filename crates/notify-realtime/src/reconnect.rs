//! Fixed-delay reconnection with an attempt ceiling.

use std::time::Duration;

use tokio::time::Instant;

/// Outcome of recording a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// A retry is scheduled; `attempt` is 1-based.
    Scheduled { attempt: u32, delay: Duration },
    /// The ceiling was reached; no retry is scheduled.
    Exhausted,
}

/// Tracks the attempt counter and the single pending retry deadline.
///
/// The counter stays in `[0, max_attempts]`. At most one retry is pending at a
/// time; scheduling replaces any previous deadline.
#[derive(Debug)]
pub(crate) struct ReconnectScheduler {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
    retry_at: Option<Instant>,
}

impl ReconnectScheduler {
    pub(crate) fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            attempts: 0,
            retry_at: None,
        }
    }

    /// Record a failed open or an abnormal close.
    #[must_use]
    pub(crate) fn on_failure(&mut self) -> RetryDecision {
        if self.attempts >= self.max_attempts {
            self.retry_at = None;
            return RetryDecision::Exhausted;
        }
        self.attempts += 1;
        self.retry_at = Some(Instant::now() + self.interval);
        RetryDecision::Scheduled {
            attempt: self.attempts,
            delay: self.interval,
        }
    }

    /// Successful open or explicit `connect()`: counter back to zero, nothing pending.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
        self.retry_at = None;
    }

    /// Drop a pending retry without touching the counter.
    pub(crate) fn cancel(&mut self) {
        self.retry_at = None;
    }

    /// Consume the pending deadline once it has fired. Returns `false` if the
    /// retry was cancelled in the meantime.
    pub(crate) fn take_due(&mut self) -> bool {
        match self.retry_at {
            Some(at) if Instant::now() >= at => {
                self.retry_at = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.retry_at.is_some()
    }

    pub(crate) fn retry_at(&self) -> &Option<Instant> {
        &self.retry_at
    }
}

/// Sleep until a retry deadline, or pend forever if none is scheduled.
///
/// Free function so the borrow on the deadline is disjoint from the rest of
/// the session inside `tokio::select!`.
pub(crate) async fn sleep_until_retry(retry_at: &Option<Instant>) {
    match retry_at {
        Some(at) => tokio::time::sleep_until(*at).await,
        None => std::future::pending().await,
    }
}
