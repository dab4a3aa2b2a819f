use std::time::Duration;

use futures_util::{future, FutureExt};
use rand::Rng;
use tokio::time::Instant;

use crate::config::SessionConfig;

/// A backoff timer that is armed and not yet elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    /// failed attempts in a row that led to this retry
    pub attempt: u32,
    /// computed delay, jitter included
    pub delay: Duration,
    /// when the timer was armed
    pub scheduled_at: Instant,
}

impl PendingRetry {
    /// when the retry fires
    pub fn deadline(&self) -> Instant {
        self.scheduled_at + self.delay
    }
}

/// Exponential backoff with jitter and a one-shot retry timer.
#[derive(Debug)]
pub struct RetryScheduler {
    base: Duration,
    max: Duration,
    jitter: Duration,
    pending: Option<PendingRetry>,
}

impl RetryScheduler {
    /// Scheduler using the backoff settings of `config`.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            base: config.base_reconnect_interval,
            max: config.max_reconnect_interval,
            jitter: config.jitter,
            pending: None,
        }
    }

    /// `min(base * 2^attempt, max)`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Backoff for `attempt` plus uniform jitter in `[0, jitter]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }

    /// Arm the timer for the retry after `failures` failed attempts in a row.
    ///
    /// The first retry waits `delay(0)`. Re-arming replaces a pending timer.
    pub fn schedule(&mut self, failures: u32, now: Instant) -> PendingRetry {
        let retry = PendingRetry {
            attempt: failures,
            delay: self.delay(failures.saturating_sub(1)),
            scheduled_at: now,
        };

        if let Some(old) = self.pending.replace(retry) {
            log::debug!("Replace pending retry of attempt {}", old.attempt);
        }

        retry
    }

    /// The armed timer, if any.
    pub fn pending(&self) -> Option<&PendingRetry> {
        self.pending.as_ref()
    }

    /// Disarm the timer. Does nothing if none is armed.
    pub fn cancel(&mut self) {
        if let Some(retry) = self.pending.take() {
            log::trace!("Cancel pending retry of attempt {}", retry.attempt);
        }
    }

    /// Wait for the armed timer and disarm it, never resolves if none is armed.
    pub async fn elapsed(&mut self) -> Option<PendingRetry> {
        let clock = match self.pending {
            Some(retry) => tokio::time::sleep_until(retry.deadline()).boxed(),
            None => future::pending().boxed(),
        };
        clock.await;

        self.pending.take()
    }
}
