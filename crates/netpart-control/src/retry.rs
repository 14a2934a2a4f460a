// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded retry with exponential backoff and cancellation.
//!
//! Used wherever the control plane has to block until a dependency becomes
//! ready: the runtime ping at startup and the SQL connect before every
//! statement. Every wait races the caller's [`CancellationToken`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Backoff policy: `initial_delay * 2^(attempt-1)`, capped at `max_delay`,
/// giving up once `deadline` has elapsed since the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Total time budget across all attempts.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            deadline: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a given attempt (1-indexed).
    ///
    /// Attempt 1 is the first retry (after the initial failure).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The deadline passed; carries the last error seen.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt, if one completed.
        last: Option<E>,
    },
    /// The cancellation token fired.
    Cancelled,
}

/// Retry `op` until it succeeds, the policy deadline passes, or `cancel` fires.
///
/// A single attempt that hangs is cut off at the deadline.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let deadline = Instant::now() + policy.deadline;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            res = tokio::time::timeout_at(deadline, op()) => res,
        };

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_elapsed) => {
                return Err(RetryError::Exhausted {
                    attempts,
                    last: None,
                });
            }
        };

        let delay = policy.delay_for_attempt(attempts);
        if Instant::now() + delay >= deadline {
            return Err(RetryError::Exhausted {
                attempts,
                last: Some(err),
            });
        }

        warn!(
            what = %what,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}
