// AMIGrid - AMI smart-meter telemetry core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded retry with exponential backoff.
//!
//! Sleeping is delegated to the caller so the same policy drives both
//! wall-clock publishers ([`thread_sleep`]) and simulated-time pipelines
//! ([`no_sleep`]), where the backoff is only accounted for.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy.
///
/// Attempt `n` (0-indexed retry) waits `initial_backoff * multiplier^n`,
/// capped at `max_backoff`. After `max_retries` retries the operation is
/// reported as exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff, milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling, milliseconds.
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries: the first failure is final.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Doubling backoff starting at `initial`.
    pub fn exponential(max_retries: u32, initial: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: initial.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Set the backoff ceiling.
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Backoff before retry `attempt` (0-indexed), or `None` once exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let delay_ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Some(Duration::from_millis(delay_ms as u64))
    }
}

/// Successful retry outcome.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Backoff accumulated before success.
    pub total_backoff: Duration,
}

impl<T> RetryOutcome<T> {
    /// Retries beyond the first attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Every attempt failed.
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub attempts: u32,
    pub total_backoff: Duration,
}

impl<E> RetryExhausted<E> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `operation` under `policy`, calling `sleep` between attempts.
///
/// # Example
///
/// ```rust
/// use amigrid::recovery::{no_sleep, with_retry, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
/// let mut calls = 0;
/// let outcome = with_retry(&policy, no_sleep, || {
///     calls += 1;
///     if calls < 3 { Err("busy") } else { Ok(calls) }
/// })
/// .unwrap();
/// assert_eq!(outcome.attempts, 3);
/// assert_eq!(outcome.total_backoff, Duration::from_millis(300));
/// ```
pub fn with_retry<T, E, F, S>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut operation: F,
) -> Result<RetryOutcome<T>, RetryExhausted<E>>
where
    F: FnMut() -> Result<T, E>,
    S: FnMut(Duration),
{
    let mut attempt = 0;
    let mut total_backoff = Duration::ZERO;
    loop {
        match operation() {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt + 1,
                    total_backoff,
                })
            }
            Err(e) => match policy.delay_for_attempt(attempt) {
                Some(delay) => {
                    sleep(delay);
                    total_backoff += delay;
                    attempt += 1;
                }
                None => {
                    return Err(RetryExhausted {
                        last_error: e,
                        attempts: attempt + 1,
                        total_backoff,
                    })
                }
            },
        }
    }
}

/// Block the current thread for the backoff.
pub fn thread_sleep(delay: Duration) {
    std::thread::sleep(delay);
}

/// Account for the backoff without waiting (simulated time).
pub fn no_sleep(_delay: Duration) {}
