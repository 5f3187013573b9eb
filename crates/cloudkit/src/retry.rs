//! Retry with exponential backoff for throttling and network errors.
//!
//! Only errors whose [`Error::is_retryable`] is true are retried. Not-found,
//! conflict and permission errors return on the first attempt.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;
use std::time::{Duration, Instant};

/// Observer for retries, called before each sleep.
pub trait RetryCallback {
    /// `attempt` is the 1-indexed attempt that just failed.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Logs each retry at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "attempt {attempt}/{max_attempts} failed: {error}; retrying in {}ms",
            delay.as_millis()
        );
    }
}

/// Delays between attempts: one per retry, so `max_attempts - 1` in total.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    retry: u32,
}

impl<'a> Backoff<'a> {
    /// Delays for `config`
    pub fn new(config: &'a RetryConfig) -> Self {
        Self { config, retry: 0 }
    }
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retry + 1 >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.delay_for_attempt(self.retry);
        self.retry += 1;
        Some(delay)
    }
}

/// Longest uninterrupted sleep while waiting out a backoff delay
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `operation` until it succeeds, fails permanently or runs out of attempts.
///
/// The error of the final attempt is returned unchanged.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    with_retry_until(config, callback, &|| false, operation)
}

/// [`with_retry`] that gives up with [`Error::Cancelled`] once `cancelled` is true.
///
/// `cancelled` is polled before every attempt and while sleeping between
/// attempts, so a cancellation never waits out a full backoff delay.
pub fn with_retry_until<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    cancelled: &dyn Fn() -> bool,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = Backoff::new(config);
    let mut attempt = 1;
    loop {
        if cancelled() {
            return Err(Error::Cancelled);
        }
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };
        let Some(delay) = backoff.next() else {
            return Err(err);
        };
        if let Some(cb) = callback {
            cb.on_retry(attempt, config.max_attempts, &err, delay);
        }
        if !sleep_unless(delay, cancelled) {
            return Err(Error::Cancelled);
        }
        attempt += 1;
    }
}

/// Sleep for `delay` in short slices; false if `cancelled` fired meanwhile
fn sleep_unless(delay: Duration, cancelled: &dyn Fn() -> bool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancelled() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(POLL_INTERVAL));
    }
}
