//! Retry with exponential backoff.
//!
//! Used at two levels: a single transfer retries its own request a fixed number of
//! times, and the batch download step retries the whole set of still-missing files with
//! a much longer, doubling pause.

use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// A configuration that tries once and never sleeps.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    /// Pause after the failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1)
            .checked_pow(attempt)
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Retry `operation` with exponential backoff.
///
/// `operation` receives the 0-based attempt number. An error is retried only while
/// `should_retry` returns `true` for it and attempts remain; otherwise it is returned
/// as is.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub fn retry_with_backoff<T, E, F, R>(
    config: &RetryConfig,
    mut should_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                let delay = config.delay_for(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
