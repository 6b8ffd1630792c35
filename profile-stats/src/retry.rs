// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Bounded retries around remote API calls.
//!
//! Quota rejections back off exponentially; every other failure waits the
//! base delay between attempts, unless the policy is narrowed to quota
//! failures only.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Error;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one (default: 3).
    pub max_retries:      u32,
    /// Delay before the second attempt (default: 2s).
    pub base_delay:       Duration,
    /// Retry failures other than quota rejections (default: true).
    pub retry_all_errors: bool
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries:      3,
            base_delay:       Duration::from_secs(2),
            retry_all_errors: true
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        if error.is_quota_exceeded() {
            self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
        } else {
            self.base_delay
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Executes an async operation under the retry policy.
///
/// # Arguments
///
/// * `policy` - Attempt budget and delays
/// * `operation_name` - Name of the operation for logging
/// * `f` - Async function to retry
///
/// # Errors
///
/// Returns [`Error::RetriesExhausted`] carrying the last failure once the
/// attempt budget is spent. When the policy does not retry every error, a
/// non-quota failure is returned unchanged on the first occurrence.
///
/// # Example
///
/// ```no_run
/// use profile_stats::{
///     error::Error,
///     retry::{RetryPolicy, retry_with_backoff}
/// };
///
/// # async fn example() -> Result<(), Error> {
/// let policy = RetryPolicy::default();
/// let value = retry_with_backoff(&policy, "fetch data", || async { Ok::<_, Error>(42) }).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut f: F
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_quota_exceeded() && !policy.retry_all_errors {
                    return Err(error);
                }

                attempt += 1;
                if attempt >= attempts {
                    warn!("{} failed after {} attempts: {}", operation_name, attempts, error);
                    return Err(Error::RetriesExhausted {
                        operation:  operation_name.to_owned(),
                        attempts,
                        last_error: Box::new(error)
                    });
                }

                let delay = policy.delay_for(attempt - 1, &error);
                warn!(
                    "{} failed on attempt {}/{}: {}. Retrying in {}s...",
                    operation_name,
                    attempt,
                    attempts,
                    error,
                    delay.as_secs_f32()
                );
                sleep(delay).await;
            }
        }
    }
}
