//! Backoff for calls rejected with HTTP 429.
//!
//! The server's `Retry-After` hint wins when it is a positive number of
//! seconds; anything else falls back to plain exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;
use crate::tfe::TfeError;

/// Retry budget and delay computation for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows the 0-based `attempt`.
    pub fn next_delay(hint: Option<&str>, attempt: u32) -> Duration {
        match hint.and_then(|h| h.trim().parse::<i64>().ok()) {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            _ => Duration::from_secs(2u64.saturating_pow(attempt)),
        }
    }

    /// Sleeps for `delay` unless `cancel` fires first.
    pub async fn wait(cancel: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Runs `call` until it stops answering [`TfeError::RateLimited`] or the
    /// budget runs out. Other errors are returned on the spot.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut call: F) -> Result<T, TfeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TfeError>>,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TfeError::Cancelled(Cancelled)),
                result = call() => result,
            };

            match result {
                Err(TfeError::RateLimited { retry_after }) => {
                    if attempt + 1 == max_attempts {
                        break;
                    }
                    let delay = Self::next_delay(retry_after.as_deref(), attempt);
                    Self::wait(cancel, delay).await?;
                }
                other => return other,
            }
        }

        Err(TfeError::RateLimitExhausted {
            attempts: max_attempts,
        })
    }
}
