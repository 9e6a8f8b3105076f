//! Token-bucket limiter shared by every worker of one aggregation.
//!
//! [`TokenBucket`] hands out reservations: a caller takes a token immediately
//! (the balance may go negative) and then sleeps until the bucket has refilled
//! to cover it. Waiters are therefore served in arrival order, and a cancelled
//! waiter gives its reservation back.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Admission control for outbound API calls.
pub trait RateLimit: Send + Sync {
    /// Suspends until a call may be issued, or fails with [`Cancelled`].
    fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), Cancelled>> + Send;
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Sustained `rate` tokens per second with room for `burst` back-to-back calls.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// A zero rate or burst is clamped to one.
    pub fn new(rate: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: f64::from(rate.max(1)),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token and returns how long the caller must wait before using it.
    fn reserve(&self) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    fn release(&self) {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }
}

impl RateLimit for TokenBucket {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let wait = self.reserve();
        if wait.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release();
                Err(Cancelled)
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
