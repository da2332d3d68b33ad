//! Politeness throttling for repeated external calls.
//!
//! Components that issue a series of requests (query dispatch, citation
//! lookups, LLM scoring) take a [`RateLimiter`] and acquire it before every
//! call. Tests inject [`Unthrottled`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next request may be sent
    async fn acquire(&self);
}

/// Leaky bucket of capacity one: at most one request per interval
#[derive(Debug)]
pub struct IntervalLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl RateLimiter for IntervalLimiter {
    async fn acquire(&self) {
        // Holding the lock across the sleep serialises concurrent callers.
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Throttling request");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// No throttling
#[derive(Debug, Default, Clone, Copy)]
pub struct Unthrottled;

#[async_trait]
impl RateLimiter for Unthrottled {
    async fn acquire(&self) {}
}
