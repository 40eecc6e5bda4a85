// SPDX-License-Identifier: GPL-3.0-or-later

use rand::Rng;
use std::sync::Arc;
use tokio::time::Duration;

/// Bounded exponential backoff for transient search failures.
///
/// The delay after failed attempt `n` (counted from 0) is
/// `min(max_backoff, 2^n + jitter)` seconds with jitter drawn from `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_backoff,
        }
    }

    /// Backoff for `attempt` with a fresh random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen();
        self.backoff_with_jitter(attempt, jitter)
    }

    pub fn backoff_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        // 2^1023 is the largest finite power of two
        let exponential = 2f64.powi(attempt.min(1023) as i32);
        let secs = (exponential + jitter).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Suspends the current task. Injected so retry and pacing logic can be
/// exercised without waiting in real time.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tracing::trace!(target: "retry", "sleeping {:?}", duration);
        tokio::time::sleep(duration).await;
    }
}

#[async_trait::async_trait]
impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
