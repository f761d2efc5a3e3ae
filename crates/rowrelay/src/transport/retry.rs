//! 🔁 Retries: because networks are flaky and 503s are a state of mind.
//!
//! Exponential backoff: `base`, `2·base`, `4·base`, ... between attempts. Only
//! [`TransportError::is_transient`] failures are retried. A 4xx is the remote
//! telling us something true, and asking again will not change its mind.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::Transport;
use crate::error::TransportError;
use crate::queue::Batch;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// ⏳ How many tries, and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is the 1-based attempt that just failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// 🔁 Any [`Transport`], but persistent.
#[derive(Debug)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<T: Transport> Transport for Retrying<T> {
    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.inner.send(batch).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };
            if attempt >= max_attempts {
                return Err(TransportError::RetriesExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            let delay = self.policy.delay_after(attempt);
            warn!(
                destination = %batch.destination(),
                batch_size = batch.len(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "🔄 delivery attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
