//! Bounded retry with a per-attempt timeout and exponential backoff.

use salesdesk_core::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Bound on a single attempt
    pub timeout: Duration,
    /// Delay before retry `n` (0-based) is `backoff_base * 2^n`
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(15),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// All attempts failed.
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: StoreError,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// Returns the value and the number of attempts it took. Invalid
    /// records are not retried.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok((value, attempt)),
                Ok(Err(e)) => e,
                Err(_) => StoreError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                },
            };

            let retryable = !matches!(error, StoreError::InvalidRecord(_));
            if !retryable || attempt >= max_attempts {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.backoff(attempt - 1);
            warn!(
                operation = label,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Upstream call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
