use std::future::Future;
use std::time::Duration;

use crate::error::Result;

pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_RETRIES: u32 = 3;

/// Exponential backoff with ±25% jitter for read-type calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: RETRY_BASE_DELAY,
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// delay = base * 2^attempt, then jittered.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));

        let jitter_range = delay_ms / 4;
        let delay_ms = if jitter_range > 0 {
            let offset = rand::random::<u64>() % (jitter_range * 2);
            delay_ms - jitter_range + offset
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        label,
                        e,
                        delay,
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
