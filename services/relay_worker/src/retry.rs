//! Bounded retry around a single relay submission
//!
//! Attempt `k` that ends retryable is followed by a delay of `base × k`
//! before attempt `k + 1`. Nothing sleeps after the last attempt.

use crate::adapter::{RelayAdapter, RelayResult};
use crate::metrics::RelayWorkerMetrics;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub result: RelayResult,
    pub attempts: u32,
    /// Still retryable when the attempts ran out
    pub exhausted: bool,
}

pub async fn relay_with_retry(
    adapter: &dyn RelayAdapter,
    messages: &[Bytes],
    policy: RetryPolicy,
    metrics: &RelayWorkerMetrics,
) -> RelayOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match adapter.relay(messages).await {
            Ok(result) => result,
            Err(e) => {
                error!("Relay attempt {} failed: {}", attempt, e);
                RelayResult::fail()
            }
        };

        let retry = result.code.is_retryable();
        if !result.code.is_known() {
            warn!("Unexpected relay result code {}, treating as retryable", result.code);
        }
        debug!(
            "Relay attempt {} of {}: result {}, retry {}",
            attempt, policy.max_attempts, result.code, retry
        );

        if !retry {
            return RelayOutcome {
                result,
                attempts: attempt,
                exhausted: false,
            };
        }
        if attempt >= policy.max_attempts {
            error!("Failed to relay batch, retry count exceeded");
            metrics.retries_exceeded.inc();
            return RelayOutcome {
                result,
                attempts: attempt,
                exhausted: true,
            };
        }

        metrics.retries.inc();
        let delay = policy.delay_after(attempt);
        if !delay.is_zero() {
            debug!("Delaying {:?} before retrying", delay);
            tokio::time::sleep(delay).await;
        }
    }
}
