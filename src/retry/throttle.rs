//! Retry on 429 Too Many Requests

use std::time::Duration;

use async_trait::async_trait;

use super::policy::{RetryContext, RetryPolicy};
use crate::core::{ClientError, RetryOptions};

/// Waits the server's retry-after (or a fixed interval) and retries the same
/// endpoint, bounded by an attempt cap and a cumulative wait cap.
pub struct ResourceThrottleRetryPolicy {
    max_attempts: u32,
    fixed_interval: Option<Duration>,
    max_wait: Duration,
    attempts: u32,
    cumulative_wait: Duration,
}

impl ResourceThrottleRetryPolicy {
    pub fn new(options: &RetryOptions) -> Self {
        Self {
            max_attempts: options.max_retry_attempt_count,
            fixed_interval: (options.fixed_retry_interval_ms > 0)
                .then(|| Duration::from_millis(options.fixed_retry_interval_ms)),
            max_wait: Duration::from_secs(options.max_wait_time_secs),
            attempts: 0,
            cumulative_wait: Duration::ZERO,
        }
    }

    /// Throttle retries performed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cumulative_wait(&self) -> Duration {
        self.cumulative_wait
    }
}

#[async_trait]
impl RetryPolicy for ResourceThrottleRetryPolicy {
    fn name(&self) -> &'static str {
        "resource_throttle"
    }

    async fn should_retry(&mut self, err: &ClientError, _ctx: &mut RetryContext, _endpoint: &str) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;

        let delay = self
            .fixed_interval
            .or(err.retry_after)
            .unwrap_or(Duration::ZERO);
        if self.cumulative_wait >= self.max_wait {
            return None;
        }
        self.cumulative_wait += delay;
        Some(delay)
    }
}
