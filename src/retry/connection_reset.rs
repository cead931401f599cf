//! Fallback policy: connection resets on idempotent reads

use std::time::Duration;

use async_trait::async_trait;

use super::policy::{RequestInfo, RetryContext, RetryPolicy};
use crate::core::{ClientError, ErrorKind, FailoverOptions, OperationType};

pub struct ConnectionResetRetryPolicy {
    info: RequestInfo,
    max_retries: u32,
    retry_after: Duration,
    attempts: u32,
}

impl ConnectionResetRetryPolicy {
    pub fn new(info: RequestInfo, options: &FailoverOptions) -> Self {
        Self {
            info,
            max_retries: options.connection_reset_max_retries,
            retry_after: Duration::from_millis(options.connection_reset_retry_after_ms),
            attempts: 0,
        }
    }
}

#[async_trait]
impl RetryPolicy for ConnectionResetRetryPolicy {
    fn name(&self) -> &'static str {
        "connection_reset"
    }

    async fn should_retry(&mut self, err: &ClientError, _ctx: &mut RetryContext, _endpoint: &str) -> Option<Duration> {
        let idempotent = matches!(self.info.operation_type, OperationType::Read | OperationType::Query);
        if err.kind != ErrorKind::ConnectionReset || !idempotent || self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        Some(self.retry_after)
    }
}
