//! Cross-region failover on 503 and client timeouts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::policy::{RequestInfo, RetryContext, RetryPolicy};
use crate::core::{ClientError, ErrorKind, FailoverOptions};
use crate::endpoint::EndpointManager;

/// Moves the next attempt to another region.
///
/// Timeouts are retried only for reads, queries and query-plan requests.
/// Writes fail over only when multi-region writes are usable.
pub struct TimeoutFailoverRetryPolicy {
    endpoints: Arc<EndpointManager>,
    info: RequestInfo,
    max_service_unavailable_retries: u32,
    max_retries: u32,
    failover_count: u32,
}

impl TimeoutFailoverRetryPolicy {
    pub fn new(endpoints: Arc<EndpointManager>, info: RequestInfo, options: &FailoverOptions) -> Self {
        Self {
            endpoints,
            info,
            max_service_unavailable_retries: options.max_service_unavailable_retries,
            max_retries: options.max_timeout_retries,
            failover_count: 0,
        }
    }

    fn timeout_retryable(&self) -> bool {
        self.info.is_read() || self.info.is_query_plan
    }

    /// Next region index: over preferred locations when configured, else
    /// over the account's endpoints for the request's direction.
    async fn endpoint_index(&self) -> usize {
        let count = self.failover_count as usize;
        let preferred = self.endpoints.preferred_locations_count();
        if preferred > 0 {
            return count % preferred;
        }
        let candidates = if self.info.is_read() {
            self.endpoints.read_endpoints().await
        } else {
            self.endpoints.write_endpoints().await
        };
        match candidates {
            Ok(list) if !list.is_empty() => count % list.len(),
            _ => 0,
        }
    }
}

#[async_trait]
impl RetryPolicy for TimeoutFailoverRetryPolicy {
    fn name(&self) -> &'static str {
        "timeout_failover"
    }

    async fn should_retry(&mut self, err: &ClientError, ctx: &mut RetryContext, endpoint: &str) -> Option<Duration> {
        if endpoint.is_empty() {
            return None;
        }
        if err.kind == ErrorKind::Timeout && !self.timeout_retryable() {
            return None;
        }
        if !self.endpoints.endpoint_discovery_enabled() {
            return None;
        }
        if err.is_service_unavailable() && self.failover_count >= self.max_service_unavailable_retries {
            return None;
        }
        if self.failover_count >= self.max_retries {
            return None;
        }
        let multi_write = self
            .endpoints
            .can_use_multiple_write_locations(self.info.resource_type, self.info.operation_type);
        if !multi_write && !self.info.is_read() {
            return None;
        }

        self.failover_count += 1;
        ctx.retry_count += 1;
        ctx.location_index = Some(self.endpoint_index().await);
        ctx.route_to_write_endpoint = false;
        Some(Duration::ZERO)
    }
}
