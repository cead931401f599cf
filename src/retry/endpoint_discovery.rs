//! Retry after DNS/connect failures and region-level 403s

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::policy::{RequestInfo, RetryContext, RetryPolicy};
use crate::core::{ClientError, FailoverOptions};
use crate::endpoint::EndpointManager;

/// Marks the failing endpoint unavailable for the request's direction and
/// moves on to the next one.
pub struct EndpointDiscoveryRetryPolicy {
    endpoints: Arc<EndpointManager>,
    info: RequestInfo,
    max_retries: u32,
    retry_after: Duration,
    attempts: u32,
}

impl EndpointDiscoveryRetryPolicy {
    pub fn new(endpoints: Arc<EndpointManager>, info: RequestInfo, options: &FailoverOptions) -> Self {
        Self {
            endpoints,
            info,
            max_retries: options.endpoint_discovery_max_retries,
            retry_after: Duration::from_millis(options.endpoint_discovery_retry_after_ms),
            attempts: 0,
        }
    }
}

#[async_trait]
impl RetryPolicy for EndpointDiscoveryRetryPolicy {
    fn name(&self) -> &'static str {
        "endpoint_discovery"
    }

    async fn should_retry(&mut self, _err: &ClientError, ctx: &mut RetryContext, endpoint: &str) -> Option<Duration> {
        if endpoint.is_empty() || !self.endpoints.endpoint_discovery_enabled() {
            return None;
        }
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;

        if self.info.is_read() {
            self.endpoints.mark_unavailable_for_read(endpoint).await;
        } else {
            self.endpoints.mark_unavailable_for_write(endpoint).await;
        }

        ctx.retry_count = self.attempts;
        ctx.location_index = None;
        ctx.clear_session_token = false;
        ctx.retry_on_preferred_locations = false;
        ctx.route_to_write_endpoint = false;
        Some(self.retry_after)
    }
}
