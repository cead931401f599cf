//! Retry on 404/1002 (read session not available)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::policy::{RequestInfo, RetryContext, RetryPolicy};
use crate::core::ClientError;
use crate::endpoint::EndpointManager;

/// The contacted replica has not caught up to our session token.
///
/// With multi-region writes every endpoint of the request's direction is
/// tried in turn and the token is dropped for the last one. Otherwise one
/// retry goes to the primary write region without a token.
pub struct SessionReadRetryPolicy {
    endpoints: Arc<EndpointManager>,
    info: RequestInfo,
    attempts: u32,
}

impl SessionReadRetryPolicy {
    pub fn new(endpoints: Arc<EndpointManager>, info: RequestInfo) -> Self {
        Self {
            endpoints,
            info,
            attempts: 0,
        }
    }
}

#[async_trait]
impl RetryPolicy for SessionReadRetryPolicy {
    fn name(&self) -> &'static str {
        "session_read"
    }

    async fn should_retry(&mut self, _err: &ClientError, ctx: &mut RetryContext, _endpoint: &str) -> Option<Duration> {
        if !self.endpoints.endpoint_discovery_enabled() {
            return None;
        }

        if self
            .endpoints
            .can_use_multiple_write_locations(self.info.resource_type, self.info.operation_type)
        {
            let candidates = if self.info.is_read() {
                self.endpoints.read_endpoints().await
            } else {
                self.endpoints.write_endpoints().await
            };
            let count = candidates.map(|c| c.len()).unwrap_or(0).max(1) as u32;
            if self.attempts >= count {
                return None;
            }
            self.attempts += 1;
            ctx.retry_count += 1;
            ctx.retry_on_preferred_locations = self.attempts > 1;
            ctx.clear_session_token = self.attempts == count;
            ctx.route_to_write_endpoint = false;
            ctx.location_index = Some((self.attempts - 1) as usize);
        } else {
            if self.attempts >= 1 {
                return None;
            }
            self.attempts += 1;
            ctx.retry_count += 1;
            ctx.retry_on_preferred_locations = false;
            ctx.clear_session_token = true;
            ctx.route_to_write_endpoint = true;
            ctx.location_index = None;
        }
        Some(Duration::ZERO)
    }
}
