//! Retry policy contract and per-request retry state

use std::time::Duration;

use async_trait::async_trait;

use crate::core::{ClientError, OperationType, ResourceType};
use crate::core::constants::headers as names;
use crate::transport::Request;

/// Routing hints a policy leaves for the next attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Attempts retried so far for this logical request
    pub retry_count: u32,
    /// Start index for the endpoint walk on the next attempt
    pub location_index: Option<usize>,
    /// Drop the session token before the next attempt
    pub clear_session_token: bool,
    /// Next attempt may use a non-primary preferred region
    pub retry_on_preferred_locations: bool,
    /// Next attempt goes to the primary write region
    pub route_to_write_endpoint: bool,
}

/// What a policy needs to know about the request it guards
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub resource_type: ResourceType,
    pub operation_type: OperationType,
    pub is_query_plan: bool,
}

impl RequestInfo {
    pub fn of(request: &Request) -> Self {
        Self {
            resource_type: request.resource_type,
            operation_type: request.operation_type,
            is_query_plan: request.operation_type == OperationType::QueryPlan
                || request.headers.contains(names::IS_QUERY_PLAN_REQUEST),
        }
    }

    pub fn is_read(&self) -> bool {
        self.operation_type.is_read_only()
    }
}

/// One retry policy.
///
/// Policies are stateful for the lifetime of one logical request: they
/// count their own attempts against their own caps.
#[async_trait]
pub trait RetryPolicy: Send {
    fn name(&self) -> &'static str;

    /// `Some(delay)` to retry after `delay`, `None` to surface `err`.
    async fn should_retry(
        &mut self,
        err: &ClientError,
        ctx: &mut RetryContext,
        endpoint: &str,
    ) -> Option<Duration>;
}
