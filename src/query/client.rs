//! Query fetch seam and its orchestrator-backed implementation

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::plan::QueryPlan;
use crate::core::{ClientError, ClientResult, Headers, OperationType, ResourceType};
use crate::hashing::PartitionKey;
use crate::observability::{Diagnostics, Event, MetadataKind};
use crate::retry::ExecutionOrchestrator;
use crate::routing::PartitionKeyRange;
use crate::transport::Request;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

/// Query text plus parameters, as sent in request bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

impl SqlQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(SqlParameter {
            name: name.into(),
            value,
        });
        self
    }

    /// Same parameters, different text.
    pub fn with_text(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: self.parameters.clone(),
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub headers: Headers,
}

/// Fetches query pages and plans.
///
/// `range` pins a page request to one partition key range; `None` lets the
/// service route it.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn fetch_page(
        &self,
        query: &SqlQuery,
        range: Option<&PartitionKeyRange>,
        continuation: Option<&str>,
        page_size: u32,
    ) -> ClientResult<Page>;

    async fn fetch_query_plan(&self, query: &SqlQuery) -> ClientResult<QueryPlan>;
}

/// [`QueryClient`] that sends real requests through the retry loop.
pub struct OrchestratedQueryClient {
    orchestrator: Arc<ExecutionOrchestrator>,
    container_link: String,
    partition_key: Option<PartitionKey>,
    cancel: CancellationToken,
}

impl OrchestratedQueryClient {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>, container_link: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            orchestrator,
            container_link: container_link.into().trim_matches('/').to_string(),
            partition_key: None,
            cancel,
        }
    }

    /// Scope every page request to one logical partition.
    pub fn with_partition_key(mut self, key: PartitionKey) -> Self {
        self.partition_key = Some(key);
        self
    }

    fn docs_path(&self) -> String {
        format!("{}/docs", self.container_link)
    }

    fn body(query: &SqlQuery) -> ClientResult<Value> {
        serde_json::to_value(query).map_err(|e| ClientError::internal(format!("Failed to encode query: {}", e)))
    }
}

#[async_trait]
impl QueryClient for OrchestratedQueryClient {
    async fn fetch_page(
        &self,
        query: &SqlQuery,
        range: Option<&PartitionKeyRange>,
        continuation: Option<&str>,
        page_size: u32,
    ) -> ClientResult<Page> {
        let mut request = Request::new(ResourceType::Item, OperationType::Query, self.docs_path())
            .with_body(Self::body(query)?);
        request.mark_query();
        request.set_page_size(page_size);
        request.set_continuation(continuation);
        match (range, &self.partition_key) {
            (Some(range), _) => request.set_partition_key_range_id(&range.id),
            (None, Some(key)) => request.set_partition_key(key),
            (None, None) => {}
        }

        let response = self.orchestrator.execute(request, &self.cancel).await?;
        Ok(Page {
            items: response.documents(),
            headers: response.headers,
        })
    }

    async fn fetch_query_plan(&self, query: &SqlQuery) -> ClientResult<QueryPlan> {
        let mut request = Request::new(ResourceType::Item, OperationType::QueryPlan, self.docs_path())
            .with_body(Self::body(query)?);
        request.mark_query_plan();

        let started = Instant::now();
        let response = self.orchestrator.execute(request, &self.cancel).await?;
        let plan: QueryPlan = serde_json::from_value(response.body).map_err(|e| {
            let mut diagnostics = Diagnostics::new();
            diagnostics.record_metadata(MetadataKind::QueryPlan, started.elapsed());
            ClientError::internal(format!("Malformed query plan: {}", e)).with_diagnostics(diagnostics)
        })?;
        tracing::debug!(
            event = %Event::QueryPlanFetched,
            container = %self.container_link,
            order_by = plan.query_info.order_by.len(),
            aggregates = plan.query_info.aggregates.len(),
            ranges = plan.query_ranges.len(),
            "query plan fetched"
        );
        Ok(plan)
    }
}
