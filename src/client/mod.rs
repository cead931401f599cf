//! Client assembly
//!
//! [`Client`] wires one configuration and one transport into the endpoint
//! manager, session tracker, retry orchestrator and partition catalog, and
//! hands out query iterators and bulk plans that share them.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bulk::{plan_batches, Batch, BulkOptions, OperationInput};
use crate::core::{ClientConfig, ClientError, ClientResult, OperationType, ResourceType};
use crate::endpoint::{AccountReader, DatabaseAccount, EndpointManager};
use crate::hashing::{PartitionKey, PartitionKeyDefinition};
use crate::observability::Event;
use crate::query::{OrchestratedQueryClient, Page, QueryIterator, SqlQuery};
use crate::retry::ExecutionOrchestrator;
use crate::routing::{CompositeContinuationToken, FeedRange, PartitionCatalog, PartitionKeyRange, RangeSource};
use crate::session::SessionTracker;
use crate::transport::{Request, Response, Transport};

/// Reads account topology with a single direct send; no retry loop, since
/// the retry loop itself depends on the topology.
pub struct TransportAccountReader {
    transport: Arc<dyn Transport>,
}

impl TransportAccountReader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AccountReader for TransportAccountReader {
    async fn read_database_account(&self, endpoint: &str) -> ClientResult<DatabaseAccount> {
        let mut request = Request::new(ResourceType::DatabaseAccount, OperationType::Read, "");
        request.stamp();
        let response = self.transport.send(endpoint, &request).await?.into_result()?;
        serde_json::from_value(response.body)
            .map_err(|e| ClientError::internal(format!("Malformed account topology: {}", e)))
    }
}

/// Reads a container's `pkranges` feed through the retry loop.
pub struct OrchestratedRangeSource {
    orchestrator: Arc<ExecutionOrchestrator>,
    cancel: CancellationToken,
}

impl OrchestratedRangeSource {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>, cancel: CancellationToken) -> Self {
        Self { orchestrator, cancel }
    }

    fn ranges_of(response: &Response) -> ClientResult<Vec<PartitionKeyRange>> {
        let ranges = response
            .body
            .get("PartitionKeyRanges")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(ranges)
            .map_err(|e| ClientError::corrupt_catalog(format!("Malformed partition key ranges: {}", e)))
    }
}

#[async_trait]
impl RangeSource for OrchestratedRangeSource {
    async fn read_partition_key_ranges(&self, container: &str) -> ClientResult<Vec<PartitionKeyRange>> {
        let path = format!("{}/pkranges", container.trim_matches('/'));
        let started = Instant::now();
        let mut ranges = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = Request::new(ResourceType::PartitionKeyRange, OperationType::Read, path.as_str());
            request.set_continuation(continuation.as_deref());
            let response = self.orchestrator.execute(request, &self.cancel).await?;
            ranges.extend(Self::ranges_of(&response)?);
            continuation = response.headers.continuation().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        tracing::debug!(
            event = %Event::CatalogRefreshed,
            container,
            ranges = ranges.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "partition key ranges read"
        );
        Ok(ranges)
    }
}

/// Entry point: one account, one transport
pub struct Client {
    config: Arc<ClientConfig>,
    endpoints: Arc<EndpointManager>,
    sessions: Arc<SessionTracker>,
    orchestrator: Arc<ExecutionOrchestrator>,
    catalog: Arc<PartitionCatalog>,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> ClientResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let reader: Arc<dyn AccountReader> = Arc::new(TransportAccountReader::new(Arc::clone(&transport)));
        let endpoints = Arc::new(EndpointManager::new(&config, reader));
        let sessions = Arc::new(SessionTracker::new(config.consistency_level));
        let orchestrator = Arc::new(ExecutionOrchestrator::new(
            Arc::clone(&config),
            transport,
            Arc::clone(&endpoints),
            Arc::clone(&sessions),
        ));
        let cancel = CancellationToken::new();
        let source = Arc::new(OrchestratedRangeSource::new(Arc::clone(&orchestrator), cancel.clone()));
        let catalog = Arc::new(PartitionCatalog::new(source));

        tracing::debug!(endpoint = %config.endpoint, "client created");
        Ok(Self {
            config,
            endpoints,
            sessions,
            orchestrator,
            catalog,
            cancel,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.endpoints
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn catalog(&self) -> &Arc<PartitionCatalog> {
        &self.catalog
    }

    /// Cancels every in-flight operation of this client.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send one request through the retry loop.
    pub async fn execute(&self, request: Request) -> ClientResult<Response> {
        self.orchestrator.execute(request, &self.cancel).await
    }

    /// Iterator over a query against `container` (`dbs/{db}/colls/{coll}`).
    pub fn query(&self, container: &str, query: SqlQuery) -> QueryIterator {
        self.query_scoped(container, query, None)
    }

    /// Iterator over a query confined to one logical partition.
    pub fn query_partition(&self, container: &str, query: SqlQuery, key: PartitionKey) -> QueryIterator {
        self.query_scoped(container, query, Some(key))
    }

    fn query_scoped(&self, container: &str, query: SqlQuery, key: Option<PartitionKey>) -> QueryIterator {
        let container = container.trim_matches('/').to_string();
        let mut client = OrchestratedQueryClient::new(Arc::clone(&self.orchestrator), container.clone(), self.cancel.clone());
        if let Some(key) = key {
            client = client.with_partition_key(key);
        }
        QueryIterator::new(Arc::new(client), Arc::clone(&self.catalog), container, query, self.config.query.clone())
            .with_cancellation(self.cancel.clone())
    }

    /// Feed slices a saved composite continuation resumes from.
    pub async fn resume_feed(&self, container: &str, container_rid: &str, token: &str) -> ClientResult<Vec<FeedRange>> {
        let token = CompositeContinuationToken::parse(token)?;
        token.resolve(&self.catalog, container.trim_matches('/'), container_rid).await
    }

    /// Read the next page of one feed slice and advance its continuation.
    ///
    /// Slices covering part of a range are scoped by effective key bounds.
    pub async fn read_feed_page(&self, container: &str, feed: &mut FeedRange, page_size: u32) -> ClientResult<Page> {
        let path = format!("{}/docs", container.trim_matches('/'));
        let mut request = Request::new(ResourceType::Item, OperationType::Read, path);
        request.set_page_size(page_size);
        request.set_partition_key_range_id(&feed.range.id);
        request.set_continuation(feed.continuation.as_deref());
        if let (Some(min), Some(max)) = (&feed.epk_min, &feed.epk_max) {
            request.set_epk_bounds(min, max);
        }

        let response = self.execute(request).await?;
        feed.continuation = response.headers.continuation().map(str::to_string);
        Ok(Page {
            items: response.documents(),
            headers: response.headers,
        })
    }

    /// Group bulk operations into per-range batches.
    pub async fn plan_bulk(
        &self,
        container: &str,
        definition: &PartitionKeyDefinition,
        operations: Vec<OperationInput>,
        options: &BulkOptions,
    ) -> ClientResult<Vec<Batch>> {
        let map = self.catalog.routing_map(container.trim_matches('/'), false).await?;
        plan_batches(&map, definition, operations, options)
    }
}
