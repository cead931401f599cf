//! Query iterator
//!
//! A query first runs as a single stream routed by the service. When the
//! service answers that the query needs client-side post-processing, the
//! iterator fetches a query plan and switches to the cross-partition
//! pipeline built from it.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, Stream};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::budget::RequestBudget;
use super::client::{QueryClient, SqlQuery};
use super::default_context::DefaultContext;
use super::pipeline::{build_pipeline, PipelineContext};
use super::plan::QueryPlan;
use super::stage::Stage;
use crate::core::constants::status;
use crate::core::{ClientError, ClientResult, ErrorKind, Headers, QueryOptions};
use crate::observability::{Diagnostics, Event, MetadataKind};
use crate::routing::PartitionCatalog;

/// One page handed to the caller
#[derive(Debug, Clone, Default)]
pub struct FeedResponse {
    pub items: Vec<Value>,
    pub headers: Headers,
    pub has_more_results: bool,
    pub diagnostics: Diagnostics,
}

pub struct QueryIterator {
    client: Arc<dyn QueryClient>,
    catalog: Arc<PartitionCatalog>,
    container: String,
    query: SqlQuery,
    options: QueryOptions,
    budget: Arc<RequestBudget>,
    cancel: CancellationToken,
    context: Box<dyn Stage>,
    plan: Option<QueryPlan>,
    initialized: bool,
    diagnostics: Diagnostics,
}

impl QueryIterator {
    pub fn new(
        client: Arc<dyn QueryClient>,
        catalog: Arc<PartitionCatalog>,
        container: impl Into<String>,
        query: SqlQuery,
        options: QueryOptions,
    ) -> Self {
        let budget = Arc::new(RequestBudget::unlimited());
        let context = Self::default_context(&client, &query, &options, &budget);
        Self {
            client,
            catalog,
            container: container.into(),
            query,
            options,
            budget,
            cancel: CancellationToken::new(),
            context,
            plan: None,
            initialized: false,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Fail an operation once it has consumed more than `cap` request units.
    pub fn with_request_unit_cap(mut self, cap: f64) -> Self {
        self.budget = Arc::new(RequestBudget::new(Some(cap)));
        self.context = Self::default_context(&self.client, &self.query, &self.options, &self.budget);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn default_context(
        client: &Arc<dyn QueryClient>,
        query: &SqlQuery,
        options: &QueryOptions,
        budget: &Arc<RequestBudget>,
    ) -> Box<dyn Stage> {
        Box::new(DefaultContext::new(
            Arc::clone(client),
            query.clone(),
            options.max_item_count,
            Arc::clone(budget),
        ))
    }

    /// Query plan in use, once one was fetched
    pub fn plan(&self) -> Option<&QueryPlan> {
        self.plan.as_ref()
    }

    pub fn has_more_results(&self) -> bool {
        !self.initialized || self.context.has_more_results()
    }

    /// Start over from the first page.
    pub fn reset(&mut self) {
        self.context = Self::default_context(&self.client, &self.query, &self.options, &self.budget);
        self.plan = None;
        self.initialized = false;
        self.diagnostics = Diagnostics::new();
        self.budget.reset();
    }

    async fn init(&mut self) -> ClientResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        tracing::debug!(event = %Event::QueryStart, container = %self.container, "query started");
        if self.options.force_query_plan {
            self.create_pipeline().await?;
        }
        Ok(())
    }

    async fn create_pipeline(&mut self) -> ClientResult<()> {
        let started = Instant::now();
        let plan = self.client.fetch_query_plan(&self.query).await;
        self.diagnostics.record_metadata(MetadataKind::QueryPlan, started.elapsed());
        let plan = plan?;

        let ctx = PipelineContext {
            client: Arc::clone(&self.client),
            catalog: Arc::clone(&self.catalog),
            container: self.container.clone(),
            options: self.options.clone(),
            budget: Arc::clone(&self.budget),
        };
        self.context = build_pipeline(ctx, &self.query, &plan)?;
        self.plan = Some(plan);
        Ok(())
    }

    fn wants_plan(&self, err: &ClientError) -> bool {
        self.plan.is_none() && err.needs_query_plan()
    }

    /// Attach diagnostics; an unrepaired split becomes a retryable 503.
    fn surface(&self, err: ClientError) -> ClientError {
        let mut err = if err.is_partition_split() {
            let mut wrapped = ClientError::service(
                status::SERVICE_UNAVAILABLE,
                err.headers.clone(),
                format!(
                    "Encountered partition split and could not recover. This request is retryable: {}",
                    err.message
                ),
            );
            wrapped.diagnostics = err.diagnostics;
            wrapped
        } else {
            err
        };
        err.diagnostics.absorb(&self.diagnostics);
        err
    }

    fn respond(&self, items: Vec<Value>, headers: Headers) -> FeedResponse {
        FeedResponse {
            items,
            headers,
            has_more_results: self.has_more_results(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Next page of at most `max_item_count` results.
    pub async fn fetch_next(&mut self) -> ClientResult<FeedResponse> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::cancelled()),
            result = self.fetch_next_page() => result,
        }
    }

    async fn fetch_next_page(&mut self) -> ClientResult<FeedResponse> {
        self.budget.reset();
        self.init().await.map_err(|e| self.surface(e))?;

        let page_size = self.options.max_item_count.max(1) as usize;
        let page = match self.context.fetch_more(page_size).await {
            Ok(page) => page,
            Err(e) if self.wants_plan(&e) => {
                tracing::info!(event = %Event::QueryPlanRequired, container = %self.container, "switching to cross-partition execution");
                self.create_pipeline().await.map_err(|e| self.surface(e))?;
                self.context.fetch_more(page_size).await.map_err(|e| self.surface(e))?
            }
            Err(e) => return Err(self.surface(e)),
        };
        if !self.has_more_results() {
            tracing::debug!(event = %Event::QueryComplete, container = %self.container, "query drained");
        }
        Ok(self.respond(page.items, page.headers))
    }

    /// Every remaining result, from the first page.
    ///
    /// A budget fault carries every result gathered before it.
    pub async fn fetch_all(&mut self) -> ClientResult<FeedResponse> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::cancelled()),
            result = self.drain() => result,
        }
    }

    async fn drain(&mut self) -> ClientResult<FeedResponse> {
        self.reset();
        self.init().await.map_err(|e| self.surface(e))?;

        let mut items = Vec::new();
        let mut headers = Headers::new();
        while self.context.has_more_results() {
            match self.context.next_item().await {
                Ok(next) => {
                    headers.merge_from(&next.headers);
                    items.extend(next.item);
                }
                Err(e) if self.wants_plan(&e) => {
                    tracing::info!(event = %Event::QueryPlanRequired, container = %self.container, "switching to cross-partition execution");
                    self.create_pipeline().await.map_err(|e| self.surface(e))?;
                }
                Err(mut e) => {
                    if e.kind == ErrorKind::BudgetExceeded {
                        let buffered = std::mem::take(&mut e.fetched_results);
                        e.fetched_results = std::mem::take(&mut items);
                        e.fetched_results.extend(buffered);
                    }
                    return Err(self.surface(e));
                }
            }
        }
        tracing::debug!(event = %Event::QueryComplete, container = %self.container, results = items.len(), "query drained");
        Ok(self.respond(items, headers))
    }

    /// Pages as a stream; ends after the last page or the first error.
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<FeedResponse>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut iterator = state?;
            if !iterator.has_more_results() {
                return None;
            }
            match iterator.fetch_next().await {
                Ok(page) => Some((Ok(page), Some(iterator))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
