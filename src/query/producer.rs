//! Partition producer: pages of one query against one partition key range

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

use super::budget::RequestBudget;
use super::client::{QueryClient, SqlQuery};
use crate::core::{ClientError, ClientResult, Headers};
use crate::observability::Event;
use crate::routing::PartitionKeyRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Start,
    InProgress,
    Ended,
    Faulted,
}

/// Fetches and buffers one range's pages.
///
/// Fetch faults are buffered behind already-fetched results instead of
/// being raised at once, so ordered results ahead of a fault are never
/// discarded. A faulted producer never retries its range; the merger
/// replaces it.
pub struct PartitionProducer {
    client: Arc<dyn QueryClient>,
    query: SqlQuery,
    range: PartitionKeyRange,
    page_size: u32,
    budget: Arc<RequestBudget>,
    continuation: Option<String>,
    buffer: VecDeque<Value>,
    fault: Option<ClientError>,
    started: bool,
    all_fetched: bool,
    generation: u64,
    headers: Headers,
}

impl PartitionProducer {
    pub fn new(
        client: Arc<dyn QueryClient>,
        query: SqlQuery,
        range: PartitionKeyRange,
        continuation: Option<String>,
        page_size: u32,
        budget: Arc<RequestBudget>,
    ) -> Self {
        Self {
            client,
            query,
            range,
            page_size,
            budget,
            continuation,
            buffer: VecDeque::new(),
            fault: None,
            started: false,
            all_fetched: false,
            generation: 0,
            headers: Headers::new(),
        }
    }

    pub fn range(&self) -> &PartitionKeyRange {
        &self.range
    }

    /// Continuation of the next page to fetch (of the failed page, after a fault)
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// Pages fetched so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ProducerState {
        if self.fault.is_some() {
            ProducerState::Faulted
        } else if self.all_fetched {
            ProducerState::Ended
        } else if self.started {
            ProducerState::InProgress
        } else {
            ProducerState::Start
        }
    }

    /// Head result, if one is already buffered.
    pub fn peek(&self) -> Option<&Value> {
        self.buffer.front()
    }

    /// Head entry is a fault.
    pub fn has_buffered_fault(&self) -> bool {
        self.buffer.is_empty() && self.fault.is_some()
    }

    /// Head entry is a fault saying the range split or moved.
    pub fn got_split(&self) -> bool {
        self.buffer.is_empty() && self.fault.as_ref().map_or(false, ClientError::is_partition_split)
    }

    pub fn fault(&self) -> Option<&ClientError> {
        self.fault.as_ref()
    }

    /// Nothing buffered and nothing left to fetch.
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.fault.is_none() && self.all_fetched
    }

    /// Fetched results not yet consumed
    pub fn buffered_items(&self) -> impl Iterator<Item = &Value> {
        self.buffer.iter()
    }

    /// Headers of pages fetched since the last call.
    pub fn take_headers(&mut self) -> Headers {
        std::mem::take(&mut self.headers)
    }

    async fn fetch_page(&mut self) -> ClientResult<()> {
        self.budget.check()?;
        let page = self
            .client
            .fetch_page(&self.query, Some(&self.range), self.continuation.as_deref(), self.page_size)
            .await?;
        self.budget.charge(page.headers.request_charge());

        self.started = true;
        self.generation += 1;
        self.continuation = page.headers.continuation().map(str::to_string);
        self.all_fetched = self.continuation.is_none();
        self.headers.merge_from(&page.headers);
        tracing::trace!(
            event = %Event::ProducerFetch,
            range = %self.range.id,
            items = page.items.len(),
            generation = self.generation,
            done = self.all_fetched,
            "page fetched"
        );
        self.buffer.extend(page.items);
        Ok(())
    }

    /// Fetch until something is buffered, a fault is held, or the range is
    /// drained. Empty pages with a continuation are skipped.
    async fn fill(&mut self) {
        while self.buffer.is_empty() && self.fault.is_none() && !self.all_fetched {
            if let Err(e) = self.fetch_page().await {
                self.fault = Some(e);
            }
        }
    }

    /// Head result without consuming it.
    pub async fn current(&mut self) -> ClientResult<Option<&Value>> {
        self.fill().await;
        if let Some(head) = self.buffer.front() {
            return Ok(Some(head));
        }
        match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(None),
        }
    }

    /// Consume the head result.
    pub async fn next_item(&mut self) -> ClientResult<Option<Value>> {
        self.fill().await;
        if let Some(head) = self.buffer.pop_front() {
            return Ok(Some(head));
        }
        match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(None),
        }
    }

    /// Buffer the first result; true when one is available.
    pub async fn prefetch(&mut self) -> ClientResult<bool> {
        self.current().await.map(|head| head.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::headers as names;
    use crate::query::client::Page;
    use crate::query::plan::QueryPlan;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Pages keyed by continuation ("" for the first page).
    struct Paged {
        pages: HashMap<String, ClientResult<(Vec<Value>, Option<&'static str>)>>,
        calls: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl QueryClient for Paged {
        async fn fetch_page(
            &self,
            _query: &SqlQuery,
            _range: Option<&PartitionKeyRange>,
            continuation: Option<&str>,
            _page_size: u32,
        ) -> ClientResult<Page> {
            self.calls.lock().unwrap().push(continuation.map(str::to_string));
            let (items, next) = self.pages[continuation.unwrap_or("")].clone()?;
            let mut headers = Headers::new();
            headers.set_request_charge(1.0);
            if let Some(next) = next {
                headers.insert(names::CONTINUATION, next);
            }
            Ok(Page { items, headers })
        }

        async fn fetch_query_plan(&self, _query: &SqlQuery) -> ClientResult<QueryPlan> {
            Ok(QueryPlan::default())
        }
    }

    fn producer(pages: Vec<(&str, ClientResult<(Vec<Value>, Option<&'static str>)>)>) -> (PartitionProducer, Arc<Paged>) {
        let client = Arc::new(Paged {
            pages: pages.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: Mutex::new(Vec::new()),
        });
        let producer = PartitionProducer::new(
            client.clone(),
            SqlQuery::new("SELECT * FROM c"),
            PartitionKeyRange::new("0", "", "FF"),
            None,
            10,
            Arc::new(RequestBudget::unlimited()),
        );
        (producer, client)
    }

    fn gone() -> ClientError {
        let headers: Headers = [(names::SUB_STATUS, "1002")].into_iter().collect();
        ClientError::service(410, headers, "gone")
    }

    #[tokio::test]
    async fn test_pages_through_empty_pages() {
        let (mut p, client) = producer(vec![
            ("", Ok((vec![], Some("c1")))),
            ("c1", Ok((vec![json!(1), json!(2)], None))),
        ]);
        assert_eq!(p.state(), ProducerState::Start);
        assert_eq!(p.current().await.unwrap(), Some(&json!(1)));
        assert_eq!(client.calls.lock().unwrap().len(), 2);
        assert_eq!(p.next_item().await.unwrap(), Some(json!(1)));
        assert_eq!(p.next_item().await.unwrap(), Some(json!(2)));
        assert_eq!(p.next_item().await.unwrap(), None);
        assert!(p.is_exhausted());
        assert_eq!(p.state(), ProducerState::Ended);
        assert_eq!(p.generation(), 2);
        assert_eq!(p.take_headers().request_charge(), 2.0);
    }

    #[tokio::test]
    async fn test_fault_is_held_behind_buffered_results() {
        let (mut p, _) = producer(vec![("", Ok((vec![json!("a")], Some("c1")))), ("c1", Err(gone()))]);
        assert_eq!(p.next_item().await.unwrap(), Some(json!("a")));
        assert!(!p.got_split());

        let err = p.current().await.unwrap_err();
        assert!(err.is_partition_split());
        assert!(p.got_split());
        assert_eq!(p.state(), ProducerState::Faulted);
        // the failed page's continuation is kept for the replacements
        assert_eq!(p.continuation(), Some("c1"));
    }

    #[tokio::test]
    async fn test_budget_checked_before_fetch() {
        let (mut p, client) = producer(vec![("", Ok((vec![json!(1)], Some("c1")))), ("c1", Ok((vec![json!(2)], None)))]);
        p.budget = Arc::new(RequestBudget::new(Some(0.5)));
        assert_eq!(p.next_item().await.unwrap(), Some(json!(1)));
        let err = p.next_item().await.unwrap_err();
        assert_eq!(err.kind, crate::core::ErrorKind::BudgetExceeded);
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }
}
