//! Single-stream context used before a query plan is known

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::budget::RequestBudget;
use super::client::{Page, QueryClient, SqlQuery};
use super::stage::{ItemResponse, Stage};
use crate::core::constants::headers as names;
use crate::core::{ClientResult, Headers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Start,
    InProgress,
    Ended,
}

/// Pages one query without pinning a partition range; the service routes it.
pub struct DefaultContext {
    client: Arc<dyn QueryClient>,
    query: SqlQuery,
    page_size: u32,
    budget: Arc<RequestBudget>,
    continuation: Option<String>,
    state: ContextState,
    buffer: VecDeque<Value>,
}

impl DefaultContext {
    pub fn new(client: Arc<dyn QueryClient>, query: SqlQuery, page_size: u32, budget: Arc<RequestBudget>) -> Self {
        Self {
            client,
            query,
            page_size,
            budget,
            continuation: None,
            state: ContextState::Start,
            buffer: VecDeque::new(),
        }
    }

    /// Resume from a continuation returned by an earlier page.
    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    async fn fetch_page(&mut self) -> ClientResult<Page> {
        self.budget.check()?;
        let page = self
            .client
            .fetch_page(&self.query, None, self.continuation.as_deref(), self.page_size)
            .await?;
        self.budget.charge(page.headers.request_charge());
        self.continuation = page.headers.continuation().map(str::to_string);
        self.state = if self.continuation.is_some() {
            ContextState::InProgress
        } else {
            ContextState::Ended
        };
        Ok(page)
    }
}

#[async_trait]
impl Stage for DefaultContext {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(ItemResponse::item(item, Headers::new()));
        }
        if self.state == ContextState::Ended {
            return Ok(ItemResponse::default());
        }
        let page = self.fetch_page().await?;
        self.buffer.extend(page.items);
        Ok(ItemResponse::empty(page.headers).with_item(self.buffer.pop_front()))
    }

    fn has_more_results(&self) -> bool {
        !self.buffer.is_empty() || self.state != ContextState::Ended
    }

    /// One service page at a time, continuation header included.
    async fn fetch_more(&mut self, max_items: usize) -> ClientResult<Page> {
        if !self.buffer.is_empty() {
            let take = max_items.min(self.buffer.len());
            let mut page = Page {
                items: self.buffer.drain(..take).collect(),
                headers: Headers::new(),
            };
            if let Some(continuation) = &self.continuation {
                page.headers.insert(names::CONTINUATION, continuation.as_str());
            }
            return Ok(page);
        }
        if self.state == ContextState::Ended {
            return Ok(Page::default());
        }
        self.fetch_page().await
    }
}
