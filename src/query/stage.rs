//! Stage contract shared by the merger, the pipeline stages and the
//! single-stream context.

use async_trait::async_trait;
use serde_json::Value;

use super::client::Page;
use crate::core::{ClientResult, Headers};

/// One pull from a stage
#[derive(Debug, Clone, Default)]
pub struct ItemResponse {
    /// `None` while [`Stage::has_more_results`] is still true means the stage
    /// consumed input without producing output yet.
    pub item: Option<Value>,
    /// Headers of the pages fetched to produce this pull
    pub headers: Headers,
}

impl ItemResponse {
    pub fn item(item: Value, headers: Headers) -> Self {
        Self {
            item: Some(item),
            headers,
        }
    }

    pub fn empty(headers: Headers) -> Self {
        Self { item: None, headers }
    }

    pub fn with_item(mut self, item: Option<Value>) -> Self {
        self.item = item;
        self
    }
}

#[async_trait]
pub trait Stage: Send {
    async fn next_item(&mut self) -> ClientResult<ItemResponse>;

    fn has_more_results(&self) -> bool;

    /// Up to `max_items` results.
    ///
    /// Pulls item by item by default; stages that already fetch whole pages
    /// return them directly.
    async fn fetch_more(&mut self, max_items: usize) -> ClientResult<Page> {
        let mut page = Page::default();
        while page.items.len() < max_items && self.has_more_results() {
            let next = self.next_item().await?;
            page.headers.merge_from(&next.headers);
            if let Some(item) = next.item {
                page.items.push(item);
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::ClientError;
    use std::collections::VecDeque;

    /// In-memory stage; `gaps` interleaves an empty pull before each item.
    pub(crate) struct VecStage {
        items: VecDeque<Option<Value>>,
        fail_at_end: Option<ClientError>,
    }

    impl VecStage {
        pub(crate) fn new(items: Vec<Value>) -> Self {
            Self {
                items: items.into_iter().map(Some).collect(),
                fail_at_end: None,
            }
        }

        pub(crate) fn boxed(items: Vec<Value>) -> Box<dyn Stage> {
            Box::new(Self::new(items))
        }

        pub(crate) fn boxed_with_gaps(items: Vec<Value>) -> Box<dyn Stage> {
            Box::new(Self {
                items: items.into_iter().flat_map(|v| [None, Some(v)]).collect(),
                fail_at_end: None,
            })
        }

        pub(crate) fn failing(items: Vec<Value>, err: ClientError) -> Box<dyn Stage> {
            Box::new(Self {
                fail_at_end: Some(err),
                ..Self::new(items)
            })
        }
    }

    #[async_trait]
    impl Stage for VecStage {
        async fn next_item(&mut self) -> ClientResult<ItemResponse> {
            match self.items.pop_front() {
                Some(item) => {
                    let mut headers = Headers::new();
                    headers.set_request_charge(1.0);
                    Ok(ItemResponse { item, headers })
                }
                None => match self.fail_at_end.take() {
                    Some(err) => Err(err),
                    None => Ok(ItemResponse::default()),
                },
            }
        }

        fn has_more_results(&self) -> bool {
            !self.items.is_empty() || self.fail_at_end.is_some()
        }
    }

    #[tokio::test]
    async fn test_fetch_more_merges_headers() {
        let mut stage = VecStage::new(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let page = stage.fetch_more(2).await.unwrap();
        assert_eq!(page.items, vec![Value::from(1), Value::from(2)]);
        assert_eq!(page.headers.request_charge(), 2.0);
        let rest = stage.fetch_more(10).await.unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!stage.has_more_results());
    }
}
