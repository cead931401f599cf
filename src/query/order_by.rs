//! Order-by unwrap: strips `orderByItems` from merged rows

use async_trait::async_trait;
use serde_json::Value;

use super::stage::{ItemResponse, Stage};
use crate::core::{ClientResult, ErrorKind};

/// Yields the `payload` of each ordered row.
pub struct OrderByStage {
    inner: Box<dyn Stage>,
}

impl OrderByStage {
    pub fn new(inner: Box<dyn Stage>) -> Self {
        Self { inner }
    }
}

/// Payload of an ordered row; `None` when the row projected nothing.
pub(crate) fn unwrap_payload(row: Value) -> Option<Value> {
    match row {
        Value::Object(mut fields) => fields.remove("payload"),
        _ => None,
    }
}

#[async_trait]
impl Stage for OrderByStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        match self.inner.next_item().await {
            Ok(next) => Ok(ItemResponse {
                item: next.item.and_then(unwrap_payload),
                headers: next.headers,
            }),
            Err(mut e) => {
                if e.kind == ErrorKind::BudgetExceeded {
                    e.fetched_results = std::mem::take(&mut e.fetched_results)
                        .into_iter()
                        .filter_map(unwrap_payload)
                        .collect();
                }
                Err(e)
            }
        }
    }

    fn has_more_results(&self) -> bool {
        self.inner.has_more_results()
    }
}
