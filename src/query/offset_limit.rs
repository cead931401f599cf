//! OFFSET/LIMIT and TOP

use async_trait::async_trait;

use super::stage::{ItemResponse, Stage};
use crate::core::ClientResult;

/// Skips `offset` results, then passes at most `limit`.
///
/// Only real results count; pulls that produced nothing pass through as
/// empty pulls.
pub struct OffsetLimitStage {
    inner: Box<dyn Stage>,
    offset: u64,
    limit: u64,
}

impl OffsetLimitStage {
    pub fn new(inner: Box<dyn Stage>, offset: u64, limit: u64) -> Self {
        Self { inner, offset, limit }
    }

    /// TOP n
    pub fn top(inner: Box<dyn Stage>, top: u64) -> Self {
        Self::new(inner, 0, top)
    }
}

#[async_trait]
impl Stage for OffsetLimitStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        let next = self.inner.next_item().await?;
        let item = match next.item {
            Some(_) if self.offset > 0 => {
                self.offset -= 1;
                None
            }
            Some(item) if self.limit > 0 => {
                self.limit -= 1;
                Some(item)
            }
            _ => None,
        };
        Ok(ItemResponse {
            item,
            headers: next.headers,
        })
    }

    fn has_more_results(&self) -> bool {
        (self.offset > 0 || self.limit > 0) && self.inner.has_more_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::stage::tests::VecStage;
    use serde_json::json;

    async fn run(mut stage: OffsetLimitStage) -> (Vec<serde_json::Value>, usize) {
        let mut out = Vec::new();
        let mut pulls = 0;
        while stage.has_more_results() {
            pulls += 1;
            out.extend(stage.next_item().await.unwrap().item);
        }
        (out, pulls)
    }

    #[tokio::test]
    async fn test_offset_then_limit() {
        let input = VecStage::boxed((1..=10).map(|i| json!(i)).collect());
        let (out, pulls) = run(OffsetLimitStage::new(input, 3, 2)).await;
        assert_eq!(out, vec![json!(4), json!(5)]);
        // stops pulling once the limit is spent
        assert_eq!(pulls, 5);
    }

    #[tokio::test]
    async fn test_empty_pulls_do_not_count() {
        let input = VecStage::boxed_with_gaps(vec![json!("a"), json!("b"), json!("c")]);
        let (out, _) = run(OffsetLimitStage::new(input, 1, 5)).await;
        assert_eq!(out, vec![json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_top_zero_pulls_nothing() {
        let input = VecStage::boxed(vec![json!(1)]);
        let (out, pulls) = run(OffsetLimitStage::top(input, 0)).await;
        assert!(out.is_empty());
        assert_eq!(pulls, 0);
    }
}
