//! Distinct stages

use std::collections::HashSet;

use async_trait::async_trait;

use super::content_hash::{content_hash, ContentHash};
use super::stage::{ItemResponse, Stage};
use crate::core::ClientResult;

enum Seen {
    /// Input is ordered; duplicates are adjacent
    Last(Option<ContentHash>),
    All(HashSet<ContentHash>),
}

/// Drops results whose content hash was already emitted.
///
/// The ordered form remembers only the previous hash, the unordered form
/// every hash seen so far.
pub struct DistinctStage {
    inner: Box<dyn Stage>,
    seen: Seen,
}

impl DistinctStage {
    pub fn ordered(inner: Box<dyn Stage>) -> Self {
        Self {
            inner,
            seen: Seen::Last(None),
        }
    }

    pub fn unordered(inner: Box<dyn Stage>) -> Self {
        Self {
            inner,
            seen: Seen::All(HashSet::new()),
        }
    }

    fn admit(&mut self, hash: ContentHash) -> bool {
        match &mut self.seen {
            Seen::Last(last) => {
                if *last == Some(hash) {
                    false
                } else {
                    *last = Some(hash);
                    true
                }
            }
            Seen::All(set) => set.insert(hash),
        }
    }
}

#[async_trait]
impl Stage for DistinctStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        let next = self.inner.next_item().await?;
        let item = match next.item {
            Some(item) if self.admit(content_hash(&item)) => Some(item),
            _ => None,
        };
        Ok(ItemResponse {
            item,
            headers: next.headers,
        })
    }

    fn has_more_results(&self) -> bool {
        self.inner.has_more_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::stage::tests::VecStage;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    async fn run(mut stage: DistinctStage) -> Vec<Value> {
        let mut out = Vec::new();
        while stage.has_more_results() {
            out.extend(stage.next_item().await.unwrap().item);
        }
        out
    }

    proptest! {
        #[test]
        fn prop_unordered_emits_each_hash_once(
            input in prop::collection::vec(0i64..6, 0..24)
                .prop_flat_map(|v| {
                    let doubled: Vec<i64> = v.iter().chain(v.iter()).copied().collect();
                    Just(doubled).prop_shuffle()
                }),
        ) {
            let rows: Vec<Value> = input.iter().map(|v| json!({"v": v})).collect();
            let out = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(run(DistinctStage::unordered(VecStage::boxed(rows.clone()))));

            let expected: HashSet<ContentHash> = rows.iter().map(content_hash).collect();
            let emitted: Vec<ContentHash> = out.iter().map(content_hash).collect();
            let unique: HashSet<ContentHash> = emitted.iter().copied().collect();
            prop_assert_eq!(emitted.len(), unique.len());
            prop_assert_eq!(unique, expected);
        }
    }

    #[tokio::test]
    async fn test_ordered_drops_adjacent_duplicates() {
        let input = VecStage::boxed(vec![json!(1), json!(1), json!(2), json!(2), json!(3)]);
        assert_eq!(run(DistinctStage::ordered(input)).await, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_unordered_drops_all_duplicates() {
        let input = VecStage::boxed(vec![
            json!({"a": 1, "b": 2}),
            json!("x"),
            json!({"b": 2, "a": 1}),
            json!("x"),
            json!(null),
        ]);
        assert_eq!(
            run(DistinctStage::unordered(input)).await,
            vec![json!({"a": 1, "b": 2}), json!("x"), json!(null)]
        );
    }
}
