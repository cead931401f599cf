//! Group-by stages
//!
//! Grouping cannot stream: a group's result is only known once every range
//! has been drained. Both stages pull their input one row per call and emit
//! one row per group afterwards, last group first.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::aggregators::{extract_aggregate_result, Aggregator};
use super::content_hash::{content_hash, ContentHash};
use super::plan::AggregateType;
use super::stage::{ItemResponse, Stage};
use crate::core::ClientResult;

/// Groups in first-seen order, looked up by content hash of the group key
struct Groups<G> {
    index: HashMap<ContentHash, usize>,
    groups: Vec<G>,
}

impl<G> Groups<G> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: &Value, create: impl FnOnce() -> G) -> &mut G {
        let hash = content_hash(key);
        let idx = match self.index.get(&hash) {
            Some(idx) => *idx,
            None => {
                self.groups.push(create());
                self.index.insert(hash, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }
}

fn group_key(row: &Value) -> Value {
    row.get("groupByItems").cloned().unwrap_or(Value::Null)
}

/// Object projections: `SELECT c.k, SUM(c.v) AS total ... GROUP BY c.k`.
///
/// Input rows are `{"groupByItems": [...], "payload": {alias: value}}`.
pub struct GroupByStage {
    inner: Box<dyn Stage>,
    alias_types: BTreeMap<String, Option<AggregateType>>,
    groups: Groups<BTreeMap<String, Aggregator>>,
    results: Option<Vec<Value>>,
}

impl GroupByStage {
    pub fn new(inner: Box<dyn Stage>, alias_types: BTreeMap<String, Option<AggregateType>>) -> Self {
        Self {
            inner,
            alias_types,
            groups: Groups::new(),
            results: None,
        }
    }

    fn accumulate(&mut self, row: &Value) -> ClientResult<()> {
        let Some(payload) = row.get("payload").and_then(Value::as_object) else {
            return Ok(());
        };
        let group = self.groups.entry(&group_key(row), BTreeMap::new);
        for (alias, value) in payload {
            let kind = self.alias_types.get(alias).copied().flatten();
            let aggregator = group
                .entry(alias.clone())
                .or_insert_with(|| Aggregator::new(kind));
            let contribution = match kind {
                Some(_) => extract_aggregate_result(value),
                None => Some(value.clone()),
            };
            if let Some(partial) = contribution {
                aggregator.aggregate(&partial)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Vec<Value> {
        self.groups
            .groups
            .iter()
            .map(|group| {
                let fields: Map<String, Value> = group
                    .iter()
                    .filter_map(|(alias, agg)| agg.result().map(|v| (alias.clone(), v)))
                    .collect();
                Value::Object(fields)
            })
            .collect()
    }
}

#[async_trait]
impl Stage for GroupByStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        if self.results.is_none() {
            if self.inner.has_more_results() {
                let next = self.inner.next_item().await?;
                if let Some(row) = &next.item {
                    self.accumulate(row)?;
                }
                if self.inner.has_more_results() {
                    return Ok(ItemResponse::empty(next.headers));
                }
                self.results = Some(self.finish());
                let item = self.results.as_mut().and_then(Vec::pop);
                return Ok(ItemResponse { item, headers: next.headers });
            }
            self.results = Some(self.finish());
        }
        let item = self.results.as_mut().and_then(Vec::pop);
        Ok(ItemResponse { item, headers: Default::default() })
    }

    fn has_more_results(&self) -> bool {
        match &self.results {
            Some(results) => !results.is_empty(),
            None => true,
        }
    }
}

/// `SELECT VALUE` projections with at most one aggregate.
///
/// Rows are `{"groupByItems": [...], "payload": p}` under GROUP BY, else the
/// bare `p`. With an aggregate, `p` is `[partial]`.
pub struct GroupByValueStage {
    inner: Box<dyn Stage>,
    aggregate: Option<AggregateType>,
    groups: Groups<Aggregator>,
    results: Option<Vec<Value>>,
}

impl GroupByValueStage {
    pub fn new(inner: Box<dyn Stage>, aggregate: Option<AggregateType>) -> Self {
        Self {
            inner,
            aggregate,
            groups: Groups::new(),
            results: None,
        }
    }

    fn accumulate(&mut self, row: &Value) -> ClientResult<()> {
        let (key, payload) = match row.get("groupByItems") {
            Some(items) => (items.clone(), row.get("payload").cloned().unwrap_or(Value::Null)),
            None => (Value::Null, row.clone()),
        };
        let kind = self.aggregate;
        let aggregator = self.groups.entry(&key, || Aggregator::new(kind));
        let contribution = match kind {
            Some(_) => payload.get(0).and_then(extract_aggregate_result),
            None => Some(payload),
        };
        if let Some(partial) = contribution {
            aggregator.aggregate(&partial)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Vec<Value> {
        self.groups.groups.iter().filter_map(Aggregator::result).collect()
    }
}

#[async_trait]
impl Stage for GroupByValueStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        if self.results.is_none() {
            if self.inner.has_more_results() {
                let next = self.inner.next_item().await?;
                if let Some(row) = &next.item {
                    self.accumulate(row)?;
                }
                if self.inner.has_more_results() {
                    return Ok(ItemResponse::empty(next.headers));
                }
                self.results = Some(self.finish());
                let item = self.results.as_mut().and_then(Vec::pop);
                return Ok(ItemResponse { item, headers: next.headers });
            }
            self.results = Some(self.finish());
        }
        let item = self.results.as_mut().and_then(Vec::pop);
        Ok(ItemResponse { item, headers: Default::default() })
    }

    fn has_more_results(&self) -> bool {
        match &self.results {
            Some(results) => !results.is_empty(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::stage::tests::VecStage;
    use serde_json::json;

    async fn drain(stage: &mut dyn Stage) -> Vec<Value> {
        let mut out = Vec::new();
        while stage.has_more_results() {
            out.extend(stage.next_item().await.unwrap().item);
        }
        out
    }

    fn keyed(key: &str, n: i64) -> Value {
        json!({"groupByItems": [{"item": key}], "payload": {"key": key, "total": {"item": n}}})
    }

    #[tokio::test]
    async fn test_group_sums() {
        let input = VecStage::boxed(vec![keyed("A", 1), keyed("B", 2), keyed("A", 1), keyed("B", 2), keyed("A", 1)]);
        let types = BTreeMap::from([("key".to_string(), None), ("total".to_string(), Some(AggregateType::Sum))]);
        let mut stage = GroupByStage::new(input, types);
        let out = drain(&mut stage).await;
        // last group first
        assert_eq!(out, vec![json!({"key": "B", "total": 4}), json!({"key": "A", "total": 3})]);
    }

    #[tokio::test]
    async fn test_undefined_aggregate_is_omitted() {
        let input = VecStage::boxed(vec![json!({"groupByItems": [{"item": 1}], "payload": {"key": 1, "m": {}}})]);
        let types = BTreeMap::from([("key".to_string(), None), ("m".to_string(), Some(AggregateType::Max))]);
        let mut stage = GroupByStage::new(input, types);
        assert_eq!(drain(&mut stage).await, vec![json!({"key": 1})]);
    }

    #[tokio::test]
    async fn test_value_count_without_group_by() {
        let input = VecStage::boxed(vec![json!([{"item": 2}]), json!([{}]), json!([{"item": 5}])]);
        let mut stage = GroupByValueStage::new(input, Some(AggregateType::Count));
        assert_eq!(drain(&mut stage).await, vec![json!(7)]);
    }

    #[tokio::test]
    async fn test_value_distinct_keys() {
        let row = |k: &str| json!({"groupByItems": [{"item": k}], "payload": k});
        let input = VecStage::boxed(vec![row("x"), row("y"), row("x")]);
        let mut stage = GroupByValueStage::new(input, None);
        assert_eq!(drain(&mut stage).await, vec![json!("y"), json!("x")]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_nothing() {
        let mut stage = GroupByValueStage::new(VecStage::boxed(vec![]), Some(AggregateType::Sum));
        assert!(drain(&mut stage).await.is_empty());
    }
}
