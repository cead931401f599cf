//! Query plan model
//!
//! The plan is produced by the service and consumed as-is; this crate never
//! plans queries itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::constants::ORDER_BY_FILTER_PLACEHOLDER;
use crate::core::{ClientError, ClientResult};
use crate::routing::QueryRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateType {
    Average,
    Count,
    Max,
    Min,
    Sum,
}

/// Shape of the query as the service sees it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryInfo {
    pub distinct_type: DistinctType,
    pub top: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub order_by: Vec<SortOrder>,
    pub order_by_expressions: Vec<String>,
    pub group_by_expressions: Vec<String>,
    pub group_by_aliases: Vec<String>,
    pub aggregates: Vec<AggregateType>,
    /// Alias -> aggregate; `None` for plain group-by projections
    pub group_by_alias_to_aggregate_type: BTreeMap<String, Option<AggregateType>>,
    pub rewritten_query: String,
    pub has_select_value: bool,
    pub has_non_streaming_order_by: bool,
}

/// Partitioned execution info returned by a query-plan request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryPlan {
    pub query_info: QueryInfo,
    pub query_ranges: Vec<QueryRange>,
}

impl QueryPlan {
    pub fn has_order_by(&self) -> bool {
        !self.query_info.order_by.is_empty()
    }

    /// Group-by or aggregate post-processing is required.
    pub fn has_grouping(&self) -> bool {
        let info = &self.query_info;
        !info.group_by_expressions.is_empty()
            || !info.aggregates.is_empty()
            || !info.group_by_alias_to_aggregate_type.is_empty()
    }

    /// Plain aggregates must be projected with `SELECT VALUE`.
    pub fn validate(&self) -> ClientResult<()> {
        let info = &self.query_info;
        if !info.aggregates.is_empty() && !info.has_select_value && info.group_by_expressions.is_empty() {
            return Err(ClientError::invalid_input(
                "Aggregate queries must use the VALUE keyword",
            ));
        }
        Ok(())
    }

    /// Rewritten query with the order-by filter placeholder filled in, or
    /// `None` when the service did not rewrite the query.
    pub fn rewritten_query(&self) -> Option<String> {
        let rewritten = &self.query_info.rewritten_query;
        if rewritten.is_empty() {
            return None;
        }
        Some(rewritten.replace(ORDER_BY_FILTER_PLACEHOLDER, "true"))
    }

    /// Ranges to fan out over; the full key space when the plan lists none.
    pub fn target_query_ranges(&self) -> Vec<QueryRange> {
        if self.query_ranges.is_empty() {
            vec![QueryRange::full()]
        } else {
            self.query_ranges.clone()
        }
    }

    /// Heap size for non-streaming order-by.
    ///
    /// TOP wins, then OFFSET + LIMIT, then the configured default. A zero
    /// TOP or LIMIT yields zero.
    pub fn non_streaming_buffer_size(&self, default_size: usize) -> usize {
        let info = &self.query_info;
        if info.top == Some(0) || info.limit == Some(0) {
            return 0;
        }
        if let Some(top) = info.top {
            return top as usize;
        }
        if let Some(limit) = info.limit {
            return (info.offset.unwrap_or(0) + limit) as usize;
        }
        default_size
    }
}
