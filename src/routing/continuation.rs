//! Composite continuation tokens for change-feed style consumption
//!
//! A token records, per not-yet-exhausted slice of key space, the last
//! continuation returned for it. Resuming re-resolves every slice against
//! the current catalog, so tokens survive splits and merges.

use serde::{Deserialize, Serialize};

use super::catalog::PartitionCatalog;
use super::range::{PartitionKeyRange, QueryRange};
use crate::core::{ClientError, ClientResult};

/// One saved slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeContinuation {
    #[serde(rename = "minInclusive")]
    pub min_inclusive: String,
    #[serde(rename = "maxExclusive")]
    pub max_exclusive: String,
    #[serde(rename = "continuationToken", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `{rid, Continuation: [{minInclusive, maxExclusive, continuationToken}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeContinuationToken {
    pub rid: String,
    #[serde(rename = "Continuation")]
    pub continuation: Vec<RangeContinuation>,
}

/// A physical range to read, possibly restricted to a sub-range of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRange {
    pub range: PartitionKeyRange,
    pub continuation: Option<String>,
    /// Set only when the slice covers part of `range`
    pub epk_min: Option<String>,
    pub epk_max: Option<String>,
}

impl FeedRange {
    /// Effective bounds of this slice
    pub fn bounds(&self) -> (&str, &str) {
        (
            self.epk_min.as_deref().unwrap_or(&self.range.min_inclusive),
            self.epk_max.as_deref().unwrap_or(&self.range.max_exclusive),
        )
    }
}

impl CompositeContinuationToken {
    /// Snapshot the given slices into a token.
    pub fn from_feed_ranges(rid: impl Into<String>, ranges: &[FeedRange]) -> Self {
        let continuation = ranges
            .iter()
            .map(|r| {
                let (min, max) = r.bounds();
                RangeContinuation {
                    min_inclusive: min.to_string(),
                    max_exclusive: max.to_string(),
                    token: r.continuation.clone(),
                }
            })
            .collect();
        Self {
            rid: rid.into(),
            continuation,
        }
    }

    pub fn parse(token: &str) -> ClientResult<Self> {
        serde_json::from_str(token)
            .map_err(|e| ClientError::invalid_input(format!("Invalid continuation token: {}", e)))
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Re-expand saved slices against the current catalog.
    ///
    /// A saved slice that was split resolves to several ranges inheriting its
    /// token; one that now lives inside a merged range resolves to that range
    /// with explicit sub-range bounds.
    pub async fn resolve(
        &self,
        catalog: &PartitionCatalog,
        container: &str,
        container_rid: &str,
    ) -> ClientResult<Vec<FeedRange>> {
        if self.rid != container_rid {
            return Err(ClientError::invalid_input(
                "The continuation token is not for the current container definition",
            ));
        }
        let mut resolved = Vec::new();
        for saved in &self.continuation {
            let query = QueryRange::new(&saved.min_inclusive, &saved.max_exclusive, true, false);
            let mut ranges = feed_ranges_for(catalog, container, &query).await?;
            for r in &mut ranges {
                r.continuation = saved.token.clone();
            }
            resolved.extend(ranges);
        }
        Ok(resolved)
    }
}

/// Fresh slices (no continuation) covering `query`.
pub async fn feed_ranges_for(
    catalog: &PartitionCatalog,
    container: &str,
    query: &QueryRange,
) -> ClientResult<Vec<FeedRange>> {
    let overlapping = catalog
        .overlapping_ranges(container, std::slice::from_ref(query), false)
        .await?;
    Ok(overlapping
        .into_iter()
        .map(|range| {
            let (epk_min, epk_max) = clip(query, &range);
            FeedRange {
                range,
                continuation: None,
                epk_min,
                epk_max,
            }
        })
        .collect())
}

/// Sub-range bounds when `query` covers only part of `range`.
fn clip(query: &QueryRange, range: &PartitionKeyRange) -> (Option<String>, Option<String>) {
    let covers = query.min <= range.min_inclusive && query.max >= range.max_exclusive;
    if covers {
        return (None, None);
    }
    let min = std::cmp::max(&query.min, &range.min_inclusive).clone();
    let max = std::cmp::min(&query.max, &range.max_exclusive).clone();
    (Some(min), Some(max))
}
