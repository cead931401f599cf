//! Validated, ordered view of one container's partition key ranges

use std::collections::HashSet;

use super::range::{PartitionKeyRange, QueryRange};
use crate::core::constants::{MAX_EPK, MIN_EPK};
use crate::core::{ClientError, ClientResult};

/// Complete, non-overlapping tiling of `["", "FF")`.
///
/// Only constructible through [`RoutingMap::build`], so every instance has
/// passed validation.
#[derive(Debug, Clone)]
pub struct RoutingMap {
    ranges: Vec<PartitionKeyRange>,
}

impl RoutingMap {
    /// Build from the service's range list.
    ///
    /// Ranges named as a parent of another range are already gone and are
    /// dropped before validation.
    pub fn build(ranges: Vec<PartitionKeyRange>) -> ClientResult<Self> {
        let gone: HashSet<String> = ranges
            .iter()
            .flat_map(|r| r.parents.iter().cloned())
            .collect();
        let mut ranges: Vec<PartitionKeyRange> =
            ranges.into_iter().filter(|r| !gone.contains(&r.id)).collect();
        ranges.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));

        validate_complete(&ranges)?;
        Ok(Self { ranges })
    }

    pub fn ordered_ranges(&self) -> &[PartitionKeyRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn range_by_id(&self, id: &str) -> Option<&PartitionKeyRange> {
        self.ranges.iter().find(|r| r.id == id)
    }

    /// Range owning a single effective key.
    pub fn range_for_epk(&self, epk: &str) -> Option<&PartitionKeyRange> {
        let idx = self.ranges.partition_point(|r| r.max_exclusive.as_str() <= epk);
        self.ranges.get(idx).filter(|r| r.contains(epk))
    }

    /// Ranges overlapping any of `queries`, sorted by `min_inclusive`.
    ///
    /// `queries` must already be sorted and disjoint. Each query resumes the
    /// scan after the last range collected, so sorted multi-range input is
    /// scanned once. A query whose bounds no cached range covers means the
    /// map is stale or corrupt.
    pub fn overlapping_ranges(&self, queries: &[QueryRange]) -> ClientResult<Vec<PartitionKeyRange>> {
        let mut result: Vec<PartitionKeyRange> = Vec::new();
        let mut next_unscanned = 0usize;

        for query in queries {
            if query.is_empty() {
                continue;
            }
            if query.is_full_range() {
                return Ok(self.ranges.clone());
            }

            let first = self
                .ranges
                .partition_point(|r| r.max_exclusive.as_str() <= query.min.as_str());
            let end = self.ranges.partition_point(|r| {
                if query.is_max_inclusive {
                    r.min_inclusive.as_str() <= query.max.as_str()
                } else {
                    r.min_inclusive.as_str() < query.max.as_str()
                }
            });
            if first >= self.ranges.len() || first >= end {
                return Err(ClientError::corrupt_catalog(format!(
                    "No partition key range covers [{}, {}]",
                    query.min, query.max
                )));
            }

            for range in &self.ranges[first.max(next_unscanned)..end] {
                if query.overlaps_range(range) {
                    result.push(range.clone());
                }
            }
            next_unscanned = next_unscanned.max(end);
        }
        Ok(result)
    }
}

fn validate_complete(ranges: &[PartitionKeyRange]) -> ClientResult<()> {
    let (first, last) = match (ranges.first(), ranges.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(ClientError::corrupt_catalog("Partition key range set is empty")),
    };
    if first.min_inclusive != MIN_EPK {
        return Err(ClientError::corrupt_catalog(format!(
            "Incomplete range set: first range {} starts at '{}'",
            first.id, first.min_inclusive
        )));
    }
    if last.max_exclusive != MAX_EPK {
        return Err(ClientError::corrupt_catalog(format!(
            "Incomplete range set: last range {} ends at '{}'",
            last.id, last.max_exclusive
        )));
    }
    if let Some(bad) = ranges.iter().find(|r| r.min_inclusive >= r.max_exclusive) {
        return Err(ClientError::corrupt_catalog(format!(
            "Range {} is empty or inverted",
            bad.id
        )));
    }
    for pair in ranges.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        match prev.max_exclusive.cmp(&next.min_inclusive) {
            std::cmp::Ordering::Equal => {}
            std::cmp::Ordering::Less => {
                return Err(ClientError::corrupt_catalog(format!(
                    "Incomplete range set: gap between {} and {}",
                    prev.id, next.id
                )))
            }
            std::cmp::Ordering::Greater => {
                return Err(ClientError::corrupt_catalog(format!(
                    "Overlapping ranges {} and {}",
                    prev.id, next.id
                )))
            }
        }
    }
    Ok(())
}
