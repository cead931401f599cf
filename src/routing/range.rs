//! Partition key ranges and query ranges over the effective key space

use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_EPK, MIN_EPK};
use crate::core::{ClientError, ClientResult};

/// A contiguous slice `[min_inclusive, max_exclusive)` of effective key space
/// owned by one physical partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
    /// Ids of ranges this one was split or merged from
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    pub fn new(id: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min.into(),
            max_exclusive: max.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    pub fn contains(&self, epk: &str) -> bool {
        self.min_inclusive.as_str() <= epk && epk < self.max_exclusive.as_str()
    }

    pub fn to_query_range(&self) -> QueryRange {
        QueryRange::new(&self.min_inclusive, &self.max_exclusive, true, false)
    }
}

/// A possibly partial interval used to ask which ranges overlap it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRange {
    pub min: String,
    pub max: String,
    pub is_min_inclusive: bool,
    pub is_max_inclusive: bool,
}

impl QueryRange {
    pub fn new(min: &str, max: &str, is_min_inclusive: bool, is_max_inclusive: bool) -> Self {
        Self {
            min: min.to_string(),
            max: max.to_string(),
            is_min_inclusive,
            is_max_inclusive,
        }
    }

    /// `["", "FF")`
    pub fn full() -> Self {
        Self::new(MIN_EPK, MAX_EPK, true, false)
    }

    /// Single effective key
    pub fn point(epk: &str) -> Self {
        Self::new(epk, epk, true, true)
    }

    pub fn is_empty(&self) -> bool {
        self.min == self.max && !(self.is_min_inclusive && self.is_max_inclusive)
    }

    pub fn is_full_range(&self) -> bool {
        self.min == MIN_EPK && self.is_min_inclusive && self.max == MAX_EPK && !self.is_max_inclusive
    }

    pub fn contains(&self, epk: &str) -> bool {
        let above_min = if self.is_min_inclusive {
            self.min.as_str() <= epk
        } else {
            self.min.as_str() < epk
        };
        let below_max = if self.is_max_inclusive {
            epk <= self.max.as_str()
        } else {
            epk < self.max.as_str()
        };
        above_min && below_max
    }

    pub fn overlaps(&self, other: &QueryRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        // self.min vs other.max, other.min vs self.max
        let a = self.min.cmp(&other.max);
        let b = other.min.cmp(&self.max);
        if a.is_gt() || b.is_gt() {
            return false;
        }
        if a.is_eq() && !(self.is_min_inclusive && other.is_max_inclusive) {
            return false;
        }
        if b.is_eq() && !(other.is_min_inclusive && self.is_max_inclusive) {
            return false;
        }
        true
    }

    pub fn overlaps_range(&self, range: &PartitionKeyRange) -> bool {
        self.overlaps(&range.to_query_range())
    }
}

/// Reject query range lists that are unsorted or overlapping.
pub fn validate_sorted_disjoint(ranges: &[QueryRange]) -> ClientResult<()> {
    for pair in ranges.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let ordered = match prev.max.cmp(&next.min) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => !(prev.is_max_inclusive && next.is_min_inclusive),
            std::cmp::Ordering::Greater => false,
        };
        if !ordered || prev.min > next.min {
            return Err(ClientError::invalid_input(format!(
                "Query ranges must be sorted and non-overlapping: [{}, {}] then [{}, {}]",
                prev.min, prev.max, next.min, next.max
            )));
        }
    }
    Ok(())
}
