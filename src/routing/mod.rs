//! Partition routing
//!
//! Answers "which physical partition ranges own this key or key range":
//!
//! - [`PartitionCatalog`] caches a validated [`RoutingMap`] per container and
//!   refreshes it on demand or on split signals
//! - [`RoutingMap`] is always a complete, non-overlapping tiling of the
//!   effective key space `["", "FF")`
//! - [`CompositeContinuationToken`] persists per-range progress across
//!   topology changes

mod catalog;
mod continuation;
mod range;
mod routing_map;

pub use catalog::{PartitionCatalog, RangeSource};
pub use continuation::{feed_ranges_for, CompositeContinuationToken, FeedRange, RangeContinuation};
pub use range::{validate_sorted_disjoint, PartitionKeyRange, QueryRange};
pub use routing_map::RoutingMap;
