//! Cross-partition query execution
//!
//! - [`QueryIterator`] pages a query for the caller, switching from a
//!   single service-routed stream to the cross-partition pipeline when the
//!   service asks for a query plan
//! - [`PartitionProducer`] pages one partition key range and holds faults
//!   behind already-fetched results
//! - [`CrossPartitionMerger`] merges producers through a priority queue and
//!   repairs itself when a range splits
//! - the stages (order-by unwrap, group-by, distinct, TOP, OFFSET/LIMIT,
//!   non-streaming top-K) post-process the merged rows as the plan requires
//!
//! All request units spent by one operation are charged to a shared
//! [`RequestBudget`].

mod aggregators;
mod budget;
mod client;
mod compare;
mod content_hash;
mod default_context;
mod distinct;
mod group_by;
mod iterator;
mod merger;
mod non_streaming;
mod offset_limit;
mod order_by;
mod pipeline;
mod plan;
mod producer;
mod stage;

pub use aggregators::{extract_aggregate_result, Aggregator};
pub use budget::RequestBudget;
pub use client::{OrchestratedQueryClient, Page, QueryClient, SqlParameter, SqlQuery};
pub use compare::{compare_values, OrderValue, SortKey};
pub use content_hash::{content_hash, ContentHash};
pub use default_context::DefaultContext;
pub use distinct::DistinctStage;
pub use group_by::{GroupByStage, GroupByValueStage};
pub use iterator::{FeedResponse, QueryIterator};
pub use merger::{CrossPartitionMerger, MAX_CONSECUTIVE_SPLIT_REPAIRS};
pub use non_streaming::NonStreamingOrderByStage;
pub use offset_limit::OffsetLimitStage;
pub use order_by::OrderByStage;
pub use pipeline::{build_pipeline, PipelineContext};
pub use plan::{AggregateType, DistinctType, QueryInfo, QueryPlan, SortOrder};
pub use producer::{PartitionProducer, ProducerState};
pub use stage::{ItemResponse, Stage};
