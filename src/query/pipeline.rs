//! Pipeline assembly from a query plan
//!
//! Stages nest innermost first:
//!
//! ```text
//! merger -> [order-by unwrap] -> [group-by] -> [distinct] -> [top] -> [offset/limit]
//! ```
//!
//! A non-streaming order-by plan replaces the whole stack with an unordered
//! merger feeding one bounded top-K stage.

use std::sync::Arc;

use super::budget::RequestBudget;
use super::client::{QueryClient, SqlQuery};
use super::distinct::DistinctStage;
use super::group_by::{GroupByStage, GroupByValueStage};
use super::merger::CrossPartitionMerger;
use super::non_streaming::NonStreamingOrderByStage;
use super::offset_limit::OffsetLimitStage;
use super::order_by::OrderByStage;
use super::plan::{DistinctType, QueryPlan};
use super::stage::Stage;
use crate::core::{ClientResult, QueryOptions};
use crate::observability::Event;
use crate::routing::PartitionCatalog;

/// What every stage of one query shares
#[derive(Clone)]
pub struct PipelineContext {
    pub client: Arc<dyn QueryClient>,
    pub catalog: Arc<PartitionCatalog>,
    /// Container link or rid the catalog is keyed by
    pub container: String,
    pub options: QueryOptions,
    pub budget: Arc<RequestBudget>,
}

/// Build the stage stack for `plan`.
pub fn build_pipeline(ctx: PipelineContext, query: &SqlQuery, plan: &QueryPlan) -> ClientResult<Box<dyn Stage>> {
    plan.validate()?;
    let info = &plan.query_info;
    let fanned_out = match plan.rewritten_query() {
        Some(text) => query.with_text(text),
        None => query.clone(),
    };
    let ranges = plan.target_query_ranges();
    let container = ctx.container.clone();

    if info.has_non_streaming_order_by {
        let capacity = plan.non_streaming_buffer_size(ctx.options.non_streaming_buffer_size);
        let budget = Arc::clone(&ctx.budget);
        let fraction = ctx.options.budget_min_remaining_fraction;
        let merger = CrossPartitionMerger::parallel(ctx, fanned_out, ranges);
        tracing::debug!(
            event = %Event::PipelineBuilt,
            container = %container,
            capacity,
            "non-streaming order-by pipeline"
        );
        return Ok(Box::new(NonStreamingOrderByStage::new(
            Box::new(merger),
            info.order_by.clone(),
            capacity,
            info.offset.unwrap_or(0) as usize,
            info.distinct_type != DistinctType::None,
            budget,
            fraction,
        )));
    }

    let mut stages = vec!["merger"];
    let mut stage: Box<dyn Stage> = if plan.has_order_by() {
        stages.push("order_by");
        let merger = CrossPartitionMerger::ordered(ctx, fanned_out, ranges, info.order_by.clone());
        Box::new(OrderByStage::new(Box::new(merger)))
    } else {
        Box::new(CrossPartitionMerger::parallel(ctx, fanned_out, ranges))
    };

    if plan.has_grouping() {
        if info.has_select_value {
            stages.push("group_by_value");
            stage = Box::new(GroupByValueStage::new(stage, info.aggregates.first().copied()));
        } else {
            stages.push("group_by");
            stage = Box::new(GroupByStage::new(stage, info.group_by_alias_to_aggregate_type.clone()));
        }
    }

    match info.distinct_type {
        DistinctType::None => {}
        DistinctType::Ordered => {
            stages.push("distinct_ordered");
            stage = Box::new(DistinctStage::ordered(stage));
        }
        DistinctType::Unordered => {
            stages.push("distinct_unordered");
            stage = Box::new(DistinctStage::unordered(stage));
        }
    }

    if let Some(top) = info.top {
        stages.push("top");
        stage = Box::new(OffsetLimitStage::top(stage, top));
    }

    if info.offset.is_some() || info.limit.is_some() {
        stages.push("offset_limit");
        stage = Box::new(OffsetLimitStage::new(
            stage,
            info.offset.unwrap_or(0),
            info.limit.unwrap_or(u64::MAX),
        ));
    }

    tracing::debug!(
        event = %Event::PipelineBuilt,
        container = %container,
        stages = %stages.join(" > "),
        "cross-partition pipeline"
    );
    Ok(stage)
}
