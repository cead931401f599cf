//! Cross-partition merger
//!
//! Fans one query out over every partition key range it targets and merges
//! the per-range streams through a priority queue. The ordered variant
//! compares the order-by key of each producer's head result; the unordered
//! variant favors the producer that has fetched the fewest pages.
//!
//! A producer whose head is a split fault is replaced in place by producers
//! for the ranges that now cover it, each resuming from the failed page's
//! continuation. Any other fault is latched and returned on every later call.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::compare::SortKey;
use super::pipeline::PipelineContext;
use super::plan::SortOrder;
use super::producer::PartitionProducer;
use super::stage::{ItemResponse, Stage};
use super::client::SqlQuery;
use crate::core::{ClientError, ClientResult, ErrorKind, Headers};
use crate::observability::Event;
use crate::routing::QueryRange;

/// Split repairs allowed without an item being produced in between
pub const MAX_CONSECUTIVE_SPLIT_REPAIRS: u32 = 10;

#[derive(Debug, Clone)]
enum Priority {
    /// Head is a fault; surfaced before anything else
    Fault,
    Ordered(SortKey),
    /// Pages fetched so far
    Arrival(u64),
}

#[derive(Debug, Clone)]
struct QueueEntry {
    priority: Priority,
    min_inclusive: String,
    slot: usize,
    orders: Arc<[SortOrder]>,
}

impl QueueEntry {
    /// `Less` when `self` must be served first.
    fn precedes(&self, other: &Self) -> Ordering {
        let by_priority = match (&self.priority, &other.priority) {
            (Priority::Fault, Priority::Fault) => Ordering::Equal,
            (Priority::Fault, _) => Ordering::Less,
            (_, Priority::Fault) => Ordering::Greater,
            (Priority::Ordered(a), Priority::Ordered(b)) => a.compare(b, &self.orders),
            (Priority::Arrival(a), Priority::Arrival(b)) => a.cmp(b),
            _ => Ordering::Equal,
        };
        by_priority
            .then_with(|| self.min_inclusive.cmp(&other.min_inclusive))
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.precedes(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap pops the greatest entry; the greatest is the one served first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedes(other).reverse()
    }
}

#[derive(Default)]
struct MergerState {
    initialized: bool,
    /// Slab of producers; queue entries refer to slots
    producers: Vec<Option<PartitionProducer>>,
    queue: BinaryHeap<QueueEntry>,
    fault: Option<ClientError>,
    headers: Headers,
    consecutive_repairs: u32,
}

/// Merges the results of one query across partition key ranges
pub struct CrossPartitionMerger {
    ctx: PipelineContext,
    query: SqlQuery,
    query_ranges: Vec<QueryRange>,
    orders: Arc<[SortOrder]>,
    state: Mutex<MergerState>,
    ended: AtomicBool,
    faulted: AtomicBool,
}

impl CrossPartitionMerger {
    /// Unordered merger
    pub fn parallel(ctx: PipelineContext, query: SqlQuery, query_ranges: Vec<QueryRange>) -> Self {
        Self::ordered(ctx, query, query_ranges, Vec::new())
    }

    /// Merger emitting rows in `orders` sequence; rows must carry
    /// `orderByItems`. Empty `orders` means unordered.
    pub fn ordered(ctx: PipelineContext, query: SqlQuery, query_ranges: Vec<QueryRange>, orders: Vec<SortOrder>) -> Self {
        Self {
            ctx,
            query,
            query_ranges,
            orders: orders.into(),
            state: Mutex::new(MergerState::default()),
            ended: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
        }
    }

    pub fn is_ordered(&self) -> bool {
        !self.orders.is_empty()
    }

    fn new_producer(&self, range: crate::routing::PartitionKeyRange, continuation: Option<String>) -> PartitionProducer {
        PartitionProducer::new(
            Arc::clone(&self.ctx.client),
            self.query.clone(),
            range,
            continuation,
            self.ctx.options.max_item_count,
            Arc::clone(&self.ctx.budget),
        )
    }

    /// Queue entry for a prefetched producer; `None` once it is drained.
    fn entry_for(&self, slot: usize, producer: &PartitionProducer) -> ClientResult<Option<QueueEntry>> {
        let priority = if producer.has_buffered_fault() {
            Priority::Fault
        } else if let Some(head) = producer.peek() {
            if self.is_ordered() {
                Priority::Ordered(SortKey::from_row(head, self.orders.len())?)
            } else {
                Priority::Arrival(producer.generation())
            }
        } else {
            return Ok(None);
        };
        Ok(Some(QueueEntry {
            priority,
            min_inclusive: producer.range().min_inclusive.clone(),
            slot,
            orders: Arc::clone(&self.orders),
        }))
    }

    /// Queue a prefetched producer, or drop it when drained.
    fn enqueue(&self, st: &mut MergerState, slot: usize) -> ClientResult<()> {
        let Some(producer) = st.producers.get_mut(slot).and_then(Option::as_mut) else {
            return Ok(());
        };
        st.headers.merge_from(&producer.take_headers());
        match self.entry_for(slot, producer)? {
            Some(entry) => st.queue.push(entry),
            None => st.producers[slot] = None,
        }
        Ok(())
    }

    async fn initialize(&self, st: &mut MergerState) -> ClientResult<()> {
        let ranges = self
            .ctx
            .catalog
            .overlapping_ranges(&self.ctx.container, &self.query_ranges, false)
            .await?;

        let mut producers: Vec<PartitionProducer> =
            ranges.into_iter().map(|range| self.new_producer(range, None)).collect();

        let dop = match self.ctx.options.max_degree_of_parallelism {
            0 => producers.len(),
            n => n.min(producers.len()),
        }
        .max(1);
        for chunk in producers.chunks_mut(dop) {
            // Faults stay buffered in the producer and are queued below.
            join_all(chunk.iter_mut().map(|p| p.prefetch())).await;
        }

        for producer in producers {
            let slot = st.producers.len();
            st.producers.push(Some(producer));
            self.enqueue(st, slot)?;
        }
        st.initialized = true;
        Ok(())
    }

    /// Replace the producer in `slot` by producers for the ranges now
    /// covering its range.
    async fn repair_split(&self, st: &mut MergerState, slot: usize) -> ClientResult<()> {
        let Some(mut parent) = st.producers.get_mut(slot).and_then(Option::take) else {
            return Ok(());
        };
        st.headers.merge_from(&parent.take_headers());

        let split = parent
            .fault()
            .cloned()
            .unwrap_or_else(|| ClientError::internal("split repair without a fault"));
        st.consecutive_repairs += 1;
        if st.consecutive_repairs > MAX_CONSECUTIVE_SPLIT_REPAIRS {
            return Err(split);
        }

        tracing::info!(
            event = %Event::PartitionSplitDetected,
            container = %self.ctx.container,
            range = %parent.range().id,
            substatus = split.substatus.unwrap_or_default(),
            "partition key range gone, refreshing catalog"
        );

        let replacements = self
            .ctx
            .catalog
            .overlapping_ranges(&self.ctx.container, &[parent.range().to_query_range()], true)
            .await?;

        let mut live = 0usize;
        for range in replacements {
            let mut child = self.new_producer(range, parent.continuation().map(str::to_string));
            // A fault here is held by the child and queued with fault priority.
            let _ = child.prefetch().await;
            let child_slot = st.producers.len();
            st.producers.push(Some(child));
            self.enqueue(st, child_slot)?;
            if st.producers[child_slot].is_some() {
                live += 1;
            }
        }

        tracing::info!(
            event = %Event::SplitRepaired,
            container = %self.ctx.container,
            parent = %parent.range().id,
            replacements = live,
            "split range replaced"
        );
        Ok(())
    }

    /// Results buffered in every live producer, in slot order.
    fn buffered(st: &MergerState) -> Vec<serde_json::Value> {
        st.producers
            .iter()
            .flatten()
            .flat_map(|p| p.buffered_items().cloned())
            .collect()
    }

    fn latch(&self, st: &mut MergerState, err: ClientError) -> ClientError {
        let mut err = err;
        if err.kind == ErrorKind::BudgetExceeded {
            err.fetched_results.extend(Self::buffered(st));
        }
        st.fault = Some(err.clone());
        self.faulted.store(true, AtomicOrdering::SeqCst);
        err
    }

    /// Next merged row.
    ///
    /// Calls are serialized; concurrent callers each receive distinct rows.
    pub async fn next_item(&self) -> ClientResult<ItemResponse> {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;

        if let Some(fault) = &st.fault {
            return Err(fault.clone());
        }
        if !st.initialized {
            if let Err(e) = self.initialize(st).await {
                return Err(self.latch(st, e));
            }
        }

        loop {
            let Some(top) = st.queue.peek() else {
                self.ended.store(true, AtomicOrdering::SeqCst);
                return Ok(ItemResponse::empty(std::mem::take(&mut st.headers)));
            };
            let slot = top.slot;
            let is_fault = matches!(top.priority, Priority::Fault);

            if is_fault {
                st.queue.pop();
                let split = st.producers[slot].as_ref().map_or(false, PartitionProducer::got_split);
                if split {
                    if let Err(e) = self.repair_split(st, slot).await {
                        return Err(self.latch(st, e));
                    }
                    continue;
                }
                let fault = st.producers[slot]
                    .as_ref()
                    .and_then(|p| p.fault().cloned())
                    .unwrap_or_else(|| ClientError::internal("queued fault without a producer"));
                return Err(self.latch(st, fault));
            }

            st.queue.pop();
            let Some(producer) = st.producers[slot].as_mut() else {
                continue;
            };
            let item = match producer.next_item().await {
                Ok(item) => item,
                Err(e) => return Err(self.latch(st, e)),
            };
            // Refill so the producer can be compared again; a fault is held
            // and surfaces when it reaches the head of the queue.
            let _ = producer.current().await;
            st.consecutive_repairs = 0;
            if let Err(e) = self.enqueue(st, slot) {
                return Err(self.latch(st, e));
            }

            let headers = std::mem::take(&mut st.headers);
            return Ok(ItemResponse { item, headers });
        }
    }
}

#[async_trait]
impl Stage for CrossPartitionMerger {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        CrossPartitionMerger::next_item(self).await
    }

    fn has_more_results(&self) -> bool {
        !self.ended.load(AtomicOrdering::SeqCst) && !self.faulted.load(AtomicOrdering::SeqCst)
    }
}
