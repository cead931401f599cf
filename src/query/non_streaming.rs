//! Non-streaming order-by
//!
//! Used when the service cannot stream ranges in order (vector distance and
//! full-text ranking). Every range's rows are pushed through a bounded
//! top-K heap; the heap is emitted in order once the input is drained.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::budget::RequestBudget;
use super::compare::SortKey;
use super::content_hash::{content_hash, ContentHash};
use super::order_by::unwrap_payload;
use super::plan::SortOrder;
use super::stage::{ItemResponse, Stage};
use crate::core::{ClientResult, ErrorKind};
use crate::observability::Event;

/// A row held by the heap, ordered by output position
struct Ranked {
    key: SortKey,
    /// Arrival order, breaking key ties
    seq: u64,
    payload: Value,
    orders: Arc<[SortOrder]>,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // The heap maximum is the row emitted last, so it is evicted first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .compare(&other.key, &self.orders)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Bounded top-K over ordered rows
pub struct NonStreamingOrderByStage {
    inner: Box<dyn Stage>,
    orders: Arc<[SortOrder]>,
    capacity: usize,
    offset: usize,
    distinct: Option<HashSet<ContentHash>>,
    heap: BinaryHeap<Ranked>,
    seq: u64,
    budget: Arc<RequestBudget>,
    min_remaining_fraction: f64,
    output: Option<VecDeque<Value>>,
}

impl NonStreamingOrderByStage {
    /// `capacity` already includes the offset.
    pub fn new(
        inner: Box<dyn Stage>,
        orders: Vec<SortOrder>,
        capacity: usize,
        offset: usize,
        distinct: bool,
        budget: Arc<RequestBudget>,
        min_remaining_fraction: f64,
    ) -> Self {
        Self {
            inner,
            orders: orders.into(),
            capacity,
            offset,
            distinct: distinct.then(HashSet::new),
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            seq: 0,
            budget,
            min_remaining_fraction,
            output: None,
        }
    }

    /// Offer one row; kept only if it beats the current worst when full.
    fn offer(&mut self, row: Value) -> ClientResult<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let key = SortKey::from_row(&row, self.orders.len())?;
        let Some(payload) = unwrap_payload(row) else {
            return Ok(());
        };
        if let Some(seen) = &mut self.distinct {
            if !seen.insert(content_hash(&payload)) {
                return Ok(());
            }
        }
        self.seq += 1;
        let ranked = Ranked {
            key,
            seq: self.seq,
            payload,
            orders: Arc::clone(&self.orders),
        };
        if self.heap.len() < self.capacity {
            self.heap.push(ranked);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if ranked < *worst {
                *worst = ranked;
            }
        }
        Ok(())
    }

    /// Payloads currently held, in output order
    fn snapshot(&self) -> Vec<Value> {
        let mut held: Vec<&Ranked> = self.heap.iter().collect();
        held.sort();
        held.into_iter().map(|r| r.payload.clone()).collect()
    }

    fn heap_full(&self) -> bool {
        self.capacity > 0 && self.heap.len() >= self.capacity
    }

    fn finish(&mut self) -> VecDeque<Value> {
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .skip(self.offset)
            .map(|r| r.payload)
            .collect()
    }
}

#[async_trait]
impl Stage for NonStreamingOrderByStage {
    async fn next_item(&mut self) -> ClientResult<ItemResponse> {
        if self.output.is_none() {
            if self.capacity > 0 && self.inner.has_more_results() {
                if self.heap_full()
                    && self.budget.cap().is_some()
                    && self.budget.remaining_fraction() <= self.min_remaining_fraction
                {
                    tracing::info!(
                        event = %Event::BudgetExceeded,
                        held = self.heap.len(),
                        remaining = self.budget.remaining_fraction(),
                        "stopping top-k early"
                    );
                    let mut err = self.budget.exceeded_error();
                    err.fetched_results = self.snapshot();
                    return Err(err);
                }

                let next = match self.inner.next_item().await {
                    Ok(next) => next,
                    Err(mut e) => {
                        if e.kind == ErrorKind::BudgetExceeded {
                            for row in std::mem::take(&mut e.fetched_results) {
                                self.offer(row)?;
                            }
                            e.fetched_results = self.snapshot();
                        }
                        return Err(e);
                    }
                };
                if let Some(row) = next.item {
                    self.offer(row)?;
                }
                return Ok(ItemResponse::empty(next.headers));
            }
            self.output = Some(self.finish());
        }

        let item = self.output.as_mut().and_then(VecDeque::pop_front);
        Ok(ItemResponse::empty(Default::default()).with_item(item))
    }

    fn has_more_results(&self) -> bool {
        match &self.output {
            Some(output) => !output.is_empty(),
            None => true,
        }
    }
}
