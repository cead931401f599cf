//! Bulk request shaping
//!
//! Turns up to 100 item operations into per-partition batches: each
//! operation gets an effective partition key, is grouped with the other
//! operations owned by the same partition key range, and oversized groups
//! are split while keeping every operation's original index.

mod batch;

pub use batch::{
    plan_batches, validate_id, Batch, BulkOperationType, BulkOptions, IndexedOperation, Operation,
    OperationInput, OperationKey, MAX_BATCH_SIZE_BYTES, MAX_OPERATIONS_PER_BATCH,
};
