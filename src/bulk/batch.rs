//! Operation preparation, grouping and size splitting

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{ClientError, ClientResult};
use crate::hashing::{PartitionKey, PartitionKeyDefinition};
use crate::observability::Event;
use crate::routing::RoutingMap;

/// Operations accepted in one bulk call
pub const MAX_OPERATIONS_PER_BATCH: usize = 100;

/// Serialized operations per batch request, in bytes
pub const MAX_BATCH_SIZE_BYTES: usize = 220_201;

const MAX_ID_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkOperationType {
    Create,
    Upsert,
    Read,
    Delete,
    Replace,
    Patch,
}

impl BulkOperationType {
    /// Operations whose partition key can be read from the body
    fn carries_body_key(&self) -> bool {
        matches!(self, Self::Create | Self::Replace | Self::Upsert)
    }

    fn generates_id(&self) -> bool {
        matches!(self, Self::Create | Self::Upsert)
    }
}

/// Partition key supplied with an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OperationKey {
    /// Extract from the body, or use the none key
    #[default]
    Unspecified,
    /// Explicitly undefined: the none key
    None,
    Value(PartitionKey),
}

/// A caller's operation before preparation
#[derive(Debug, Clone)]
pub struct OperationInput {
    pub operation_type: BulkOperationType,
    pub id: Option<String>,
    pub resource_body: Option<Value>,
    pub partition_key: OperationKey,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

impl OperationInput {
    pub fn new(operation_type: BulkOperationType) -> Self {
        Self {
            operation_type,
            id: None,
            resource_body: None,
            partition_key: OperationKey::Unspecified,
            if_match: None,
            if_none_match: None,
        }
    }

    pub fn create(body: Value) -> Self {
        Self::new(BulkOperationType::Create).with_body(body)
    }

    pub fn upsert(body: Value) -> Self {
        Self::new(BulkOperationType::Upsert).with_body(body)
    }

    pub fn read(id: impl Into<String>) -> Self {
        Self::new(BulkOperationType::Read).with_id(id)
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::new(BulkOperationType::Delete).with_id(id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.resource_body = Some(body);
        self
    }

    pub fn with_partition_key(mut self, key: OperationKey) -> Self {
        self.partition_key = key;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Leave Create/Upsert bodies without an id untouched
    pub disable_automatic_id_generation: bool,
}

/// An operation as sent in a batch request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_type: BulkOperationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_body: Option<Value>,
    /// Partition key as a JSON array string
    pub partition_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_none_match: Option<String>,
}

/// A prepared operation with its position in the caller's list
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedOperation {
    pub index: usize,
    pub operation: Operation,
    pub effective_partition_key: String,
    /// Serialized size in bytes
    pub size: usize,
}

/// Operations sent as one request to one partition key range
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub range_id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
    pub operations: Vec<IndexedOperation>,
}

impl Batch {
    pub fn size(&self) -> usize {
        self.operations.iter().map(|op| op.size).sum()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.operations.iter().map(|op| op.index).collect()
    }
}

/// Reject ids the service cannot address.
pub fn validate_id(id: &str) -> ClientResult<()> {
    if id.len() > MAX_ID_LENGTH {
        return Err(ClientError::invalid_input(format!(
            "Id exceeds {} characters",
            MAX_ID_LENGTH
        )));
    }
    if id.chars().any(|c| matches!(c, '/' | '\\' | '?' | '#')) {
        return Err(ClientError::invalid_input(format!(
            "Id '{}' contains an illegal character (/ \\ ? #)",
            id
        )));
    }
    if id.ends_with(' ') {
        return Err(ClientError::invalid_input(format!("Id '{}' ends with a space", id)));
    }
    Ok(())
}

fn body_id(body: &Value) -> Option<&str> {
    body.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

fn prepare(
    mut input: OperationInput,
    definition: &PartitionKeyDefinition,
    options: &BulkOptions,
) -> ClientResult<(Operation, String)> {
    if input.operation_type.generates_id() && !options.disable_automatic_id_generation {
        if let Some(Value::Object(fields)) = &mut input.resource_body {
            let missing = fields
                .get("id")
                .and_then(Value::as_str)
                .map_or(true, str::is_empty);
            if missing {
                fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
        }
    }

    let id = input
        .id
        .clone()
        .or_else(|| input.resource_body.as_ref().and_then(body_id).map(str::to_string));
    if let Some(id) = &id {
        validate_id(id)?;
    }

    let key = match (&input.partition_key, &input.resource_body) {
        (OperationKey::Value(key), _) => key.clone(),
        (OperationKey::None, _) => PartitionKey::none(definition),
        (OperationKey::Unspecified, Some(body)) if input.operation_type.carries_body_key() => {
            definition.extract(body)?
        }
        (OperationKey::Unspecified, _) => PartitionKey::none(definition),
    };
    let epk = definition.effective_partition_key(&key)?;

    let operation = Operation {
        operation_type: input.operation_type,
        id: input.id,
        resource_body: input.resource_body,
        partition_key: key.to_json().to_string(),
        if_match: input.if_match,
        if_none_match: input.if_none_match,
    };
    Ok((operation, epk))
}

fn serialized_size(operation: &Operation) -> ClientResult<usize> {
    serde_json::to_vec(operation)
        .map(|bytes| bytes.len())
        .map_err(|e| ClientError::internal(format!("Failed to encode operation: {}", e)))
}

/// Split one range's operations so no batch exceeds `cap` bytes.
///
/// An operation larger than `cap` still gets a batch of its own.
fn split_by_size(operations: Vec<IndexedOperation>, cap: usize) -> Vec<Vec<IndexedOperation>> {
    let mut batches: Vec<Vec<IndexedOperation>> = Vec::new();
    let mut current_size = 0usize;
    for op in operations {
        match batches.last_mut() {
            Some(current) if current_size + op.size <= cap => {
                current_size += op.size;
                current.push(op);
            }
            _ => {
                current_size = op.size;
                batches.push(vec![op]);
            }
        }
    }
    batches
}

/// Group `inputs` into per-range batches in range order.
pub fn plan_batches(
    routing_map: &RoutingMap,
    definition: &PartitionKeyDefinition,
    inputs: Vec<OperationInput>,
    options: &BulkOptions,
) -> ClientResult<Vec<Batch>> {
    if inputs.len() > MAX_OPERATIONS_PER_BATCH {
        return Err(ClientError::invalid_input(format!(
            "Cannot run bulk request with more than {} operations per partition",
            MAX_OPERATIONS_PER_BATCH
        )));
    }

    let ranges = routing_map.ordered_ranges();
    let mut grouped: Vec<Vec<IndexedOperation>> = vec![Vec::new(); ranges.len()];
    let total = inputs.len();
    for (index, input) in inputs.into_iter().enumerate() {
        let (operation, epk) = prepare(input, definition, options)?;
        let slot = ranges
            .iter()
            .position(|r| r.contains(&epk))
            .ok_or_else(|| ClientError::corrupt_catalog(format!("No partition key range owns effective key '{}'", epk)))?;
        let size = serialized_size(&operation)?;
        grouped[slot].push(IndexedOperation {
            index,
            operation,
            effective_partition_key: epk,
            size,
        });
    }

    let mut batches = Vec::new();
    for (range, operations) in ranges.iter().zip(grouped) {
        if operations.is_empty() {
            continue;
        }
        for chunk in split_by_size(operations, MAX_BATCH_SIZE_BYTES) {
            batches.push(Batch {
                range_id: range.id.clone(),
                min_inclusive: range.min_inclusive.clone(),
                max_exclusive: range.max_exclusive.clone(),
                operations: chunk,
            });
        }
    }

    tracing::debug!(
        event = %Event::BulkBatched,
        operations = total,
        batches = batches.len(),
        "bulk operations batched"
    );
    Ok(batches)
}
