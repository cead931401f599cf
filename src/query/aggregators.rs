//! Aggregate accumulators for group-by and value aggregates
//!
//! Each range returns a partial aggregate per group; these accumulators fold
//! the partials into the final value.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::compare::compare_values;
use super::plan::AggregateType;
use crate::core::ClientResult;

/// Folds partial aggregates of one kind
#[derive(Debug, Clone)]
pub enum Aggregator {
    /// Partials shaped `{"sum": n, "count": n}`
    Average { sum: Option<f64>, count: f64 },
    Count(f64),
    /// `None` until a value is seen; `Some(None)` once a value was undefined
    Max(Option<Option<Value>>),
    Min(Option<Option<Value>>),
    /// `None` until a partial is seen; `Some(None)` once one was not numeric
    Sum(Option<Option<f64>>),
    /// Non-aggregated projection; the first value wins
    Static(Option<Value>),
}

impl Aggregator {
    pub fn new(kind: Option<AggregateType>) -> Self {
        match kind {
            Some(AggregateType::Average) => Self::Average { sum: None, count: 0.0 },
            Some(AggregateType::Count) => Self::Count(0.0),
            Some(AggregateType::Max) => Self::Max(None),
            Some(AggregateType::Min) => Self::Min(None),
            Some(AggregateType::Sum) => Self::Sum(None),
            None => Self::Static(None),
        }
    }

    pub fn aggregate(&mut self, partial: &Value) -> ClientResult<()> {
        match self {
            Self::Average { sum, count } => {
                let partial_sum = partial.get("sum").and_then(Value::as_f64);
                if let Some(s) = partial_sum {
                    *sum = Some(sum.unwrap_or(0.0) + s);
                    *count += partial.get("count").and_then(Value::as_f64).unwrap_or(0.0);
                }
            }
            Self::Count(total) => *total += partial.as_f64().unwrap_or(0.0),
            Self::Max(best) => fold_extreme(best, partial, "max", Ordering::Greater)?,
            Self::Min(best) => fold_extreme(best, partial, "min", Ordering::Less)?,
            Self::Sum(total) => {
                let running = total.unwrap_or(Some(0.0));
                *total = Some(running.zip(partial.as_f64()).map(|(t, p)| t + p));
            }
            Self::Static(first) => {
                if first.is_none() {
                    *first = Some(partial.clone());
                }
            }
        }
        Ok(())
    }

    /// Final value; `None` when the aggregate is undefined.
    pub fn result(&self) -> Option<Value> {
        match self {
            Self::Average { sum, count } => match sum {
                Some(s) if *count > 0.0 => number(s / count),
                _ => None,
            },
            Self::Count(total) => number(*total),
            Self::Max(best) | Self::Min(best) => best.clone().flatten(),
            Self::Sum(total) => total.flatten().and_then(number),
            Self::Static(first) => first.clone(),
        }
    }
}

/// Partials are `{"max": v}` / `{"min": v}`, with `{"count": 0}` for empty
/// ranges, or a bare scalar.
fn fold_extreme(best: &mut Option<Option<Value>>, partial: &Value, field: &str, wins: Ordering) -> ClientResult<()> {
    let candidate = match partial {
        Value::Object(fields) => {
            if fields.get("count").and_then(Value::as_f64) == Some(0.0) && !fields.contains_key(field) {
                return Ok(());
            }
            fields.get(field).cloned()
        }
        other => Some(other.clone()),
    };

    match best {
        None => *best = Some(candidate),
        Some(current) => {
            if compare_values(candidate.as_ref(), current.as_ref())? == wins {
                *current = candidate;
            }
        }
    }
    Ok(())
}

/// Integral values come back as integers.
fn number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Some(Value::Number(Number::from(n as i64)))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

/// Unwrap the partial aggregate a range returned for one projection.
///
/// Objects carry it under `item2` (or `item`); an empty object means the
/// range had nothing to aggregate.
pub fn extract_aggregate_result(value: &Value) -> Option<Value> {
    match value {
        Value::Object(fields) if fields.is_empty() => None,
        Value::Object(fields) => partial_from(fields),
        other => Some(other.clone()),
    }
}

fn partial_from(fields: &Map<String, Value>) -> Option<Value> {
    match fields.get("item2") {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => fields.get("item").cloned(),
    }
}
