//! Ordering of order-by values
//!
//! Values of different types compare by type rank:
//! absent < undefined < null < boolean < number < string.
//! Objects and arrays have no rank and cannot be ordered.

use std::cmp::Ordering;

use serde_json::Value;

use super::plan::SortOrder;
use crate::core::{ClientError, ClientResult};

/// A scalar lifted into a totally ordered key
#[derive(Debug, Clone, PartialEq)]
pub enum OrderValue {
    /// No order-by item at this position
    Absent,
    /// Item present but its value is undefined (`{}`)
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// UTF-16 code units, the service's string order
    String(Vec<u16>),
}

impl OrderValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Absent => 0,
            Self::Undefined => 1,
            Self::Null => 2,
            Self::Bool(_) => 3,
            Self::Number(_) => 4,
            Self::String(_) => 5,
        }
    }

    /// Lift a JSON value; `None` is undefined.
    pub fn from_value(value: Option<&Value>) -> ClientResult<Self> {
        match value {
            None => Ok(Self::Undefined),
            Some(Value::Null) => Ok(Self::Null),
            Some(Value::Bool(b)) => Ok(Self::Bool(*b)),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| ClientError::incomparable(format!("Number {} is not comparable", n))),
            Some(Value::String(s)) => Ok(Self::String(s.encode_utf16().collect())),
            Some(other) => Err(ClientError::incomparable(format!(
                "Values of type {} cannot be ordered",
                type_name(other)
            ))),
        }
    }

    /// Lift one entry of an `orderByItems` array (`{"item": v}` or `{}`).
    pub fn from_order_by_item(entry: Option<&Value>) -> ClientResult<Self> {
        match entry {
            None => Ok(Self::Absent),
            Some(item) => Self::from_value(item.get("item")),
        }
    }
}

impl Eq for OrderValue {}

impl PartialOrd for OrderValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Composite order-by key of one result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey(pub Vec<OrderValue>);

impl SortKey {
    /// Key from a row shaped `{"orderByItems": [{"item": v}, ...], ...}`.
    pub fn from_row(row: &Value, key_count: usize) -> ClientResult<Self> {
        let items = row.get("orderByItems").and_then(Value::as_array);
        let mut values = Vec::with_capacity(key_count);
        for i in 0..key_count {
            values.push(OrderValue::from_order_by_item(items.and_then(|a| a.get(i)))?);
        }
        Ok(Self(values))
    }

    /// Lexicographic comparison applying each key's direction.
    pub fn compare(&self, other: &SortKey, orders: &[SortOrder]) -> Ordering {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let ord = a.cmp(b);
            let ord = match orders.get(i) {
                Some(SortOrder::Descending) => ord.reverse(),
                _ => ord,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Compare two JSON scalars by type rank, `None` being undefined.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> ClientResult<Ordering> {
    Ok(OrderValue::from_value(a)?.cmp(&OrderValue::from_value(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_rank() {
        let ordered = vec![
            OrderValue::Absent,
            OrderValue::Undefined,
            OrderValue::Null,
            OrderValue::Bool(false),
            OrderValue::Bool(true),
            OrderValue::Number(-1.0),
            OrderValue::Number(10.0),
            OrderValue::String("".encode_utf16().collect()),
            OrderValue::String("a".encode_utf16().collect()),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_integer_and_float_compare_equal() {
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(2.0))).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_strings_compare_by_utf16_units() {
        // U+FF61 sorts after U+1F600 by code point but before it in UTF-16
        let a = json!("\u{1F600}");
        let b = json!("\u{FF61}");
        assert_eq!(compare_values(Some(&a), Some(&b)).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_objects_are_incomparable() {
        let err = compare_values(Some(&json!({"a": 1})), Some(&json!(1))).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_sort_key_directions() {
        let a = SortKey::from_row(&json!({"orderByItems": [{"item": 1}, {"item": "x"}]}), 2).unwrap();
        let b = SortKey::from_row(&json!({"orderByItems": [{"item": 1}, {"item": "y"}]}), 2).unwrap();
        let asc = [SortOrder::Ascending, SortOrder::Ascending];
        let mixed = [SortOrder::Ascending, SortOrder::Descending];
        assert_eq!(a.compare(&b, &asc), Ordering::Less);
        assert_eq!(a.compare(&b, &mixed), Ordering::Greater);
    }

    #[test]
    fn test_missing_and_undefined_items() {
        let row = json!({"orderByItems": [{}]});
        let key = SortKey::from_row(&row, 2).unwrap();
        assert_eq!(key.0, vec![OrderValue::Undefined, OrderValue::Absent]);
    }
}
