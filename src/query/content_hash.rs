//! Stable content hashing of JSON values
//!
//! Object keys are hashed in sorted order and integral numbers hash the
//! same whether written as `1` or `1.0`, so equal documents hash equally
//! regardless of serialization details.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// 256-bit digest of a JSON value
pub type ContentHash = [u8; 32];

pub fn content_hash(value: &Value) -> ContentHash {
    let mut hasher = Sha256::new();
    feed(&mut hasher, value);
    hasher.finalize().into()
}

fn feed(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => hasher.update([1u8, *b as u8]),
        Value::Number(n) => {
            hasher.update([2u8]);
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                    hasher.update((f as i64).to_le_bytes())
                }
                Some(f) => hasher.update(f.to_bits().to_le_bytes()),
                None => hasher.update(n.to_string().as_bytes()),
            }
        }
        Value::String(s) => {
            hasher.update([3u8]);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update([4u8]);
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([5u8]);
            hasher.update((map.len() as u64).to_le_bytes());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                hasher.update((key.len() as u64).to_le_bytes());
                hasher.update(key.as_bytes());
                feed(hasher, &map[key]);
            }
        }
    }
}
