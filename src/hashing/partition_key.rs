//! Logical partition keys and their effective (hashed) form

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::encoding::{
    to_hex_upper, truncate_v1, write_for_hashing_v1, write_for_hashing_v2, write_number_binary,
    write_value_binary,
};
use super::murmur::{murmur3_128, murmur3_32};
use crate::core::{ClientError, ClientResult};

/// One component of a logical partition key
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKeyValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    /// The "not present" marker; serialized as `{}`
    Undefined,
}

impl PartitionKeyValue {
    /// Convert one JSON scalar. `{}` is the not-present marker.
    pub fn from_json(value: &Value) -> ClientResult<Self> {
        match value {
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| ClientError::invalid_input(format!("Unsupported number {}", n))),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Null => Ok(Self::Null),
            Value::Object(map) if map.is_empty() => Ok(Self::Undefined),
            other => Err(ClientError::invalid_input(format!(
                "Partition key component must be a scalar, got {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => number_to_json(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Null => Value::Null,
            Self::Undefined => Value::Object(Map::new()),
        }
    }
}

/// Integral values render without a fractional part.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for PartitionKeyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<f64> for PartitionKeyValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for PartitionKeyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A logical partition key: one component per definition path
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionKey(pub Vec<PartitionKeyValue>);

impl PartitionKey {
    pub fn single(value: impl Into<PartitionKeyValue>) -> Self {
        Self(vec![value.into()])
    }

    /// Key for items stored without a partition key value.
    pub fn none(definition: &PartitionKeyDefinition) -> Self {
        Self(vec![PartitionKeyValue::Undefined; definition.paths.len().max(1)])
    }

    /// Accepts a scalar or an array of scalars.
    pub fn from_json(value: &Value) -> ClientResult<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(PartitionKeyValue::from_json)
                .collect::<ClientResult<Vec<_>>>()
                .map(Self),
            other => Ok(Self(vec![PartitionKeyValue::from_json(other)?])),
        }
    }

    pub fn components(&self) -> &[PartitionKeyValue] {
        &self.0
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(PartitionKeyValue::to_json).collect())
    }

    /// Header form: JSON array with non-ASCII characters escaped as `\uXXXX`.
    pub fn to_header_value(&self) -> String {
        escape_non_ascii(&self.to_json().to_string())
    }
}

fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitionKind {
    #[default]
    Hash,
    MultiHash,
}

/// Hash algorithm version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HashVersion {
    #[default]
    V1,
    V2,
}

impl TryFrom<u8> for HashVersion {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(format!("unsupported partition key version {}", other)),
        }
    }
}

impl From<HashVersion> for u8 {
    fn from(v: HashVersion) -> u8 {
        match v {
            HashVersion::V1 => 1,
            HashVersion::V2 => 2,
        }
    }
}

/// Container partition key definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    #[serde(default)]
    pub kind: PartitionKind,
    #[serde(default)]
    pub version: HashVersion,
}

impl PartitionKeyDefinition {
    pub fn hash(path: impl Into<String>, version: HashVersion) -> Self {
        Self {
            paths: vec![path.into()],
            kind: PartitionKind::Hash,
            version,
        }
    }

    pub fn multi_hash(paths: Vec<String>) -> Self {
        Self {
            paths,
            kind: PartitionKind::MultiHash,
            version: HashVersion::V2,
        }
    }

    /// Effective partition key of `key` under this definition.
    pub fn effective_partition_key(&self, key: &PartitionKey) -> ClientResult<String> {
        if key.0.len() > self.paths.len().max(1) {
            return Err(ClientError::invalid_input(format!(
                "Partition key has {} components but the definition has {} paths",
                key.0.len(),
                self.paths.len()
            )));
        }
        Ok(match self.kind {
            PartitionKind::MultiHash => hash_multi(key.components()),
            PartitionKind::Hash => hash(key.components(), self.version),
        })
    }

    /// Pull the key out of a document by the definition's paths.
    ///
    /// Missing paths yield the not-present marker; objects and arrays at a
    /// key path are rejected.
    pub fn extract(&self, document: &Value) -> ClientResult<PartitionKey> {
        let mut components = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let mut current = Some(document);
            for part in parse_path(path)? {
                current = current.and_then(|v| v.as_object()).and_then(|o| o.get(&part));
            }
            let component = match current {
                None => PartitionKeyValue::Undefined,
                Some(value) => PartitionKeyValue::from_json(value)?,
            };
            components.push(component);
        }
        Ok(PartitionKey(components))
    }
}

/// Split `/a/"b/c"/d` into `["a", "b/c", "d"]`.
pub fn parse_path(path: &str) -> ClientResult<Vec<String>> {
    let invalid = || ClientError::invalid_input(format!("Invalid partition key path '{}'", path));
    let mut parts = Vec::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '/' {
            return Err(invalid());
        }
        let mut segment = String::new();
        match chars.peek().copied() {
            Some(q @ ('"' | '\'')) => {
                chars.next();
                loop {
                    match chars.next() {
                        Some('\\') => segment.push(chars.next().ok_or_else(invalid)?),
                        Some(ch) if ch == q => break,
                        Some(ch) => segment.push(ch),
                        None => return Err(invalid()),
                    }
                }
            }
            _ => {
                while let Some(&ch) = chars.peek() {
                    if ch == '/' {
                        break;
                    }
                    segment.push(ch);
                    chars.next();
                }
            }
        }
        if segment.is_empty() {
            return Err(invalid());
        }
        parts.push(segment);
    }

    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts)
}

/// Effective partition key for a single-hash container.
pub fn hash(components: &[PartitionKeyValue], version: HashVersion) -> String {
    match version {
        HashVersion::V1 => hash_v1(components),
        HashVersion::V2 => hash_v2(components),
    }
}

/// 32-bit hash followed by the V1 binary encoding of the truncated values.
pub fn hash_v1(components: &[PartitionKeyValue]) -> String {
    if components.is_empty() {
        return String::new();
    }
    let truncated: Vec<PartitionKeyValue> = components
        .iter()
        .map(|c| match c {
            PartitionKeyValue::String(s) => PartitionKeyValue::String(truncate_v1(s).to_string()),
            other => other.clone(),
        })
        .collect();

    let mut to_hash = Vec::new();
    for c in &truncated {
        write_for_hashing_v1(c, &mut to_hash);
    }
    let digest = murmur3_32(&to_hash, 0);

    let mut out = Vec::new();
    write_number_binary(f64::from(digest), &mut out);
    for c in &truncated {
        write_value_binary(c, &mut out);
    }
    to_hex_upper(&out)
}

/// 128-bit hash of all components, halves byte-reversed, top 2 bits cleared.
pub fn hash_v2(components: &[PartitionKeyValue]) -> String {
    if components.is_empty() {
        return String::new();
    }
    let mut to_hash = Vec::new();
    for c in components {
        write_for_hashing_v2(c, &mut to_hash);
    }
    let (h1, h2) = murmur3_128(&to_hash, 0);

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&h1.to_le_bytes());
    bytes[8..].copy_from_slice(&h2.to_le_bytes());
    bytes.reverse();
    bytes[0] &= 0x3F;
    to_hex_upper(&bytes)
}

/// Concatenated per-component V2 hashes.
pub fn hash_multi(components: &[PartitionKeyValue]) -> String {
    components
        .iter()
        .map(|c| hash_v2(std::slice::from_ref(c)))
        .collect()
}
