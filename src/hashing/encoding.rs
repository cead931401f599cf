//! Byte encodings fed to the hash functions and the V1 binary key format

use super::partition_key::PartitionKeyValue;

/// Type markers shared by both hash versions
pub(crate) mod prefix {
    pub const UNDEFINED: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const NUMBER: u8 = 0x05;
    pub const STRING: u8 = 0x08;
}

/// Strings longer than this (in chars) are truncated before V1 hashing.
pub const V1_MAX_STRING_CHARS: usize = 100;

/// V1 binary encoding stops after this many string bytes.
const V1_MAX_STRING_BYTES: usize = 100;

/// Terminator after a V2 string component
const V2_STRING_SUFFIX: u8 = 0xFF;

const SIGN_BIT: u64 = 1 << 63;

/// Truncate a string to at most `V1_MAX_STRING_CHARS` characters.
pub fn truncate_v1(value: &str) -> &str {
    match value.char_indices().nth(V1_MAX_STRING_CHARS) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn write_scalar_prefix(value: &PartitionKeyValue, out: &mut Vec<u8>) -> bool {
    match value {
        PartitionKeyValue::Undefined => out.push(prefix::UNDEFINED),
        PartitionKeyValue::Null => out.push(prefix::NULL),
        PartitionKeyValue::Bool(false) => out.push(prefix::FALSE),
        PartitionKeyValue::Bool(true) => out.push(prefix::TRUE),
        PartitionKeyValue::Number(n) => {
            out.push(prefix::NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        PartitionKeyValue::String(_) => return false,
    }
    true
}

/// Bytes hashed by V1: strings are truncated and NUL-terminated.
pub fn write_for_hashing_v1(value: &PartitionKeyValue, out: &mut Vec<u8>) {
    if let PartitionKeyValue::String(s) = value {
        out.push(prefix::STRING);
        out.extend_from_slice(truncate_v1(s).as_bytes());
        out.push(prefix::UNDEFINED);
    } else {
        write_scalar_prefix(value, out);
    }
}

/// Bytes hashed by V2: strings are never truncated and end with 0xFF.
pub fn write_for_hashing_v2(value: &PartitionKeyValue, out: &mut Vec<u8>) {
    if let PartitionKeyValue::String(s) = value {
        out.push(prefix::STRING);
        out.extend_from_slice(s.as_bytes());
        out.push(V2_STRING_SUFFIX);
    } else {
        write_scalar_prefix(value, out);
    }
}

/// Order-preserving variable-length encoding of a double.
///
/// The sign-flipped IEEE-754 bits are written as one full leading byte
/// followed by 7-bit groups with the low bit as a continuation flag.
pub fn write_number_binary(value: f64, out: &mut Vec<u8>) {
    out.push(prefix::NUMBER);

    let bits = value.to_bits();
    let mut payload = if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        (!bits).wrapping_add(1)
    };

    out.push((payload >> 56) as u8);
    payload <<= 8;

    let mut pending: Option<u8> = None;
    loop {
        if let Some(byte) = pending {
            out.push(byte);
        }
        let byte = ((payload >> 56) as u8) | 0x01;
        payload <<= 7;
        if payload == 0 {
            out.push(byte & 0xFE);
            break;
        }
        pending = Some(byte);
    }
}

/// V1 binary encoding of a (truncated) component value.
pub fn write_value_binary(value: &PartitionKeyValue, out: &mut Vec<u8>) {
    match value {
        PartitionKeyValue::Number(n) => write_number_binary(*n, out),
        PartitionKeyValue::String(s) => {
            out.push(prefix::STRING);
            let bytes = truncate_v1(s).as_bytes();
            let short = bytes.len() <= V1_MAX_STRING_BYTES;
            let take = if short { bytes.len() } else { V1_MAX_STRING_BYTES + 1 };
            for b in &bytes[..take] {
                out.push(if *b < 0xFF { *b + 1 } else { *b });
            }
            if short {
                out.push(prefix::UNDEFINED);
            }
        }
        other => {
            write_scalar_prefix(other, out);
        }
    }
}

/// Uppercase hex rendering.
pub fn to_hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02X}", b);
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_hex(v: f64) -> String {
        let mut out = Vec::new();
        write_number_binary(v, &mut out);
        to_hex_upper(&out)
    }

    #[test]
    fn test_number_encoding() {
        assert_eq!(number_hex(5.0), "05C014");
        assert_eq!(number_hex(12313.0), "05C0C90720");
    }

    #[test]
    fn test_number_encoding_preserves_order() {
        let values = [-1000.5, -1.0, -0.25, 0.0, 0.25, 1.0, 7.0, 1e9];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                let mut out = Vec::new();
                write_number_binary(*v, &mut out);
                out
            })
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_string_binary_adds_one_and_terminates() {
        let mut out = Vec::new();
        write_value_binary(&PartitionKeyValue::String("ab".into()), &mut out);
        assert_eq!(out, vec![0x08, b'a' + 1, b'b' + 1, 0x00]);
    }

    #[test]
    fn test_long_multibyte_string_is_not_terminated() {
        // 60 two-byte chars fit the char limit but exceed the byte limit
        let s: String = std::iter::repeat('é').take(60).collect();
        let mut out = Vec::new();
        write_value_binary(&PartitionKeyValue::String(s), &mut out);
        assert_eq!(out.len(), 1 + 101);
        assert_ne!(*out.last().unwrap(), 0x00);
    }

    #[test]
    fn test_truncate_counts_chars() {
        let s = "a".repeat(150);
        assert_eq!(truncate_v1(&s).len(), 100);
        assert_eq!(truncate_v1("short"), "short");
    }

    #[test]
    fn test_hashing_prefixes() {
        let mut v1 = Vec::new();
        write_for_hashing_v1(&PartitionKeyValue::String("x".into()), &mut v1);
        assert_eq!(v1, vec![0x08, b'x', 0x00]);

        let mut v2 = Vec::new();
        write_for_hashing_v2(&PartitionKeyValue::String("x".into()), &mut v2);
        assert_eq!(v2, vec![0x08, b'x', 0xFF]);

        let mut b = Vec::new();
        write_for_hashing_v2(&PartitionKeyValue::Bool(true), &mut b);
        assert_eq!(b, vec![0x03]);
    }
}
