//! Partition key hashing
//!
//! Maps logical partition key values to effective partition keys, the
//! sortable hex strings that partition key ranges are defined over.
//!
//! - V1: 32-bit MurmurHash3 over truncated values, followed by a binary
//!   encoding of the hash and the value
//! - V2: 128-bit MurmurHash3, halves byte-reversed, top two bits cleared
//! - MultiHash: per-component V2 digests concatenated
//!
//! Hashing is a pure function of the key and the version. Any deviation
//! from the service's algorithm routes requests to the wrong partition.

mod encoding;
mod murmur;
mod partition_key;

pub use encoding::{to_hex_upper, V1_MAX_STRING_CHARS};
pub use murmur::{murmur3_128, murmur3_32};
pub use partition_key::{
    hash, hash_multi, hash_v1, hash_v2, parse_path, HashVersion, PartitionKey,
    PartitionKeyDefinition, PartitionKeyValue, PartitionKind,
};
