//! Hashing and Routing Tests
//!
//! Effective partition keys and their owning ranges:
//! - V1, V2 and multi-hash keys have the service's shape
//! - every key routes to exactly one range of a complete catalog
//! - the catalog answers range queries and heals after a split

mod common;

use std::sync::Arc;

use aerolink::core::ErrorKind;
use aerolink::hashing::{hash_v1, hash_v2, HashVersion, PartitionKey, PartitionKeyDefinition, PartitionKeyValue};
use aerolink::routing::{PartitionCatalog, PartitionKeyRange, QueryRange, RoutingMap};
use common::{after_split, two_ranges, SequencedRanges, CONTAINER};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn v2() -> PartitionKeyDefinition {
    PartitionKeyDefinition::hash("/pk", HashVersion::V2)
}

fn quarter_map() -> RoutingMap {
    RoutingMap::build(vec![
        PartitionKeyRange::new("0", "", "10000000000000000000000000000000"),
        PartitionKeyRange::new("1", "10000000000000000000000000000000", "20000000000000000000000000000000"),
        PartitionKeyRange::new("2", "20000000000000000000000000000000", "30000000000000000000000000000000"),
        PartitionKeyRange::new("3", "30000000000000000000000000000000", "FF"),
    ])
    .unwrap()
}

// =============================================================================
// Effective Partition Key Tests
// =============================================================================

/// V2 keys are 16 bytes of uppercase hex with the top two bits clear.
#[test]
fn test_v2_key_shape() {
    for key in [json!("tenant-1"), json!(42), json!(true), json!(null), json!("")] {
        let epk = v2().effective_partition_key(&PartitionKey::from_json(&key).unwrap()).unwrap();
        assert_eq!(epk.len(), 32, "{}", key);
        assert!(epk.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert!(epk.as_str() < "40", "top bits set for {}", key);
    }
}

#[test]
fn test_hashing_is_deterministic_and_type_aware() {
    let a = v2().effective_partition_key(&PartitionKey::single("5")).unwrap();
    let b = v2().effective_partition_key(&PartitionKey::single("5")).unwrap();
    let n = v2().effective_partition_key(&PartitionKey::single(5.0)).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, n);

    let null = v2().effective_partition_key(&PartitionKey(vec![PartitionKeyValue::Null])).unwrap();
    let undefined = v2().effective_partition_key(&PartitionKey(vec![PartitionKeyValue::Undefined])).unwrap();
    assert_ne!(null, undefined);
}

/// V1 keys carry the binary-encoded value after the hash.
#[test]
fn test_v1_key_suffix() {
    let v1 = PartitionKeyDefinition::hash("/pk", HashVersion::V1);
    let number = v1.effective_partition_key(&PartitionKey::single(5.0)).unwrap();
    assert!(number.ends_with("05C014"), "{}", number);
    let string = v1.effective_partition_key(&PartitionKey::single("ab")).unwrap();
    assert!(string.ends_with("08626300"), "{}", string);
}

/// Known effective keys computed by the service.
#[test]
fn test_v2_matches_service_vectors() {
    let cases = [
        (json!("redmond"), "22E342F38A486A088463DFF7838A5963"),
        (json!(""), "32E9366E637A71B4E710384B2F4970A0"),
        (json!(5.5), "0E2EE47829D1AF775EEFB6540FD1D0ED"),
        (json!(null), "378867E4430E67857ACE5C908374FE16"),
        (json!({}), "11622DAA78F835834610ABE56EFF5CB5"),
    ];
    for (key, expected) in cases {
        let epk = v2().effective_partition_key(&PartitionKey::from_json(&key).unwrap()).unwrap();
        assert_eq!(epk, expected, "{}", key);
    }
}

#[test]
fn test_v1_matches_service_vectors() {
    let v1 = PartitionKeyDefinition::hash("/pk", HashVersion::V1);
    let cases = [
        (json!(""), "05C1CF33970FF80800"),
        (json!("partitionKey"), "05C1E1B3D9CD2608716273756A756A706F4C667A00"),
        (json!(12313.1221), "05C1ED154D592E05C0C90723F50FC925D8"),
        (json!(true), "05C1D7C5A903D803"),
    ];
    for (key, expected) in cases {
        let epk = v1.effective_partition_key(&PartitionKey::from_json(&key).unwrap()).unwrap();
        assert_eq!(epk, expected, "{}", key);
    }
}

/// V1 only sees the first 100 characters of a string; V2 sees all of it.
#[test]
fn test_v1_truncates_long_strings() {
    let long = PartitionKeyValue::from("a".repeat(150).as_str());
    let hundred = PartitionKeyValue::from("a".repeat(100).as_str());
    let shorter = PartitionKeyValue::from("a".repeat(99).as_str());

    assert_eq!(hash_v1(&[long.clone()]), hash_v1(&[hundred.clone()]));
    assert_ne!(hash_v1(&[hundred.clone()]), hash_v1(&[shorter]));
    assert_ne!(hash_v2(&[long]), hash_v2(&[hundred]));
}

/// Multi-hash keys concatenate per-component V2 hashes; prefixes of a
/// hierarchical key hash to prefixes of its effective key.
#[test]
fn test_multi_hash_prefixes() {
    let def = PartitionKeyDefinition::multi_hash(vec!["/tenant".into(), "/user".into()]);
    let full = PartitionKey(vec!["acme".into(), "alice".into()]);
    let prefix = PartitionKey(vec!["acme".into()]);

    let full_epk = def.effective_partition_key(&full).unwrap();
    let prefix_epk = def.effective_partition_key(&prefix).unwrap();
    assert_eq!(full_epk.len(), 64);
    assert_eq!(prefix_epk, hash_v2(&[PartitionKeyValue::from("acme")]));
    assert!(full_epk.starts_with(&prefix_epk));
}

#[test]
fn test_too_many_components_rejected() {
    let err = v2()
        .effective_partition_key(&PartitionKey(vec!["a".into(), "b".into()]))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

// =============================================================================
// Routing Map Tests
// =============================================================================

/// Every key is owned by exactly one range.
#[test]
fn test_every_key_has_one_owner() {
    let map = quarter_map();
    for i in 0..200 {
        let epk = v2().effective_partition_key(&PartitionKey::single(format!("key-{}", i).as_str())).unwrap();
        let owners: Vec<_> = map.ordered_ranges().iter().filter(|r| r.contains(&epk)).collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(map.range_for_epk(&epk).unwrap().id, owners[0].id);
    }
}

#[test]
fn test_incomplete_catalog_rejected() {
    let gap = RoutingMap::build(vec![
        PartitionKeyRange::new("0", "", "40"),
        PartitionKeyRange::new("1", "50", "FF"),
    ]);
    assert!(gap.is_err());
}

#[test]
fn test_overlapping_ranges_for_partial_query() {
    let map = quarter_map();
    let hits = map
        .overlapping_ranges(&[QueryRange::new(
            "18000000000000000000000000000000",
            "28000000000000000000000000000000",
            true,
            false,
        )])
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

// =============================================================================
// Catalog Tests
// =============================================================================

/// A forced refresh replaces a split parent with its children.
#[tokio::test]
async fn test_catalog_refresh_after_split() {
    let source = Arc::new(SequencedRanges::new(vec![two_ranges(), after_split()]));
    let catalog = PartitionCatalog::new(source.clone());

    let before = catalog.overlapping_ranges(CONTAINER, &[QueryRange::full()], false).await.unwrap();
    assert_eq!(before.len(), 2);

    let cached = catalog.overlapping_ranges(CONTAINER, &[QueryRange::full()], false).await.unwrap();
    assert_eq!(cached, before);
    assert_eq!(source.reads(), 1);

    let parent = before[0].to_query_range();
    let children = catalog.overlapping_ranges(CONTAINER, &[parent], true).await.unwrap();
    let ids: Vec<_> = children.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);
}

#[tokio::test]
async fn test_unsorted_query_ranges_rejected() {
    let catalog = PartitionCatalog::new(Arc::new(SequencedRanges::fixed(two_ranges())));
    let err = catalog
        .overlapping_ranges(
            CONTAINER,
            &[QueryRange::new("80", "FF", true, false), QueryRange::new("", "40", true, false)],
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}
