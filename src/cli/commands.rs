//! CLI command implementations
//!
//! Commands return their output text; `run` prints it.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::hashing::{HashVersion, PartitionKey, PartitionKeyDefinition};
use crate::routing::{PartitionKeyRange, RoutingMap};
use crate::session::VectorSessionToken;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Dispatch one parsed command.
pub fn run_command(command: Command) -> CliResult<String> {
    match command {
        Command::Epk { version, multi_hash, key } => epk(version, multi_hash, &key),
        Command::Route {
            ranges,
            version,
            multi_hash,
            key,
        } => route(&ranges, version, multi_hash, &key),
        Command::SessionMerge { first, second } => session_merge(&first, &second),
    }
}

fn parse_key(key: &str) -> CliResult<PartitionKey> {
    let value: Value = serde_json::from_str(key)
        .map_err(|e| CliError::invalid_argument(format!("Key is not valid JSON: {}", e)))?;
    Ok(PartitionKey::from_json(&value)?)
}

fn definition(version: u8, multi_hash: bool, key: &PartitionKey) -> CliResult<PartitionKeyDefinition> {
    if multi_hash {
        let paths = (0..key.components().len()).map(|i| format!("/k{}", i)).collect();
        return Ok(PartitionKeyDefinition::multi_hash(paths));
    }
    let version = HashVersion::try_from(version).map_err(CliError::invalid_argument)?;
    Ok(PartitionKeyDefinition::hash("/pk", version))
}

fn effective_key(version: u8, multi_hash: bool, key: &str) -> CliResult<String> {
    let key = parse_key(key)?;
    let definition = definition(version, multi_hash, &key)?;
    Ok(definition.effective_partition_key(&key)?)
}

/// Effective partition key of a JSON key.
pub fn epk(version: u8, multi_hash: bool, key: &str) -> CliResult<String> {
    effective_key(version, multi_hash, key)
}

/// Owning range id of a key within the ranges saved at `ranges_path`.
///
/// The file holds either a bare array of ranges or a `pkranges` feed body
/// (`{"PartitionKeyRanges": [...]}`).
pub fn route(ranges_path: &Path, version: u8, multi_hash: bool, key: &str) -> CliResult<String> {
    let content = fs::read_to_string(ranges_path).map_err(|e| {
        CliError::io_error(format!("Failed to read {}: {}", ranges_path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content)?;
    let list = match value {
        Value::Object(mut feed) => feed.remove("PartitionKeyRanges").unwrap_or(Value::Null),
        other => other,
    };
    let ranges: Vec<PartitionKeyRange> = serde_json::from_value(list)?;
    let map = RoutingMap::build(ranges)?;

    let epk = effective_key(version, multi_hash, key)?;
    let range = map
        .range_for_epk(&epk)
        .ok_or_else(|| CliError::invalid_argument(format!("No range owns effective key '{}'", epk)))?;
    tracing::debug!(epk = %epk, range = %range.id, "key routed");
    Ok(range.id.clone())
}

/// Merge two vector session tokens.
pub fn session_merge(first: &str, second: &str) -> CliResult<String> {
    let a: VectorSessionToken = first.parse()?;
    let b: VectorSessionToken = second.parse()?;
    Ok(a.merge(&b)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::PartitionKeyValue;
    use crate::cli::CliErrorCode;

    #[test]
    fn test_epk_matches_hashing() {
        let expected = PartitionKeyDefinition::hash("/pk", HashVersion::V2)
            .effective_partition_key(&PartitionKey::single("tenant-1"))
            .unwrap();
        assert_eq!(epk(2, false, r#""tenant-1""#).unwrap(), expected);
    }

    #[test]
    fn test_epk_multi_hash() {
        let key = PartitionKey(vec![PartitionKeyValue::from("a"), PartitionKeyValue::Number(1.0)]);
        let expected = PartitionKeyDefinition::multi_hash(vec!["/k0".into(), "/k1".into()])
            .effective_partition_key(&key)
            .unwrap();
        assert_eq!(epk(2, true, r#"["a", 1]"#).unwrap(), expected);
    }

    #[test]
    fn test_epk_rejects_bad_input() {
        assert_eq!(epk(2, false, "not json").unwrap_err().code(), &CliErrorCode::InvalidArgument);
        assert_eq!(epk(3, false, "1").unwrap_err().code(), &CliErrorCode::InvalidArgument);
    }

    #[test]
    fn test_route_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(
            &path,
            r#"{"PartitionKeyRanges": [
                {"id": "0", "minInclusive": "", "maxExclusive": "3FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"},
                {"id": "1", "minInclusive": "3FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF", "maxExclusive": "FF"}
            ]}"#,
        )
        .unwrap();

        let epk = epk(2, false, r#""tenant-1""#).unwrap();
        let expected = if epk.as_str() < "3FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF" { "0" } else { "1" };
        assert_eq!(route(&path, 2, false, r#""tenant-1""#).unwrap(), expected);
    }

    #[test]
    fn test_route_rejects_gapped_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, r#"[{"id": "0", "minInclusive": "", "maxExclusive": "80"}]"#).unwrap();
        let err = route(&path, 2, false, "1").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::EngineError);
    }

    #[test]
    fn test_route_missing_file() {
        let err = route(Path::new("/nonexistent/ranges.json"), 2, false, "1").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::IoError);
    }

    #[test]
    fn test_session_merge() {
        let merged = session_merge("1#100#1=20#2=5", "1#90#1=10#2=8").unwrap();
        assert_eq!(merged, "1#100#1=20#2=8");
    }
}
