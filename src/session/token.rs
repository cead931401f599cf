//! Vector session tokens
//!
//! Format: `version#globalLsn#region1=lsn1#region2=lsn2...`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::{ClientError, ClientResult};

/// Per-range vector clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSessionToken {
    pub version: u64,
    pub global_lsn: i64,
    pub region_lsns: BTreeMap<u32, i64>,
}

impl VectorSessionToken {
    pub fn new(version: u64, global_lsn: i64, region_lsns: BTreeMap<u32, i64>) -> Self {
        Self {
            version,
            global_lsn,
            region_lsns,
        }
    }

    /// Component-wise maximum.
    ///
    /// The higher version's region set wins. Equal versions must name the
    /// same regions.
    pub fn merge(&self, other: &VectorSessionToken) -> ClientResult<VectorSessionToken> {
        let same_version = self.version == other.version;
        if same_version && self.region_lsns.len() != other.region_lsns.len() {
            return Err(mismatch(self, other));
        }

        let (higher, lower) = if self.version < other.version {
            (other, self)
        } else {
            (self, other)
        };

        let mut region_lsns = BTreeMap::new();
        for (region, high_lsn) in &higher.region_lsns {
            match lower.region_lsns.get(region) {
                Some(low_lsn) => {
                    region_lsns.insert(*region, (*high_lsn).max(*low_lsn));
                }
                None if same_version => return Err(mismatch(self, other)),
                None => {
                    region_lsns.insert(*region, *high_lsn);
                }
            }
        }

        Ok(VectorSessionToken {
            version: self.version.max(other.version),
            global_lsn: self.global_lsn.max(other.global_lsn),
            region_lsns,
        })
    }
}

fn mismatch(a: &VectorSessionToken, b: &VectorSessionToken) -> ClientError {
    ClientError::internal(format!(
        "Compared session tokens {} and {} have unexpected regions",
        a, b
    ))
}

impl FromStr for VectorSessionToken {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::invalid_input(format!("Invalid session token '{}'", s));
        let mut parts = s.split('#');
        let version = parts
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let global_lsn = parts
            .next()
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(invalid)?;

        let mut region_lsns = BTreeMap::new();
        for segment in parts {
            let (region, lsn) = segment.split_once('=').ok_or_else(invalid)?;
            let region = region.parse::<u32>().map_err(|_| invalid())?;
            let lsn = lsn.parse::<i64>().map_err(|_| invalid())?;
            region_lsns.insert(region, lsn);
        }
        Ok(Self::new(version, global_lsn, region_lsns))
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn)?;
        for (region, lsn) in &self.region_lsns {
            write!(f, "#{}={}", region, lsn)?;
        }
        Ok(())
    }
}

/// Split `range1:token1,range2:token2` into pairs.
pub fn parse_partitioned(value: &str) -> ClientResult<Vec<(String, VectorSessionToken)>> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (range, token) = part.trim().split_once(':').ok_or_else(|| {
                ClientError::invalid_input(format!("Session token '{}' lacks a range id", part))
            })?;
            Ok((range.to_string(), token.parse()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> VectorSessionToken {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let t = token("1#100#1=20#2=30");
        assert_eq!(t.version, 1);
        assert_eq!(t.global_lsn, 100);
        assert_eq!(t.region_lsns.get(&2), Some(&30));
        assert_eq!(t.to_string(), "1#100#1=20#2=30");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<VectorSessionToken>().is_err());
        assert!("1#x".parse::<VectorSessionToken>().is_err());
        assert!("1#5#region".parse::<VectorSessionToken>().is_err());
    }

    #[test]
    fn test_merge_same_version_takes_max() {
        let merged = token("1#100#1=20#2=35").merge(&token("1#90#1=25#2=30")).unwrap();
        assert_eq!(merged.to_string(), "1#100#1=25#2=35");
    }

    #[test]
    fn test_merge_higher_version_regions_win() {
        let merged = token("1#100#1=20").merge(&token("2#90#1=10#3=5")).unwrap();
        assert_eq!(merged.to_string(), "2#100#1=20#3=5");
    }

    #[test]
    fn test_merge_same_version_region_mismatch() {
        assert!(token("1#100#1=20").merge(&token("1#100#1=20#2=1")).is_err());
        assert!(token("1#100#1=20").merge(&token("1#100#2=20")).is_err());
    }

    #[test]
    fn test_parse_partitioned() {
        let pairs = parse_partitioned("0:1#100#1=20,1:1#50#1=10").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, "1");
        assert!(parse_partitioned("1#100").is_err());
    }
}
