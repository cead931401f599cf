//! Resource and operation model
//!
//! Every request the engine sends targets one resource type with one
//! operation type. Paths look like `dbs/{db}/colls/{coll}/docs/{id}` and may
//! address resources by name or by resource id (rid).

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Resource types addressed by requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Account-level call with no resource (topology discovery)
    None,
    DatabaseAccount,
    Database,
    Container,
    Item,
    StoredProcedure,
    Trigger,
    UserDefinedFunction,
    Conflict,
    User,
    Permission,
    Offer,
    Topology,
    PartitionKeyRange,
}

impl ResourceType {
    /// Path segment naming this resource type
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::None | Self::DatabaseAccount => "",
            Self::Database => "dbs",
            Self::Container => "colls",
            Self::Item => "docs",
            Self::StoredProcedure => "sprocs",
            Self::Trigger => "triggers",
            Self::UserDefinedFunction => "udfs",
            Self::Conflict => "conflicts",
            Self::User => "users",
            Self::Permission => "permissions",
            Self::Offer => "offers",
            Self::Topology => "topology",
            Self::PartitionKeyRange => "pkranges",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        let t = match segment.to_ascii_lowercase().as_str() {
            "dbs" => Self::Database,
            "colls" => Self::Container,
            "docs" => Self::Item,
            "sprocs" => Self::StoredProcedure,
            "triggers" => Self::Trigger,
            "udfs" => Self::UserDefinedFunction,
            "conflicts" => Self::Conflict,
            "users" => Self::User,
            "permissions" => Self::Permission,
            "offers" => Self::Offer,
            "topology" => Self::Topology,
            "pkranges" => Self::PartitionKeyRange,
            _ => return None,
        };
        Some(t)
    }
}

/// Operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Replace,
    Upsert,
    Delete,
    Read,
    Query,
    QueryPlan,
    Execute,
    Batch,
    Patch,
}

impl OperationType {
    /// Reads never change server state and may be retried after a timeout.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Read | Self::Query | Self::QueryPlan)
    }

    pub fn http_method(&self) -> HttpMethod {
        match self {
            Self::Read => HttpMethod::Get,
            Self::Create | Self::Query | Self::QueryPlan | Self::Execute | Self::Batch | Self::Upsert => {
                HttpMethod::Post
            }
            Self::Replace => HttpMethod::Put,
            Self::Delete => HttpMethod::Delete,
            Self::Patch => HttpMethod::Patch,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Replace => "replace",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Read => "read",
            Self::Query => "query",
            Self::QueryPlan => "query_plan",
            Self::Execute => "execute",
            Self::Batch => "batch",
            Self::Patch => "patch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

fn rid_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9+/=\-]+$").ok())
        .as_ref()
}

/// Decode a resource id; `-` stands in for `/` in rids.
pub fn decode_rid(rid: &str) -> Option<Vec<u8>> {
    if !rid_pattern().map_or(false, |p| p.is_match(rid)) {
        return None;
    }
    STANDARD.decode(rid.replace('-', "/")).ok()
}

/// A database rid decodes to exactly 4 bytes.
pub fn is_database_rid(segment: &str) -> bool {
    decode_rid(segment).map_or(false, |b| b.len() == 4)
}

/// A container rid decodes to exactly 8 bytes (database + collection).
pub fn is_container_rid(segment: &str) -> bool {
    decode_rid(segment).map_or(false, |b| b.len() == 8)
}

/// Parsed request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    segments: Vec<String>,
}

impl ResourceAddress {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// Path with surrounding slashes trimmed
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Resource type addressed: a trailing type segment for feeds, else the
    /// type segment preceding the id.
    pub fn resource_type(&self) -> ResourceType {
        let n = self.segments.len();
        let segment = match n {
            0 => return ResourceType::DatabaseAccount,
            n if n % 2 == 1 => &self.segments[n - 1],
            n => &self.segments[n - 2],
        };
        ResourceType::from_path_segment(segment).unwrap_or(ResourceType::None)
    }

    /// Id (or rid) of the addressed resource, or of its parent for feeds.
    pub fn resource_id(&self) -> Option<&str> {
        let n = self.segments.len();
        if n == 0 {
            return None;
        }
        let idx = if n % 2 == 0 { n - 1 } else { n.checked_sub(2)? };
        self.segments.get(idx).map(String::as_str)
    }

    /// `dbs/{db}/colls/{coll}` prefix, when the path reaches a container.
    pub fn container_link(&self) -> Option<String> {
        if self.segments.len() < 4 {
            return None;
        }
        Some(self.segments[..4].join("/"))
    }

    /// Collection segment of a rid-based path that reaches a container.
    pub fn container_rid(&self) -> Option<&str> {
        if self.is_name_based() {
            return None;
        }
        match self.segments.as_slice() {
            [_, _, colls, rid, ..] if colls.eq_ignore_ascii_case("colls") && is_container_rid(rid) => {
                Some(rid.as_str())
            }
            _ => None,
        }
    }

    /// Name-based unless the database segment is a rid.
    pub fn is_name_based(&self) -> bool {
        match self.segments.as_slice() {
            [first, db, ..] if first.eq_ignore_ascii_case("dbs") => !is_database_rid(db),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_path() {
        let addr = ResourceAddress::parse("/dbs/db1/colls/c1/docs/item1/");
        assert_eq!(addr.resource_type(), ResourceType::Item);
        assert_eq!(addr.resource_id(), Some("item1"));
        assert_eq!(addr.container_link().as_deref(), Some("dbs/db1/colls/c1"));
        assert!(addr.is_name_based());
    }

    #[test]
    fn test_parse_feed_path() {
        let addr = ResourceAddress::parse("dbs/db1/colls/c1/docs");
        assert_eq!(addr.resource_type(), ResourceType::Item);
        assert_eq!(addr.resource_id(), Some("c1"));
    }

    #[test]
    fn test_database_level_path() {
        let addr = ResourceAddress::parse("dbs/db1");
        assert_eq!(addr.resource_type(), ResourceType::Database);
        assert_eq!(addr.container_link(), None);
    }

    #[test]
    fn test_rid_based_path() {
        // "AAAAAA==" decodes to 4 bytes
        let addr = ResourceAddress::parse("dbs/AAAAAA==/colls/AAAAAAAAAAA=/docs");
        assert!(!addr.is_name_based());
        assert_eq!(addr.container_rid(), Some("AAAAAAAAAAA="));
        assert_eq!(ResourceAddress::parse("dbs/db1/colls/c1/docs").container_rid(), None);
        assert!(is_container_rid("AAAAAAAAAAA="));
    }

    #[test]
    fn test_rid_dash_replacement() {
        // '-' decodes as '/'
        assert!(is_database_rid("AA-AAA=="));
        assert!(!is_database_rid("not a rid!"));
    }

    #[test]
    fn test_read_only_operations() {
        assert!(OperationType::Read.is_read_only());
        assert!(OperationType::QueryPlan.is_read_only());
        assert!(!OperationType::Create.is_read_only());
        assert_eq!(OperationType::Read.http_method(), HttpMethod::Get);
    }
}
