//! Outbound request shaping

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::core::constants::{headers as names, QUERY_CONTENT_TYPE, QUERY_VERSION, SUPPORTED_QUERY_FEATURES};
use crate::core::{ConsistencyLevel, Headers, HttpMethod, OperationType, ResourceType};
use crate::hashing::PartitionKey;

/// One logical request; re-sent unchanged (modulo session token) on retry.
#[derive(Debug, Clone)]
pub struct Request {
    pub resource_type: ResourceType,
    pub operation_type: OperationType,
    /// Resource link, e.g. `dbs/db/colls/c/docs`
    pub path: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(resource_type: ResourceType, operation_type: OperationType, path: impl Into<String>) -> Self {
        Self {
            resource_type,
            operation_type,
            path: path.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.operation_type.http_method()
    }

    /// Absolute URL on `endpoint`.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", endpoint.trim_end_matches('/'), self.path.trim_start_matches('/'))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn set_continuation(&mut self, continuation: Option<&str>) {
        match continuation {
            Some(c) if !c.is_empty() => self.headers.insert(names::CONTINUATION, c),
            _ => {
                self.headers.remove(names::CONTINUATION);
            }
        }
    }

    pub fn set_page_size(&mut self, max_item_count: u32) {
        self.headers.insert(names::PAGE_SIZE, max_item_count.to_string());
    }

    pub fn set_consistency_level(&mut self, level: ConsistencyLevel) {
        self.headers.insert(names::CONSISTENCY_LEVEL, level.as_str());
    }

    /// Explicit per-request consistency, if any.
    pub fn consistency_level(&self) -> Option<&str> {
        self.headers.get(names::CONSISTENCY_LEVEL)
    }

    pub fn set_session_token(&mut self, token: impl Into<String>) {
        self.headers.insert(names::SESSION_TOKEN, token);
    }

    pub fn clear_session_token(&mut self) {
        self.headers.remove(names::SESSION_TOKEN);
    }

    pub fn session_token(&self) -> Option<&str> {
        self.headers.session_token()
    }

    pub fn set_partition_key(&mut self, key: &PartitionKey) {
        self.headers.insert(names::PARTITION_KEY, key.to_header_value());
    }

    pub fn set_partition_key_range_id(&mut self, range_id: &str) {
        self.headers.insert(names::PARTITION_KEY_RANGE_ID, range_id);
    }

    /// Restrict a range-scoped request to a sub-range of effective keys.
    pub fn set_epk_bounds(&mut self, min: &str, max: &str) {
        self.headers.insert(names::START_EPK, min);
        self.headers.insert(names::END_EPK, max);
    }

    pub fn set_if_match(&mut self, etag: &str) {
        self.headers.insert(names::IF_MATCH, etag);
    }

    pub fn set_if_none_match(&mut self, etag: &str) {
        self.headers.insert(names::IF_NONE_MATCH, etag);
    }

    /// Headers for a query page request.
    pub fn mark_query(&mut self) {
        self.headers.insert(names::IS_QUERY, "true");
        self.headers.insert(names::CONTENT_TYPE, QUERY_CONTENT_TYPE);
        self.headers.insert(names::ENABLE_CROSS_PARTITION, "true");
        self.headers.insert(names::QUERY_VERSION, QUERY_VERSION);
    }

    /// Headers for a query plan request.
    pub fn mark_query_plan(&mut self) {
        self.headers.insert(names::IS_QUERY_PLAN_REQUEST, "True");
        self.headers.insert(names::SUPPORTED_QUERY_FEATURES, SUPPORTED_QUERY_FEATURES);
        self.headers.insert(names::QUERY_VERSION, QUERY_VERSION);
        self.headers.insert(names::CONTENT_TYPE, QUERY_CONTENT_TYPE);
    }

    pub fn mark_batch(&mut self) {
        self.headers.insert(names::IS_BATCH_REQUEST, "True");
    }

    /// Fresh activity id and date for one attempt.
    pub fn stamp(&mut self) {
        self.headers.insert(names::ACTIVITY_ID, Uuid::new_v4().to_string());
        self.headers
            .insert(names::DATE, Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());
    }

    /// Allow writes to a non-primary region.
    pub fn allow_tentative_writes(&mut self) {
        self.headers.insert(names::ALLOW_TENTATIVE_WRITES, "true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_cleanly() {
        let req = Request::new(ResourceType::Item, OperationType::Read, "/dbs/d/colls/c/docs/1");
        assert_eq!(req.url("https://acct.example.com/"), "https://acct.example.com/dbs/d/colls/c/docs/1");
        assert_eq!(req.method(), HttpMethod::Get);
    }

    #[test]
    fn test_empty_continuation_removed() {
        let mut req = Request::new(ResourceType::Item, OperationType::Query, "dbs/d/colls/c/docs");
        req.set_continuation(Some("abc"));
        assert_eq!(req.headers.continuation(), Some("abc"));
        req.set_continuation(Some(""));
        assert!(!req.headers.contains(names::CONTINUATION));
    }

    #[test]
    fn test_query_plan_headers() {
        let mut req = Request::new(ResourceType::Item, OperationType::QueryPlan, "dbs/d/colls/c/docs");
        req.mark_query_plan();
        assert_eq!(req.headers.get(names::QUERY_VERSION), Some("1.4"));
        assert!(req.headers.get(names::SUPPORTED_QUERY_FEATURES).unwrap().contains("NonStreamingOrderBy"));
    }

    #[test]
    fn test_partition_key_header() {
        let mut req = Request::new(ResourceType::Item, OperationType::Read, "dbs/d/colls/c/docs/1");
        req.set_partition_key(&PartitionKey::single("ü"));
        assert_eq!(req.headers.get(names::PARTITION_KEY), Some("[\"\\u00fc\"]"));
    }

    #[test]
    fn test_stamp_sets_activity_id() {
        let mut req = Request::new(ResourceType::Item, OperationType::Read, "dbs/d/colls/c/docs/1");
        req.stamp();
        let id = req.headers.get(names::ACTIVITY_ID).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(req.headers.get(names::DATE).unwrap().ends_with("GMT"));
    }
}
