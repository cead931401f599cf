//! Session tracker: per-container, per-range session tokens

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::token::{parse_partitioned, VectorSessionToken};
use crate::core::constants::{headers as names, status, substatus};
use crate::core::{
    is_container_rid, ConsistencyLevel, Headers, OperationType, ResourceAddress, ResourceType,
};
use crate::observability::Event;
use crate::transport::Request;

type RangeTokens = BTreeMap<String, VectorSessionToken>;

#[derive(Debug, Default)]
struct SessionState {
    /// Container rid -> range id -> merged token
    tokens_by_rid: HashMap<String, RangeTokens>,
    /// Container link -> container rid
    rid_by_name: HashMap<String, String>,
}

/// Tracks the highest session token seen per (container, range).
pub struct SessionTracker {
    default_consistency: ConsistencyLevel,
    state: RwLock<SessionState>,
}

/// Resources served by the master partition never carry session tokens.
pub fn is_master_resource(resource_type: ResourceType, operation_type: OperationType) -> bool {
    matches!(
        resource_type,
        ResourceType::Offer
            | ResourceType::Database
            | ResourceType::User
            | ResourceType::Permission
            | ResourceType::Topology
            | ResourceType::DatabaseAccount
            | ResourceType::PartitionKeyRange
    ) || (resource_type == ResourceType::Container && operation_type == OperationType::Query)
}

impl SessionTracker {
    pub fn new(default_consistency: ConsistencyLevel) -> Self {
        Self {
            default_consistency,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Combined `range:token,...` string for the container `path` lives in.
    ///
    /// Rid-based paths are looked up by their collection rid directly.
    pub fn get(&self, path: &str) -> Option<String> {
        let address = ResourceAddress::parse(path);
        let state = self.state.read().ok()?;
        let rid = match address.container_rid() {
            Some(rid) => rid.to_string(),
            None => state.rid_by_name.get(&address.container_link()?)?.clone(),
        };
        let tokens = state.tokens_by_rid.get(&rid)?;
        if tokens.is_empty() {
            return None;
        }
        Some(
            tokens
                .iter()
                .map(|(range, token)| format!("{}:{}", range, token))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Attach the tracked token to a session-consistent request that does
    /// not already carry one.
    pub fn apply_to_request(&self, request: &mut Request) {
        let session = match request.consistency_level() {
            Some(level) => level == ConsistencyLevel::Session.as_str(),
            None => self.default_consistency == ConsistencyLevel::Session,
        };
        if !session || request.session_token().is_some() {
            return;
        }
        if is_master_resource(request.resource_type, request.operation_type) {
            return;
        }
        if let Some(token) = self.get(&request.path) {
            request.set_session_token(token);
        }
    }

    /// Merge the session token of a response into tracked state.
    ///
    /// Successful responses always count. Failures count only for non-master
    /// resources and only for 412, 409 and 404 other than read-session
    /// unavailable.
    pub fn capture_from_response(
        &self,
        path: &str,
        operation_type: OperationType,
        status_code: u16,
        sub_status: Option<u32>,
        headers: &Headers,
    ) {
        let address = ResourceAddress::parse(path);
        let resource_type = address.resource_type();
        let success = status_code < 400;
        let expected_failure = !is_master_resource(resource_type, operation_type)
            && (status_code == status::PRECONDITION_FAILED
                || status_code == status::CONFLICT
                || (status_code == status::NOT_FOUND
                    && sub_status != Some(substatus::READ_SESSION_NOT_AVAILABLE)));
        if success || expected_failure {
            self.set(&address, resource_type, operation_type, headers);
        }
    }

    fn set(&self, address: &ResourceAddress, resource_type: ResourceType, operation_type: OperationType, headers: &Headers) {
        if is_master_resource(resource_type, operation_type) {
            return;
        }
        let Some(token_string) = headers.session_token() else {
            return;
        };

        let owner_id = if address.is_name_based() {
            headers.get(names::OWNER_ID).or_else(|| address.resource_id())
        } else {
            address.container_rid().or_else(|| headers.get(names::OWNER_ID))
        };
        let Some(owner_id) = owner_id.filter(|id| is_container_rid(id)) else {
            return;
        };
        // Rid-based requests only learn the container name from the full-name header.
        let name_source = match headers.get(names::OWNER_FULL_NAME) {
            Some(full) => Some(ResourceAddress::parse(full)),
            None if address.is_name_based() => Some(address.clone()),
            None => None,
        };
        let container_name = name_source.and_then(|a| a.container_link());
        if container_name.is_none() && address.is_name_based() {
            return;
        }

        let pairs = match parse_partitioned(token_string) {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed session token");
                return;
            }
        };

        if let Ok(mut state) = self.state.write() {
            if let Some(name) = container_name {
                state.rid_by_name.entry(name).or_insert_with(|| owner_id.to_string());
            }
            let tokens = state.tokens_by_rid.entry(owner_id.to_string()).or_default();
            for (range, incoming) in pairs {
                let merged = match tokens.get(&range) {
                    Some(existing) => match existing.merge(&incoming) {
                        Ok(merged) => merged,
                        Err(e) => {
                            tracing::warn!(range = %range, error = %e, "session token merge failed");
                            continue;
                        }
                    },
                    None => incoming,
                };
                tokens.insert(range, merged);
            }
        }
        tracing::trace!(event = %Event::SessionTokenCaptured, owner = owner_id, "session token merged");
    }

    /// Drop tracked tokens for the container `path` lives in.
    pub fn clear(&self, path: &str) {
        let address = ResourceAddress::parse(path);
        let Some(link) = address.container_link() else {
            return;
        };
        if let Ok(mut state) = self.state.write() {
            let rid = match address.container_rid() {
                Some(rid) => {
                    let rid = rid.to_string();
                    state.rid_by_name.retain(|_, r| *r != rid);
                    Some(rid)
                }
                None => state.rid_by_name.remove(&link),
            };
            if let Some(rid) = rid {
                state.tokens_by_rid.remove(&rid);
                tracing::debug!(event = %Event::SessionTokenCleared, container = %link, "session tokens cleared");
            }
        }
    }
}
