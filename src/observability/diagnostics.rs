//! Per-operation diagnostics
//!
//! Diagnostics only ever accumulate. Nothing in the engine branches on them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::Headers;

/// One network attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number within the logical request
    pub attempt: u32,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub latency: Duration,
    /// None when the request never reached the service
    pub status: Option<u16>,
    pub substatus: Option<u32>,
    /// Retry policy that scheduled the next attempt, if any
    pub retry_policy: Option<&'static str>,
    /// Failed-attempt headers, kept at debug level only
    pub headers: Option<Headers>,
}

/// Metadata lookups performed on behalf of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataKind {
    QueryPlan,
    PartitionKeyRanges,
    DatabaseAccount,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataLookup {
    pub kind: MetadataKind,
    pub duration: Duration,
}

/// Accumulated diagnostics for one logical operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub attempts: Vec<AttemptRecord>,
    pub metadata_lookups: Vec<MetadataLookup>,
    pub throttle_retry_count: u32,
    pub throttle_wait: Duration,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    pub fn record_metadata(&mut self, kind: MetadataKind, duration: Duration) {
        self.metadata_lookups.push(MetadataLookup { kind, duration });
    }

    pub fn record_throttle(&mut self, wait: Duration) {
        self.throttle_retry_count += 1;
        self.throttle_wait += wait;
    }

    /// Mark the most recent attempt as retried by `policy`.
    pub fn mark_last_retried(&mut self, policy: &'static str) {
        if let Some(last) = self.attempts.last_mut() {
            last.retry_policy = Some(policy);
        }
    }

    /// Append another operation's records (e.g. a sub-request's).
    pub fn absorb(&mut self, other: &Diagnostics) {
        self.attempts.extend(other.attempts.iter().cloned());
        self.metadata_lookups
            .extend(other.metadata_lookups.iter().cloned());
        self.throttle_retry_count += other.throttle_retry_count;
        self.throttle_wait += other.throttle_wait;
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Distinct endpoints in attempt order
    pub fn endpoints_contacted(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for a in &self.attempts {
            if !seen.contains(&a.endpoint.as_str()) {
                seen.push(&a.endpoint);
            }
        }
        seen
    }

    pub fn total_latency(&self) -> Duration {
        self.attempts.iter().map(|a| a.latency).sum()
    }
}
