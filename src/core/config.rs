//! Client Configuration
//!
//! One explicit configuration value is threaded through construction of
//! every component. Nothing is read from the environment by the library.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{ClientError, ClientResult};

/// Account consistency levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    Eventual,
    ConsistentPrefix,
}

impl ConsistencyLevel {
    /// Header value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::BoundedStaleness => "BoundedStaleness",
            Self::Session => "Session",
            Self::Eventual => "Eventual",
            Self::ConsistentPrefix => "ConsistentPrefix",
        }
    }
}

/// How much detail attempt records retain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Status, endpoint and latency per attempt
    #[default]
    Info,
    /// Also keeps the response headers of failed attempts
    Debug,
}

/// Throttle retry options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Maximum retries on 429 (default: 9)
    #[serde(default = "default_max_retry_attempt_count")]
    pub max_retry_attempt_count: u32,

    /// Fixed wait between throttle retries; 0 honors the server's retry-after
    #[serde(default)]
    pub fixed_retry_interval_ms: u64,

    /// Cap on cumulative throttle wait (default: 30s)
    #[serde(default = "default_max_wait_time_secs")]
    pub max_wait_time_secs: u64,
}

fn default_max_retry_attempt_count() -> u32 {
    9
}

fn default_max_wait_time_secs() -> u64 {
    30
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempt_count: default_max_retry_attempt_count(),
            fixed_retry_interval_ms: 0,
            max_wait_time_secs: default_max_wait_time_secs(),
        }
    }
}

/// Attempt caps for the failover-style policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverOptions {
    #[serde(default = "default_max_service_unavailable_retries")]
    pub max_service_unavailable_retries: u32,
    #[serde(default = "default_max_timeout_retries")]
    pub max_timeout_retries: u32,
    #[serde(default = "default_endpoint_discovery_max_retries")]
    pub endpoint_discovery_max_retries: u32,
    #[serde(default = "default_retry_after_ms")]
    pub endpoint_discovery_retry_after_ms: u64,
    #[serde(default = "default_connection_reset_max_retries")]
    pub connection_reset_max_retries: u32,
    #[serde(default = "default_retry_after_ms")]
    pub connection_reset_retry_after_ms: u64,
}

fn default_max_service_unavailable_retries() -> u32 {
    1
}

fn default_max_timeout_retries() -> u32 {
    120
}

fn default_endpoint_discovery_max_retries() -> u32 {
    120
}

fn default_connection_reset_max_retries() -> u32 {
    10
}

fn default_retry_after_ms() -> u64 {
    1000
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            max_service_unavailable_retries: default_max_service_unavailable_retries(),
            max_timeout_retries: default_max_timeout_retries(),
            endpoint_discovery_max_retries: default_endpoint_discovery_max_retries(),
            endpoint_discovery_retry_after_ms: default_retry_after_ms(),
            connection_reset_max_retries: default_connection_reset_max_retries(),
            connection_reset_retry_after_ms: default_retry_after_ms(),
        }
    }
}

/// Region selection and per-attempt behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    /// Discover regional endpoints from the account (default: true)
    #[serde(default = "default_true")]
    pub enable_endpoint_discovery: bool,

    /// Region names in preference order
    #[serde(default)]
    pub preferred_locations: Vec<String>,

    /// Allow writes to any writable region (default: false)
    #[serde(default)]
    pub use_multiple_write_locations: bool,

    /// Per-attempt timeout (default: 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry_options: RetryOptions,

    #[serde(default)]
    pub failover: FailoverOptions,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            enable_endpoint_discovery: true,
            preferred_locations: Vec::new(),
            use_multiple_write_locations: false,
            request_timeout_ms: default_request_timeout_ms(),
            retry_options: RetryOptions::default(),
            failover: FailoverOptions::default(),
        }
    }
}

impl ConnectionPolicy {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Query execution tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Page size hint sent per range (default: 100)
    #[serde(default = "default_max_item_count")]
    pub max_item_count: u32,

    /// Concurrent producer warm-ups; 0 means one per target range
    #[serde(default)]
    pub max_degree_of_parallelism: usize,

    /// Heap size for non-streaming order-by without TOP/LIMIT (default: 50000)
    #[serde(default = "default_non_streaming_buffer_size")]
    pub non_streaming_buffer_size: usize,

    /// Keep streaming a full top-K heap only while more than this fraction of
    /// the request-unit cap remains (default: 0.5)
    #[serde(default = "default_budget_min_remaining_fraction")]
    pub budget_min_remaining_fraction: f64,

    /// Always fetch a query plan before the first page
    #[serde(default)]
    pub force_query_plan: bool,
}

fn default_max_item_count() -> u32 {
    100
}

fn default_non_streaming_buffer_size() -> usize {
    50_000
}

fn default_budget_min_remaining_fraction() -> f64 {
    0.5
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_item_count: default_max_item_count(),
            max_degree_of_parallelism: 0,
            non_streaming_buffer_size: default_non_streaming_buffer_size(),
            budget_min_remaining_fraction: default_budget_min_remaining_fraction(),
            force_query_plan: false,
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Default account endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Account consistency level (default: Session)
    #[serde(default = "default_consistency_level")]
    pub consistency_level: ConsistencyLevel,

    #[serde(default)]
    pub diagnostic_level: DiagnosticLevel,

    #[serde(default)]
    pub connection_policy: ConnectionPolicy,

    #[serde(default)]
    pub query: QueryOptions,
}

fn default_endpoint() -> String {
    "https://localhost:8081/".to_string()
}

fn default_consistency_level() -> ConsistencyLevel {
    ConsistencyLevel::Session
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            consistency_level: default_consistency_level(),
            diagnostic_level: DiagnosticLevel::default(),
            connection_policy: ConnectionPolicy::default(),
            query: QueryOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config for the given endpoint with defaults elsewhere
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::invalid_input(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ClientError::invalid_input(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can honor.
    pub fn validate(&self) -> ClientResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::invalid_input("endpoint must not be empty"));
        }
        if self.connection_policy.request_timeout_ms == 0 {
            return Err(ClientError::invalid_input("request_timeout_ms must be positive"));
        }
        let fraction = self.query.budget_min_remaining_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ClientError::invalid_input(
                "budget_min_remaining_fraction must be within [0, 1]",
            ));
        }
        if self.query.non_streaming_buffer_size == 0 {
            return Err(ClientError::invalid_input(
                "non_streaming_buffer_size must be positive",
            ));
        }
        Ok(())
    }
}
