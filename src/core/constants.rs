//! Wire constants: status codes, substatus codes and header names

/// HTTP status codes the engine reacts to
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const NOT_MODIFIED: u16 = 304;
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const CONFLICT: u16 = 409;
    pub const GONE: u16 = 410;
    pub const PRECONDITION_FAILED: u16 = 412;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// Service substatus codes
pub mod substatus {
    /// 403: region does not accept writes
    pub const WRITE_FORBIDDEN: u32 = 3;
    /// 403: account unknown to the regional endpoint
    pub const DATABASE_ACCOUNT_NOT_FOUND: u32 = 1008;
    /// 404: replica has not caught up to the session token
    pub const READ_SESSION_NOT_AVAILABLE: u32 = 1002;
    /// 410: range was split or merged away
    pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
    /// 410: split in progress
    pub const COMPLETING_SPLIT: u32 = 1007;
    /// 410: migration in progress
    pub const COMPLETING_PARTITION_MIGRATION: u32 = 1008;
}

/// Header names (lowercase; lookups are case-insensitive)
pub mod headers {
    pub const REQUEST_CHARGE: &str = "x-ms-request-charge";
    pub const CONTINUATION: &str = "x-ms-continuation";
    pub const SESSION_TOKEN: &str = "x-ms-session-token";
    pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
    pub const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
    pub const CONSISTENCY_LEVEL: &str = "x-ms-consistency-level";
    pub const IF_MATCH: &str = "if-match";
    pub const IF_NONE_MATCH: &str = "if-none-match";
    pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
    pub const IS_QUERY_PLAN_REQUEST: &str = "x-ms-cosmos-is-query-plan-request";
    pub const SUPPORTED_QUERY_FEATURES: &str = "x-ms-cosmos-supported-query-features";
    pub const QUERY_VERSION: &str = "x-ms-cosmos-query-version";
    pub const ENABLE_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const PAGE_SIZE: &str = "x-ms-max-item-count";
    pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
    pub const SUB_STATUS: &str = "x-ms-substatus";
    pub const ACTIVITY_ID: &str = "x-ms-activity-id";
    pub const DATE: &str = "x-ms-date";
    pub const OWNER_ID: &str = "x-ms-content-path";
    pub const OWNER_FULL_NAME: &str = "x-ms-alt-content-path";
    pub const ALLOW_TENTATIVE_WRITES: &str = "x-ms-cosmos-allow-tentative-writes";
    pub const THROTTLE_RETRY_COUNT: &str = "x-ms-throttle-retry-count";
    pub const THROTTLE_RETRY_WAIT_MS: &str = "x-ms-throttle-retry-wait-time-ms";
    pub const INDEX_UTILIZATION: &str = "x-ms-cosmos-index-utilization";
    pub const START_EPK: &str = "x-ms-start-epk";
    pub const END_EPK: &str = "x-ms-end-epk";
    pub const IS_BATCH_REQUEST: &str = "x-ms-cosmos-is-batch-request";
}

/// Query content type
pub const QUERY_CONTENT_TYPE: &str = "application/query+json";

/// Query protocol version sent with plan and page requests
pub const QUERY_VERSION: &str = "1.4";

/// Features this engine can execute client-side
pub const SUPPORTED_QUERY_FEATURES: &str =
    "Aggregate, Distinct, MultipleOrderBy, OffsetAndLimit, OrderBy, Top, CompositeAggregate, GroupBy, MultipleAggregates, NonStreamingOrderBy";

/// Lower bound of the effective partition key space
pub const MIN_EPK: &str = "";

/// Upper bound (exclusive) of the effective partition key space
pub const MAX_EPK: &str = "FF";

/// Placeholder the service leaves in rewritten order-by queries
pub const ORDER_BY_FILTER_PLACEHOLDER: &str = "{documentdb-formattableorderbyquery-filter}";
