//! Observable events emitted by the engine
//!
//! Every log line carries an `event` field taken from this enum so that
//! logs can be filtered by what happened rather than by message text.

use std::fmt;

/// Observable engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Query lifecycle
    /// Query iterator started or was reset
    QueryStart,
    /// Service asked for a query plan
    QueryPlanRequired,
    /// Query plan received
    QueryPlanFetched,
    /// Cross-partition pipeline assembled
    PipelineBuilt,
    /// A producer fetched one page
    ProducerFetch,
    /// Query drained
    QueryComplete,

    // Topology
    /// A producer's range reported split/merge
    PartitionSplitDetected,
    /// Split replaced by fresh producers
    SplitRepaired,
    /// Partition catalog (re)built
    CatalogRefreshed,
    /// Catalog failed validation (FATAL)
    CatalogRejected,

    // Regions
    /// Account topology read
    EndpointRefresh,
    /// Endpoint marked unavailable
    EndpointUnavailable,

    // Retries
    /// A policy scheduled another attempt
    RetryScheduled,
    /// Retries exhausted or no policy matched
    RetryExhausted,
    /// Per-attempt timeout fired
    AttemptTimeout,

    // Session
    /// Session token merged from a response
    SessionTokenCaptured,
    /// Session tokens dropped for a container
    SessionTokenCleared,

    // Budget
    /// Request-unit cap reached
    BudgetExceeded,

    // Bulk
    /// Bulk operations grouped into batches
    BulkBatched,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryStart => "QUERY_START",
            Event::QueryPlanRequired => "QUERY_PLAN_REQUIRED",
            Event::QueryPlanFetched => "QUERY_PLAN_FETCHED",
            Event::PipelineBuilt => "PIPELINE_BUILT",
            Event::ProducerFetch => "PRODUCER_FETCH",
            Event::QueryComplete => "QUERY_COMPLETE",
            Event::PartitionSplitDetected => "PARTITION_SPLIT_DETECTED",
            Event::SplitRepaired => "SPLIT_REPAIRED",
            Event::CatalogRefreshed => "CATALOG_REFRESHED",
            Event::CatalogRejected => "CATALOG_REJECTED",
            Event::EndpointRefresh => "ENDPOINT_REFRESH",
            Event::EndpointUnavailable => "ENDPOINT_UNAVAILABLE",
            Event::RetryScheduled => "RETRY_SCHEDULED",
            Event::RetryExhausted => "RETRY_EXHAUSTED",
            Event::AttemptTimeout => "ATTEMPT_TIMEOUT",
            Event::SessionTokenCaptured => "SESSION_TOKEN_CAPTURED",
            Event::SessionTokenCleared => "SESSION_TOKEN_CLEARED",
            Event::BudgetExceeded => "BUDGET_EXCEEDED",
            Event::BulkBatched => "BULK_BATCHED",
        }
    }

    /// Returns true if this event indicates client/service disagreement
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::CatalogRejected)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
