//! Client Error Types
//!
//! Every fault raised by the engine is a [`ClientError`]. Faults that came
//! from the wire keep their status/substatus and headers; all faults carry
//! the diagnostics accumulated up to the point of failure.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::constants::{status, substatus};
use super::headers::Headers;
use crate::observability::Diagnostics;

/// Engine result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Surfaced to the caller, state remains usable
    Error,
    /// Client and service disagree; not recoverable client-side
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// How a fault is handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Throttling, connection reset, timeout, service unavailable
    RetryableTransient,
    /// Partition gone, session not available, write forbidden
    RetryableTopology,
    /// Request-unit cap hit mid-stream
    BudgetExceeded,
    /// Raised synchronously for bad caller input, never retried
    CallerInput,
    /// Catalog or comparator disagreement
    Fatal,
    /// Any other service error, surfaced as-is
    Terminal,
}

/// Error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-success response from the service
    Service,
    /// DNS or connect failure before the request reached the service
    EndpointUnreachable,
    /// Connection reset, broken pipe or interrupted call
    ConnectionReset,
    /// Per-attempt client timeout
    Timeout,
    /// External cancellation fired
    Cancelled,
    /// Request-unit budget exhausted
    BudgetExceeded,
    /// Invalid argument supplied by the caller
    InvalidInput,
    /// Partition catalog incomplete, overlapping or missing a covering range
    CorruptCatalog,
    /// Ordering comparison between incompatible values
    IncomparableValues,
    /// Invariant violated inside the engine
    Internal,
}

impl ErrorKind {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Service => "AERO_SERVICE_ERROR",
            Self::EndpointUnreachable => "AERO_ENDPOINT_UNREACHABLE",
            Self::ConnectionReset => "AERO_CONNECTION_RESET",
            Self::Timeout => "AERO_REQUEST_TIMEOUT",
            Self::Cancelled => "AERO_CANCELLED",
            Self::BudgetExceeded => "AERO_BUDGET_EXCEEDED",
            Self::InvalidInput => "AERO_INVALID_INPUT",
            Self::CorruptCatalog => "AERO_CORRUPT_CATALOG",
            Self::IncomparableValues => "AERO_INCOMPARABLE_VALUES",
            Self::Internal => "AERO_INTERNAL",
        }
    }

    /// Get the severity of this kind
    pub fn severity(&self) -> Severity {
        match self {
            Self::CorruptCatalog | Self::IncomparableValues | Self::Internal => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// Engine error
#[derive(Debug, Clone, Error)]
#[error("[{}] {}: {}", .kind.severity(), .kind.code(), .message)]
pub struct ClientError {
    /// Error kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// HTTP status, when the fault came from the service
    pub status: Option<u16>,
    /// Service substatus
    pub substatus: Option<u32>,
    /// Server-suggested or policy-chosen delay before retrying
    pub retry_after: Option<Duration>,
    /// Response headers observed with the fault
    pub headers: Headers,
    /// Parsed error body, if any
    pub body: Option<Value>,
    /// Attempt history up to this fault
    pub diagnostics: Diagnostics,
    /// Results fetched before a budget fault
    pub fetched_results: Vec<Value>,
}

impl ClientError {
    /// Create a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            substatus: None,
            retry_after: None,
            headers: Headers::new(),
            body: None,
            diagnostics: Diagnostics::default(),
            fetched_results: Vec::new(),
        }
    }

    /// Service error from a status code and response headers.
    ///
    /// Substatus and retry-after are read from the headers when present.
    pub fn service(status: u16, headers: Headers, message: impl Into<String>) -> Self {
        let substatus = headers.substatus();
        let retry_after = headers.retry_after();
        Self {
            status: Some(status),
            substatus,
            retry_after,
            headers,
            ..Self::new(ErrorKind::Service, message)
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EndpointUnreachable, message)
    }

    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionReset, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: Some(status::REQUEST_TIMEOUT),
            ..Self::new(ErrorKind::Timeout, message)
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Operation was cancelled")
    }

    /// Budget fault carrying the partial results fetched so far.
    pub fn budget_exceeded(consumed: f64, cap: f64, fetched_results: Vec<Value>) -> Self {
        Self {
            fetched_results,
            ..Self::new(
                ErrorKind::BudgetExceeded,
                format!(
                    "Request unit budget exceeded: consumed {:.2} of {:.2}",
                    consumed, cap
                ),
            )
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: Some(status::BAD_REQUEST),
            ..Self::new(ErrorKind::InvalidInput, message)
        }
    }

    pub fn corrupt_catalog(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptCatalog, message)
    }

    pub fn incomparable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncomparableValues, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach a parsed error body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach diagnostics, replacing any already present.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Check if this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.kind.severity() == Severity::Fatal
    }

    fn is_status(&self, code: u16, sub: Option<u32>) -> bool {
        self.status == Some(code) && (sub.is_none() || self.substatus == sub)
    }

    /// 410 with a substatus that signals the range is gone or changing shape.
    pub fn is_partition_split(&self) -> bool {
        self.status == Some(status::GONE)
            && matches!(
                self.substatus,
                Some(substatus::PARTITION_KEY_RANGE_GONE)
                    | Some(substatus::COMPLETING_SPLIT)
                    | Some(substatus::COMPLETING_PARTITION_MIGRATION)
            )
    }

    pub fn is_throttle(&self) -> bool {
        self.is_status(status::TOO_MANY_REQUESTS, None)
    }

    pub fn is_read_session_unavailable(&self) -> bool {
        self.is_status(status::NOT_FOUND, Some(substatus::READ_SESSION_NOT_AVAILABLE))
    }

    pub fn is_write_forbidden(&self) -> bool {
        self.is_status(status::FORBIDDEN, Some(substatus::WRITE_FORBIDDEN))
    }

    pub fn is_account_not_found(&self) -> bool {
        self.is_status(status::FORBIDDEN, Some(substatus::DATABASE_ACCOUNT_NOT_FOUND))
    }

    pub fn is_service_unavailable(&self) -> bool {
        self.is_status(status::SERVICE_UNAVAILABLE, None)
    }

    /// 400 response telling the client it must fetch a query plan first.
    pub fn needs_query_plan(&self) -> bool {
        if !self.is_status(status::BAD_REQUEST, None) || self.kind != ErrorKind::Service {
            return false;
        }
        let has_info = self
            .body
            .as_ref()
            .and_then(|b| b.get("additionalErrorInfo"))
            .is_some();
        has_info || self.message.contains("Cross partition query only supports")
    }

    /// Classify this fault.
    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ErrorKind::ConnectionReset | ErrorKind::Timeout => ErrorCategory::RetryableTransient,
            ErrorKind::EndpointUnreachable => ErrorCategory::RetryableTopology,
            ErrorKind::BudgetExceeded => ErrorCategory::BudgetExceeded,
            ErrorKind::InvalidInput | ErrorKind::Cancelled => ErrorCategory::CallerInput,
            ErrorKind::CorruptCatalog | ErrorKind::IncomparableValues | ErrorKind::Internal => {
                ErrorCategory::Fatal
            }
            ErrorKind::Service => {
                if self.is_throttle() || self.is_service_unavailable() {
                    ErrorCategory::RetryableTransient
                } else if self.is_partition_split()
                    || self.is_read_session_unavailable()
                    || self.is_write_forbidden()
                    || self.is_account_not_found()
                {
                    ErrorCategory::RetryableTopology
                } else {
                    ErrorCategory::Terminal
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::headers as names;

    fn service_error(code: u16, sub: Option<u32>) -> ClientError {
        let mut headers = Headers::new();
        if let Some(sub) = sub {
            headers.insert(names::SUB_STATUS, sub.to_string());
        }
        ClientError::service(code, headers, "test")
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorKind::BudgetExceeded.code(), "AERO_BUDGET_EXCEEDED");
        assert_eq!(ErrorKind::CorruptCatalog.code(), "AERO_CORRUPT_CATALOG");
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ClientError::corrupt_catalog("gap").is_fatal());
        assert!(ClientError::incomparable("object").is_fatal());
        assert!(!ClientError::invalid_input("bad id").is_fatal());
    }

    #[test]
    fn test_display_format() {
        let err = ClientError::corrupt_catalog("gap at 80");
        assert_eq!(err.to_string(), "[FATAL] AERO_CORRUPT_CATALOG: gap at 80");
    }

    #[test]
    fn test_substatus_parsed_from_headers() {
        let err = service_error(410, Some(1002));
        assert_eq!(err.substatus, Some(1002));
        assert!(err.is_partition_split());
        assert_eq!(err.category(), ErrorCategory::RetryableTopology);
    }

    #[test]
    fn test_split_requires_substatus() {
        assert!(!service_error(410, None).is_partition_split());
        assert!(service_error(410, Some(1007)).is_partition_split());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            service_error(429, None).category(),
            ErrorCategory::RetryableTransient
        );
        assert_eq!(
            service_error(404, Some(1002)).category(),
            ErrorCategory::RetryableTopology
        );
        assert_eq!(service_error(409, None).category(), ErrorCategory::Terminal);
        assert_eq!(
            ClientError::budget_exceeded(10.0, 5.0, vec![]).category(),
            ErrorCategory::BudgetExceeded
        );
    }

    #[test]
    fn test_needs_query_plan() {
        let err = service_error(400, None).with_body(serde_json::json!({
            "code": "BadRequest",
            "additionalErrorInfo": "{}"
        }));
        assert!(err.needs_query_plan());

        let err = ClientError::service(
            400,
            Headers::new(),
            "Cross partition query only supports 'VALUE <AggreateFunc>'",
        );
        assert!(err.needs_query_plan());

        assert!(!ClientError::invalid_input("Cross partition query only supports").needs_query_plan());
    }

    #[test]
    fn test_budget_error_carries_results() {
        let err = ClientError::budget_exceeded(12.0, 10.0, vec![serde_json::json!(1)]);
        assert_eq!(err.fetched_results.len(), 1);
        assert!(err.message.contains("12.00"));
    }
}
