//! Retry and failover
//!
//! Every request goes through [`ExecutionOrchestrator::execute`]. A fault is
//! matched to one policy by precedence:
//!
//! 1. endpoint discovery: unreachable endpoint, 403/1008, 403/3
//! 2. resource throttle: 429
//! 3. session read: 404/1002
//! 4. timeout failover: 503 and client timeouts
//! 5. connection reset: everything else (acts only on resets of reads)
//!
//! Partition splits (410) are not retried here; the query layer repairs
//! them against the partition catalog.

mod connection_reset;
mod endpoint_discovery;
mod failover;
mod orchestrator;
mod policy;
mod session_read;
mod throttle;

pub use connection_reset::ConnectionResetRetryPolicy;
pub use endpoint_discovery::EndpointDiscoveryRetryPolicy;
pub use failover::TimeoutFailoverRetryPolicy;
pub use orchestrator::ExecutionOrchestrator;
pub use policy::{RequestInfo, RetryContext, RetryPolicy};
pub use session_read::SessionReadRetryPolicy;
pub use throttle::ResourceThrottleRetryPolicy;
