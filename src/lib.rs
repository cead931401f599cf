//! AeroLink - client-side routing and query engine
//!
//! Turns one logical query or write against a partitioned, multi-region
//! document container into the right set of network calls:
//!
//! - `routing` and `hashing` map logical partition keys to physical ranges
//! - `endpoint`, `retry` and `session` pick regions, retry failures and keep
//!   read-your-writes guarantees
//! - `query` fans a query out to per-range producers and recombines results
//! - `bulk` shapes batched writes per owning range
//!
//! The wire transport and the server-side query planner are collaborators
//! supplied by the caller (see [`transport::Transport`] and
//! [`query::QueryClient`]).

pub mod bulk;
pub mod cli;
pub mod client;
pub mod core;
pub mod endpoint;
pub mod hashing;
pub mod observability;
pub mod query;
pub mod retry;
pub mod routing;
pub mod session;
pub mod transport;

pub use crate::core::{ClientConfig, ClientError, ClientResult, ErrorCategory, ErrorKind};
