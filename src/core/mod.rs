//! Core types shared by every subsystem
//!
//! - `error`: the crate-wide fault type and its taxonomy
//! - `config`: explicit client configuration
//! - `headers` / `constants`: wire vocabulary
//! - `resource`: resource paths and operation types

mod config;
pub mod constants;
mod error;
mod headers;
mod resource;

pub use config::{
    ClientConfig, ConnectionPolicy, ConsistencyLevel, DiagnosticLevel, FailoverOptions,
    QueryOptions, RetryOptions,
};
pub use error::{ClientError, ClientResult, ErrorCategory, ErrorKind, Severity};
pub use headers::Headers;
pub use resource::{
    decode_rid, is_container_rid, is_database_rid, HttpMethod, OperationType, ResourceAddress,
    ResourceType,
};
