//! Transport seam
//!
//! The engine never opens sockets. It needs one primitive: send one request
//! to one endpoint and get back either a response with headers or a typed
//! fault. Implementations map DNS/connect failures to
//! [`ErrorKind::EndpointUnreachable`](crate::core::ErrorKind) and socket
//! resets to `ConnectionReset`; non-success statuses may be returned either
//! as a `Response` or as a service fault.

mod request;
mod response;

pub use request::Request;
pub use response::Response;

use async_trait::async_trait;

use crate::core::ClientResult;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` to `endpoint` once.
    async fn send(&self, endpoint: &str, request: &Request) -> ClientResult<Response>;
}
