//! Inbound responses

use serde_json::Value;

use crate::core::{ClientError, Headers};
use crate::observability::Diagnostics;

/// Successful response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Value,
    pub diagnostics: Diagnostics,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 304
    }

    /// Turn a non-success response into a service fault.
    pub fn into_result(self) -> Result<Response, ClientError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self
            .body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", self.status));
        Err(ClientError::service(self.status, self.headers, message).with_body(self.body))
    }

    /// Documents of a feed/query page: `{"Documents": [...]}` or a bare array.
    pub fn documents(&self) -> Vec<Value> {
        match &self.body {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map
                .get("Documents")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
