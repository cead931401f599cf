//! Execution orchestrator
//!
//! Runs one logical request as a sequence of attempts. Each attempt
//! re-resolves the endpoint, stamps the request, and races the transport
//! against the per-attempt timeout and the caller's cancellation token.
//! Faults are routed to exactly one retry policy; the first policy that
//! declines ends the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::connection_reset::ConnectionResetRetryPolicy;
use super::endpoint_discovery::EndpointDiscoveryRetryPolicy;
use super::failover::TimeoutFailoverRetryPolicy;
use super::policy::{RequestInfo, RetryContext, RetryPolicy};
use super::session_read::SessionReadRetryPolicy;
use super::throttle::ResourceThrottleRetryPolicy;
use crate::core::constants::headers as names;
use crate::core::{
    ClientConfig, ClientError, ClientResult, DiagnosticLevel, ErrorKind, Headers, OperationType,
    ResourceType,
};
use crate::endpoint::EndpointManager;
use crate::observability::{AttemptRecord, Diagnostics, Event};
use crate::session::SessionTracker;
use crate::transport::{Request, Response, Transport};

/// Policies guarding one logical request, selected by fault shape.
struct PolicySet {
    discovery: EndpointDiscoveryRetryPolicy,
    throttle: ResourceThrottleRetryPolicy,
    session: SessionReadRetryPolicy,
    failover: TimeoutFailoverRetryPolicy,
    connection_reset: ConnectionResetRetryPolicy,
}

impl PolicySet {
    fn new(config: &ClientConfig, endpoints: &Arc<EndpointManager>, info: RequestInfo) -> Self {
        let policy = &config.connection_policy;
        Self {
            discovery: EndpointDiscoveryRetryPolicy::new(endpoints.clone(), info.clone(), &policy.failover),
            throttle: ResourceThrottleRetryPolicy::new(&policy.retry_options),
            session: SessionReadRetryPolicy::new(endpoints.clone(), info.clone()),
            failover: TimeoutFailoverRetryPolicy::new(endpoints.clone(), info.clone(), &policy.failover),
            connection_reset: ConnectionResetRetryPolicy::new(info, &policy.failover),
        }
    }

    /// Precedence: discovery, throttle, session read, failover, then the
    /// connection-reset fallback.
    fn select(&mut self, err: &ClientError) -> &mut dyn RetryPolicy {
        if err.kind == ErrorKind::EndpointUnreachable || err.is_account_not_found() || err.is_write_forbidden() {
            &mut self.discovery
        } else if err.is_throttle() {
            &mut self.throttle
        } else if err.is_read_session_unavailable() {
            &mut self.session
        } else if err.is_service_unavailable() || err.kind == ErrorKind::Timeout {
            &mut self.failover
        } else {
            &mut self.connection_reset
        }
    }

    fn throttle_headers(&self, headers: &mut Headers) {
        headers.insert(names::THROTTLE_RETRY_COUNT, self.throttle.attempts().to_string());
        headers.insert(
            names::THROTTLE_RETRY_WAIT_MS,
            self.throttle.cumulative_wait().as_millis().to_string(),
        );
    }
}

/// Sends requests through the retry loop.
pub struct ExecutionOrchestrator {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    endpoints: Arc<EndpointManager>,
    sessions: Arc<SessionTracker>,
}

impl ExecutionOrchestrator {
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        endpoints: Arc<EndpointManager>,
        sessions: Arc<SessionTracker>,
    ) -> Self {
        Self {
            config,
            transport,
            endpoints,
            sessions,
        }
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.endpoints
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute `request` with retries.
    ///
    /// On success the response carries the throttle retry count and
    /// cumulative wait as headers, plus the attempt history. On failure the
    /// same headers and history are attached to the returned fault.
    pub async fn execute(&self, mut request: Request, cancel: &CancellationToken) -> ClientResult<Response> {
        let mut policies = PolicySet::new(&self.config, &self.endpoints, RequestInfo::of(&request));
        let mut ctx = RetryContext::default();
        let mut diagnostics = Diagnostics::new();
        let timeout = self.config.connection_policy.request_timeout();

        self.sessions.apply_to_request(&mut request);

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::cancelled().with_diagnostics(diagnostics));
            }
            attempt += 1;

            if ctx.clear_session_token {
                self.sessions.clear(&request.path);
                request.clear_session_token();
                ctx.clear_session_token = false;
            }

            let operation = if ctx.route_to_write_endpoint {
                OperationType::Replace
            } else {
                request.operation_type
            };
            let endpoint = match self
                .endpoints
                .resolve_service_endpoint(request.resource_type, operation, ctx.location_index.unwrap_or(0))
                .await
            {
                Ok(endpoint) => endpoint,
                Err(e) => return Err(e.with_diagnostics(diagnostics)),
            };
            request.stamp();

            let started_at = Utc::now();
            let start = Instant::now();
            let outcome = self.send_once(&endpoint, &request, timeout, cancel).await;
            let latency = start.elapsed();

            match outcome {
                Ok(mut response) => {
                    diagnostics.record_attempt(AttemptRecord {
                        attempt,
                        endpoint: endpoint.clone(),
                        started_at,
                        latency,
                        status: Some(response.status),
                        substatus: response.headers.substatus(),
                        retry_policy: None,
                        headers: None,
                    });
                    self.capture_session(&request, response.status, None, &response.headers);
                    policies.throttle_headers(&mut response.headers);
                    response.diagnostics = diagnostics;
                    return Ok(response);
                }
                Err(err) if err.kind == ErrorKind::Cancelled => {
                    return Err(err.with_diagnostics(diagnostics));
                }
                Err(mut err) => {
                    diagnostics.record_attempt(AttemptRecord {
                        attempt,
                        endpoint: endpoint.clone(),
                        started_at,
                        latency,
                        status: err.status,
                        substatus: err.substatus,
                        retry_policy: None,
                        headers: (self.config.diagnostic_level == DiagnosticLevel::Debug)
                            .then(|| err.headers.clone()),
                    });
                    if let (ErrorKind::Service, Some(code)) = (err.kind, err.status) {
                        self.capture_session(&request, code, err.substatus, &err.headers);
                    }

                    let policy = policies.select(&err);
                    let name = policy.name();
                    match policy.should_retry(&err, &mut ctx, &endpoint).await {
                        Some(delay) => {
                            diagnostics.mark_last_retried(name);
                            if err.is_throttle() {
                                diagnostics.record_throttle(delay);
                            }
                            tracing::debug!(
                                event = %Event::RetryScheduled,
                                policy = name,
                                attempt,
                                endpoint = %endpoint,
                                code = err.code(),
                                status = ?err.status,
                                delay_ms = delay.as_millis() as u64,
                                "retrying request"
                            );
                            if !delay.is_zero() {
                                tokio::select! {
                                    _ = cancel.cancelled() => {
                                        return Err(ClientError::cancelled().with_diagnostics(diagnostics));
                                    }
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                        }
                        None => {
                            tracing::debug!(
                                event = %Event::RetryExhausted,
                                policy = name,
                                attempts = attempt,
                                code = err.code(),
                                status = ?err.status,
                                "giving up on request"
                            );
                            policies.throttle_headers(&mut err.headers);
                            return Err(err.with_diagnostics(diagnostics));
                        }
                    }
                }
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        request: &Request,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ClientResult<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::cancelled()),
            result = tokio::time::timeout(timeout, self.transport.send(endpoint, request)) => match result {
                Ok(sent) => sent.and_then(Response::into_result),
                Err(_) => {
                    tracing::warn!(
                        event = %Event::AttemptTimeout,
                        endpoint,
                        timeout_ms = timeout.as_millis() as u64,
                        "attempt timed out"
                    );
                    Err(ClientError::timeout(format!(
                        "Request to {} timed out after {}ms",
                        endpoint,
                        timeout.as_millis()
                    )))
                }
            },
        }
    }

    /// Deleting a container drops its tokens; everything else merges.
    fn capture_session(&self, request: &Request, status: u16, substatus: Option<u32>, headers: &Headers) {
        let deleted_container = request.operation_type == OperationType::Delete
            && request.resource_type == ResourceType::Container
            && status < 400;
        if deleted_container {
            self.sessions.clear(&request.path);
        } else {
            self.sessions
                .capture_from_response(&request.path, request.operation_type, status, substatus, headers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConsistencyLevel, FailoverOptions};
    use crate::endpoint::{AccountLocation, AccountReader, DatabaseAccount};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct SingleRegion;

    #[async_trait]
    impl AccountReader for SingleRegion {
        async fn read_database_account(&self, _endpoint: &str) -> ClientResult<DatabaseAccount> {
            let loc = AccountLocation {
                name: "West US".to_string(),
                database_account_endpoint: "https://west/".to_string(),
            };
            Ok(DatabaseAccount {
                writable_locations: vec![loc.clone()],
                readable_locations: vec![loc],
                enable_multiple_writable_locations: false,
            })
        }
    }

    /// Pops one scripted outcome per send.
    struct Scripted {
        outcomes: Mutex<VecDeque<ClientResult<Response>>>,
        sent: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<ClientResult<Response>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, endpoint: &str, request: &Request) -> ClientResult<Response> {
            self.sent
                .lock()
                .unwrap()
                .push((endpoint.to_string(), request.session_token().map(str::to_string)));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Response::new(200, Headers::new(), serde_json::json!({}))))
        }
    }

    fn orchestrator(transport: Arc<Scripted>, config: ClientConfig) -> ExecutionOrchestrator {
        let config = Arc::new(config);
        let endpoints = Arc::new(EndpointManager::new(&config, Arc::new(SingleRegion)));
        let sessions = Arc::new(SessionTracker::new(ConsistencyLevel::Session));
        ExecutionOrchestrator::new(config, transport, endpoints, sessions)
    }

    fn read() -> Request {
        Request::new(ResourceType::Item, OperationType::Read, "dbs/db/colls/c/docs/1")
    }

    fn throttled(ms: u64) -> ClientResult<Response> {
        let headers: Headers = [(names::RETRY_AFTER_MS, ms.to_string())].into_iter().collect();
        Ok(Response::new(429, headers, serde_json::json!({"message": "busy"})))
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_then_success_reports_headers() {
        let transport = Arc::new(Scripted::new(vec![throttled(100), throttled(200)]));
        let orch = orchestrator(transport.clone(), ClientConfig::default());

        let response = orch.execute(read(), &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get(names::THROTTLE_RETRY_COUNT), Some("2"));
        assert_eq!(response.headers.get(names::THROTTLE_RETRY_WAIT_MS), Some("300"));
        assert_eq!(response.diagnostics.attempt_count(), 3);
        assert_eq!(response.diagnostics.attempts[0].retry_policy, Some("resource_throttle"));
        assert_eq!(transport.sent.lock().unwrap()[0].0, "https://west/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_exhaustion_surfaces_fault_with_headers() {
        let mut config = ClientConfig::default();
        config.connection_policy.retry_options.max_retry_attempt_count = 1;
        let transport = Arc::new(Scripted::new(vec![throttled(10), throttled(10)]));
        let orch = orchestrator(transport, config);

        let err = orch.execute(read(), &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_throttle());
        assert_eq!(err.headers.get(names::THROTTLE_RETRY_COUNT), Some("1"));
        assert_eq!(err.diagnostics.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_terminal_fault_is_not_retried() {
        let transport = Arc::new(Scripted::new(vec![Ok(Response::new(
            409,
            Headers::new(),
            serde_json::json!({"message": "conflict"}),
        ))]));
        let orch = orchestrator(transport.clone(), ClientConfig::default());
        let err = orch.execute(read(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.status, Some(409));
        assert_eq!(err.message, "conflict");
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_reset_retried_for_reads() {
        let transport = Arc::new(Scripted::new(vec![Err(ClientError::connection_reset("ECONNRESET"))]));
        let orch = orchestrator(transport.clone(), ClientConfig::default());
        let response = orch.execute(read(), &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_reset_not_retried_for_writes() {
        let transport = Arc::new(Scripted::new(vec![Err(ClientError::connection_reset("ECONNRESET"))]));
        let orch = orchestrator(transport, ClientConfig::default());
        let create = Request::new(ResourceType::Item, OperationType::Create, "dbs/db/colls/c/docs");
        let err = orch.execute(create, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = Arc::new(Scripted::new(vec![]));
        let orch = orchestrator(transport.clone(), ClientConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orch.execute(read(), &cancel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_region_session_read_retry_drops_token() {
        let headers: Headers = [(names::SUB_STATUS, "1002")].into_iter().collect();
        let transport = Arc::new(Scripted::new(vec![Ok(Response::new(
            404,
            headers,
            serde_json::json!({}),
        ))]));
        let orch = orchestrator(transport.clone(), ClientConfig::default());
        let request = read().with_header(names::SESSION_TOKEN, "0:1#5");
        let response = orch.execute(request, &CancellationToken::new()).await.unwrap();
        assert_eq!(response.status, 200);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.as_deref(), Some("0:1#5"));
        assert_eq!(sent[1].1, None);
    }

    #[tokio::test]
    async fn test_write_on_503_is_not_failed_over_in_single_write_account() {
        let transport = Arc::new(Scripted::new(vec![Ok(Response::new(
            503,
            Headers::new(),
            serde_json::json!({}),
        ))]));
        let mut config = ClientConfig::default();
        config.connection_policy.failover = FailoverOptions::default();
        let orch = orchestrator(transport, config);
        let create = Request::new(ResourceType::Item, OperationType::Create, "dbs/db/colls/c/docs");
        let err = orch.execute(create, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_service_unavailable());
    }
}
