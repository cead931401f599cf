//! Shared fakes for integration tests
//!
//! - `SequencedRanges`: a range source whose answer changes across refreshes
//! - `PagedService`: a query client serving scripted pages per range
//! - `FakeAccount`: a two-region transport serving topology, ranges,
//!   query plans and query pages

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use aerolink::core::constants::headers as names;
use aerolink::core::{ClientError, ClientResult, Headers, OperationType, QueryOptions, ResourceType};
use aerolink::query::{Page, QueryClient, QueryInfo, QueryIterator, QueryPlan, SortOrder, SqlQuery};
use aerolink::routing::{PartitionCatalog, PartitionKeyRange, RangeSource};
use aerolink::transport::{Request, Response, Transport};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const CONTAINER: &str = "dbs/db/colls/c";
pub const CONTAINER_RID: &str = "AAAAAAAAAAA=";
pub const DEFAULT_ENDPOINT: &str = "https://acct.example.com/";
pub const WEST: &str = "https://acct-westus.example.com/";
pub const EAST: &str = "https://acct-eastus.example.com/";

// =============================================================================
// Ranges and rows
// =============================================================================

pub fn two_ranges() -> Vec<PartitionKeyRange> {
    vec![PartitionKeyRange::new("0", "", "80"), PartitionKeyRange::new("1", "80", "FF")]
}

/// Range 0 of `two_ranges` split into 2 and 3.
pub fn after_split() -> Vec<PartitionKeyRange> {
    vec![
        PartitionKeyRange::new("2", "", "40").with_parents(vec!["0".into()]),
        PartitionKeyRange::new("3", "40", "80").with_parents(vec!["0".into()]),
        PartitionKeyRange::new("1", "80", "FF"),
    ]
}

/// Row shape produced by a rewritten ORDER BY query.
pub fn order_row(key: Value, payload: Value) -> Value {
    json!({"orderByItems": [{"item": key}], "payload": payload})
}

pub fn gone() -> ClientError {
    let headers: Headers = [(names::SUB_STATUS, "1002")].into_iter().collect();
    ClientError::service(410, headers, "partition key range gone")
}

pub fn order_by_plan(orders: Vec<SortOrder>) -> QueryPlan {
    QueryPlan {
        query_info: QueryInfo {
            order_by: orders,
            rewritten_query: "SELECT c._rid, [{\"item\": c.v}] AS orderByItems, c AS payload FROM c WHERE ({documentdb-formattableorderbyquery-filter}) ORDER BY c.v".into(),
            ..Default::default()
        },
        query_ranges: vec![],
    }
}

// =============================================================================
// Range source
// =============================================================================

/// Serves range lists in order, repeating the last one.
pub struct SequencedRanges {
    lists: Mutex<Vec<Vec<PartitionKeyRange>>>,
    reads: Mutex<u32>,
}

impl SequencedRanges {
    pub fn new(lists: Vec<Vec<PartitionKeyRange>>) -> Self {
        Self {
            lists: Mutex::new(lists),
            reads: Mutex::new(0),
        }
    }

    pub fn fixed(ranges: Vec<PartitionKeyRange>) -> Self {
        Self::new(vec![ranges])
    }

    pub fn reads(&self) -> u32 {
        *self.reads.lock().unwrap()
    }
}

#[async_trait]
impl RangeSource for SequencedRanges {
    async fn read_partition_key_ranges(&self, _container: &str) -> ClientResult<Vec<PartitionKeyRange>> {
        *self.reads.lock().unwrap() += 1;
        let mut lists = self.lists.lock().unwrap();
        if lists.len() > 1 {
            Ok(lists.remove(0))
        } else {
            Ok(lists[0].clone())
        }
    }
}

// =============================================================================
// Query client
// =============================================================================

type Scripted = ClientResult<(Vec<Value>, Option<String>)>;

/// Pages keyed by (range id, continuation); every page costs `charge`.
///
/// Unpinned page requests get the "needs a query plan" 400.
pub struct PagedService {
    plan: QueryPlan,
    pages: Mutex<HashMap<(String, String), Scripted>>,
    charge: f64,
    requests: Mutex<Vec<(String, String)>>,
}

impl PagedService {
    pub fn new(plan: QueryPlan) -> Self {
        Self {
            plan,
            pages: Mutex::new(HashMap::new()),
            charge: 1.0,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn add(&self, range: &str, continuation: &str, items: Vec<Value>, next: Option<&str>) {
        self.pages.lock().unwrap().insert(
            (range.to_string(), continuation.to_string()),
            Ok((items, next.map(str::to_string))),
        );
    }

    pub fn fail(&self, range: &str, continuation: &str, err: ClientError) {
        self.pages
            .lock()
            .unwrap()
            .insert((range.to_string(), continuation.to_string()), Err(err));
    }

    /// (range id, continuation) of every pinned page request, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryClient for PagedService {
    async fn fetch_page(
        &self,
        _query: &SqlQuery,
        range: Option<&PartitionKeyRange>,
        continuation: Option<&str>,
        _page_size: u32,
    ) -> ClientResult<Page> {
        let Some(range) = range else {
            return Err(ClientError::service(400, Headers::new(), "Cross partition query only supports 'VALUE <AggregateFunc>'")
                .with_body(json!({"additionalErrorInfo": "{}"})));
        };
        let key = (range.id.clone(), continuation.unwrap_or("").to_string());
        self.requests.lock().unwrap().push(key.clone());
        let (items, next) = self
            .pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(Ok((vec![], None)))?;
        let mut headers = Headers::new();
        headers.set_request_charge(self.charge);
        if let Some(next) = next {
            headers.insert(names::CONTINUATION, next);
        }
        Ok(Page { items, headers })
    }

    async fn fetch_query_plan(&self, _query: &SqlQuery) -> ClientResult<QueryPlan> {
        Ok(self.plan.clone())
    }
}

pub fn iterator(service: Arc<PagedService>, ranges: Arc<SequencedRanges>, text: &str, options: QueryOptions) -> QueryIterator {
    QueryIterator::new(
        service,
        Arc::new(PartitionCatalog::new(ranges)),
        CONTAINER,
        SqlQuery::new(text),
        options,
    )
}

// =============================================================================
// Transport
// =============================================================================

/// One request as the fake account saw it
#[derive(Debug, Clone)]
pub struct Sent {
    pub endpoint: String,
    pub resource_type: ResourceType,
    pub operation_type: OperationType,
    pub range_id: Option<String>,
    pub session_token: Option<String>,
    pub continuation: Option<String>,
    pub epk_bounds: Option<(String, String)>,
}

/// Two-region account: writes in West US, reads in West US and East US.
///
/// Query pages are cut from `docs[range]` by the page size header, with
/// the continuation carrying the next offset.
pub struct FakeAccount {
    ranges: Vec<PartitionKeyRange>,
    docs: HashMap<String, Vec<Value>>,
    plan: Value,
    down: Mutex<HashSet<String>>,
    session_misses: Mutex<u32>,
    sent: Mutex<Vec<Sent>>,
}

impl FakeAccount {
    pub fn new(ranges: Vec<PartitionKeyRange>, plan: Value) -> Self {
        Self {
            ranges,
            docs: HashMap::new(),
            plan,
            down: Mutex::new(HashSet::new()),
            session_misses: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_docs(mut self, range: &str, docs: Vec<Value>) -> Self {
        self.docs.insert(range.to_string(), docs);
        self
    }

    /// Regional endpoint refuses connections from now on.
    pub fn take_down(&self, endpoint: &str) {
        self.down.lock().unwrap().insert(endpoint.to_string());
    }

    /// The next `n` query pages answer 404/1002.
    pub fn miss_sessions(&self, n: u32) {
        *self.session_misses.lock().unwrap() = n;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Query page requests only.
    pub fn pages_sent(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.operation_type == OperationType::Query && s.range_id.is_some())
            .collect()
    }

    fn account() -> Value {
        json!({
            "writableLocations": [{"name": "West US", "databaseAccountEndpoint": WEST}],
            "readableLocations": [
                {"name": "West US", "databaseAccountEndpoint": WEST},
                {"name": "East US", "databaseAccountEndpoint": EAST}
            ],
            "enableMultipleWriteLocations": false
        })
    }

    fn page(&self, range: &str, request: &Request) -> Response {
        let docs = self.docs.get(range).cloned().unwrap_or_default();
        let start: usize = request
            .headers
            .continuation()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let size: usize = request
            .headers
            .get(names::PAGE_SIZE)
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);
        let end = (start + size).min(docs.len());

        let mut headers = Headers::new();
        headers.set_request_charge(2.0);
        headers.insert(names::OWNER_ID, CONTAINER_RID);
        headers.insert(names::SESSION_TOKEN, format!("{}:1#{}#1={}", range, 10 + end, 10 + end));
        if end < docs.len() {
            headers.insert(names::CONTINUATION, end.to_string());
        }
        Response::new(200, headers, json!({"Documents": docs[start.min(end)..end].to_vec()}))
    }
}

#[async_trait]
impl Transport for FakeAccount {
    async fn send(&self, endpoint: &str, request: &Request) -> ClientResult<Response> {
        let range_id = request.headers.get(names::PARTITION_KEY_RANGE_ID).map(str::to_string);
        self.sent.lock().unwrap().push(Sent {
            endpoint: endpoint.to_string(),
            resource_type: request.resource_type,
            operation_type: request.operation_type,
            range_id: range_id.clone(),
            session_token: request.session_token().map(str::to_string),
            continuation: request.headers.continuation().map(str::to_string),
            epk_bounds: request
                .headers
                .get(names::START_EPK)
                .zip(request.headers.get(names::END_EPK))
                .map(|(min, max)| (min.to_string(), max.to_string())),
        });

        if request.resource_type == ResourceType::DatabaseAccount {
            return Ok(Response::new(200, Headers::new(), Self::account()));
        }
        if self.down.lock().unwrap().contains(endpoint) {
            return Err(ClientError::unreachable(format!("{} refused the connection", endpoint)));
        }

        match (request.resource_type, request.operation_type) {
            (ResourceType::PartitionKeyRange, OperationType::Read) => Ok(Response::new(
                200,
                Headers::new(),
                json!({"PartitionKeyRanges": self.ranges}),
            )),
            (ResourceType::Item, OperationType::QueryPlan) => Ok(Response::new(200, Headers::new(), self.plan.clone())),
            (ResourceType::Item, OperationType::Query) => {
                let Some(range) = range_id else {
                    return Ok(Response::new(
                        400,
                        Headers::new(),
                        json!({"message": "Cross partition query only supports 'VALUE <AggregateFunc>'", "additionalErrorInfo": "{}"}),
                    ));
                };
                {
                    let mut misses = self.session_misses.lock().unwrap();
                    if *misses > 0 {
                        *misses -= 1;
                        let headers: Headers = [(names::SUB_STATUS, "1002")].into_iter().collect();
                        return Ok(Response::new(404, headers, json!({"message": "read session not available"})));
                    }
                }
                Ok(self.page(&range, request))
            }
            (ResourceType::Item, OperationType::Read) => match range_id {
                Some(range) => Ok(self.page(&range, request)),
                None => Ok(Response::new(200, Headers::new(), json!({}))),
            },
            _ => Ok(Response::new(200, Headers::new(), json!({}))),
        }
    }
}
