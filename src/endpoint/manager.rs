//! Endpoint manager: which regional endpoint serves an operation now

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use super::location::{locational_endpoint, normalize_location, AccountReader, DatabaseAccount, Location};
use crate::core::{ClientConfig, ClientResult, OperationType, ResourceType};
use crate::observability::Event;

/// Unavailable endpoints become eligible again after this window.
pub const LOCATION_UNAVAILABLE_EXPIRATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default)]
struct Topology {
    writable: Vec<Location>,
    readable: Vec<Location>,
    multiple_write: bool,
}

impl Topology {
    fn is_discovered(&self) -> bool {
        !self.writable.is_empty() && !self.readable.is_empty()
    }

    fn list(&self, read: bool) -> &Vec<Location> {
        if read {
            &self.readable
        } else {
            &self.writable
        }
    }

    fn list_mut(&mut self, read: bool) -> &mut Vec<Location> {
        if read {
            &mut self.readable
        } else {
            &mut self.writable
        }
    }
}

pub struct EndpointManager {
    default_endpoint: String,
    enable_discovery: bool,
    preferred_locations: Vec<String>,
    use_multiple_write_locations: bool,
    reader: Arc<dyn AccountReader>,
    topology: RwLock<Topology>,
    refreshing: AtomicBool,
}

impl EndpointManager {
    pub fn new(config: &ClientConfig, reader: Arc<dyn AccountReader>) -> Self {
        let policy = &config.connection_policy;
        Self {
            default_endpoint: config.endpoint.clone(),
            enable_discovery: policy.enable_endpoint_discovery,
            preferred_locations: policy.preferred_locations.clone(),
            use_multiple_write_locations: policy.use_multiple_write_locations,
            reader,
            topology: RwLock::new(Topology::default()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    pub fn endpoint_discovery_enabled(&self) -> bool {
        self.enable_discovery
    }

    pub fn preferred_locations_count(&self) -> usize {
        self.preferred_locations.len()
    }

    fn is_discovered(&self) -> bool {
        self.topology.read().map(|t| t.is_discovered()).unwrap_or(false)
    }

    fn apply_account(&self, account: &DatabaseAccount, replace: bool) {
        if let Ok(mut topology) = self.topology.write() {
            if replace {
                topology.writable = account.writable_locations.iter().map(Location::from).collect();
                topology.readable = account.readable_locations.iter().map(Location::from).collect();
            } else {
                for (read, incoming) in [(false, &account.writable_locations), (true, &account.readable_locations)] {
                    let list = topology.list_mut(read);
                    for loc in incoming {
                        if !list.iter().any(|l| l.name == loc.name) {
                            list.push(Location::from(loc));
                        }
                    }
                }
            }
            topology.multiple_write = account.enable_multiple_writable_locations;
        }
    }

    /// Read topology on first use, from the default endpoint or a
    /// preferred region's endpoint.
    async fn ensure_discovered(&self) -> ClientResult<()> {
        if self.is_discovered() {
            return Ok(());
        }
        let account = self.account_from_any_endpoint().await?;
        self.apply_account(&account, true);
        tracing::info!(
            event = %Event::EndpointRefresh,
            writable = account.writable_locations.len(),
            readable = account.readable_locations.len(),
            "account topology discovered"
        );
        Ok(())
    }

    /// Endpoint for an operation, walking preferred regions from `start_index`.
    ///
    /// Falls back to the first available region from `start_index` in
    /// account order, then to the default endpoint.
    pub async fn resolve_service_endpoint(
        &self,
        resource_type: ResourceType,
        operation_type: OperationType,
        start_index: usize,
    ) -> ClientResult<String> {
        if !self.enable_discovery || resource_type == ResourceType::None {
            return Ok(self.default_endpoint.clone());
        }
        self.ensure_discovered().await?;

        let topology = match self.topology.read() {
            Ok(t) => t,
            Err(_) => return Ok(self.default_endpoint.clone()),
        };
        let locations = topology.list(operation_type.is_read_only());

        let mut chosen: Option<&Location> = None;
        if start_index < self.preferred_locations.len() {
            for preferred in &self.preferred_locations[start_index..] {
                let wanted = normalize_location(preferred);
                chosen = locations
                    .iter()
                    .find(|l| !l.unavailable && normalize_location(&l.name) == wanted);
                if chosen.is_some() {
                    break;
                }
            }
        }
        if chosen.is_none() {
            let search = if start_index < locations.len() {
                &locations[start_index..]
            } else {
                &locations[..]
            };
            chosen = search.iter().find(|l| !l.unavailable);
        }

        Ok(chosen
            .map(|l| l.endpoint.clone())
            .unwrap_or_else(|| self.default_endpoint.clone()))
    }

    pub async fn read_endpoint(&self) -> ClientResult<String> {
        self.resolve_service_endpoint(ResourceType::Item, OperationType::Read, 0).await
    }

    pub async fn write_endpoint(&self) -> ClientResult<String> {
        self.resolve_service_endpoint(ResourceType::Item, OperationType::Replace, 0).await
    }

    async fn endpoints(&self, read: bool) -> ClientResult<Vec<String>> {
        if self.enable_discovery {
            self.ensure_discovered().await?;
        }
        Ok(self
            .topology
            .read()
            .map(|t| t.list(read).iter().map(|l| l.endpoint.clone()).collect())
            .unwrap_or_default())
    }

    /// All readable endpoints in account order
    pub async fn read_endpoints(&self) -> ClientResult<Vec<String>> {
        self.endpoints(true).await
    }

    /// All writable endpoints in account order
    pub async fn write_endpoints(&self) -> ClientResult<Vec<String>> {
        self.endpoints(false).await
    }

    pub async fn mark_unavailable_for_read(&self, endpoint: &str) {
        self.mark_unavailable(endpoint, true).await
    }

    pub async fn mark_unavailable_for_write(&self, endpoint: &str) {
        self.mark_unavailable(endpoint, false).await
    }

    /// Refresh topology first, then record the mark.
    async fn mark_unavailable(&self, endpoint: &str, read: bool) {
        self.refresh_endpoint_list().await;
        if let Ok(mut topology) = self.topology.write() {
            if let Some(loc) = topology.list_mut(read).iter_mut().find(|l| l.endpoint == endpoint) {
                loc.unavailable = true;
                loc.last_unavailable_at = Some(Instant::now());
                tracing::warn!(
                    event = %Event::EndpointUnavailable,
                    endpoint,
                    region = %loc.name,
                    direction = if read { "read" } else { "write" },
                    "endpoint marked unavailable"
                );
            }
        }
    }

    /// Re-read topology, restore expired marks and add new regions.
    ///
    /// Concurrent refreshes collapse into one; read failures keep the
    /// current lists.
    pub async fn refresh_endpoint_list(&self) {
        if !self.enable_discovery || self.refreshing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(account) = self.account_from_any_endpoint().await {
            self.restore_expired();
            self.apply_account(&account, false);
            tracing::debug!(event = %Event::EndpointRefresh, "endpoint list refreshed");
        }
        self.refreshing.store(false, Ordering::SeqCst);
    }

    fn restore_expired(&self) {
        let now = Instant::now();
        if let Ok(mut topology) = self.topology.write() {
            for read in [true, false] {
                for loc in topology.list_mut(read).iter_mut() {
                    let expired = loc
                        .last_unavailable_at
                        .map_or(false, |at| now.duration_since(at) >= LOCATION_UNAVAILABLE_EXPIRATION);
                    if loc.unavailable && expired {
                        loc.unavailable = false;
                        loc.last_unavailable_at = None;
                    }
                }
            }
        }
    }

    /// Default endpoint first, then regional endpoints of preferred locations.
    ///
    /// Fails with the default endpoint's error when every candidate fails.
    async fn account_from_any_endpoint(&self) -> ClientResult<DatabaseAccount> {
        let first_err = match self.reader.read_database_account(&self.default_endpoint).await {
            Ok(account) => return Ok(account),
            Err(e) => e,
        };
        tracing::debug!(error = %first_err, "default endpoint topology read failed");
        for location in &self.preferred_locations {
            let Some(endpoint) = locational_endpoint(&self.default_endpoint, location) else {
                continue;
            };
            match self.reader.read_database_account(&endpoint).await {
                Ok(account) => return Ok(account),
                Err(e) => tracing::debug!(error = %e, endpoint = %endpoint, "regional topology read failed"),
            }
        }
        Err(first_err)
    }

    /// Multi-region writes apply to items and stored procedure execution only.
    pub fn can_use_multiple_write_locations(
        &self,
        resource_type: ResourceType,
        operation_type: OperationType,
    ) -> bool {
        self.use_multiple_write_locations
            && (resource_type == ResourceType::Item
                || (resource_type == ResourceType::StoredProcedure
                    && operation_type == OperationType::Execute))
    }
}
