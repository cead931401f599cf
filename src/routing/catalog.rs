//! Partition catalog: per-container cache of routing maps

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use super::range::{validate_sorted_disjoint, PartitionKeyRange, QueryRange};
use super::routing_map::RoutingMap;
use crate::core::{ClientError, ClientResult, ErrorKind};
use crate::observability::Event;

/// Where partition key ranges come from (the service's pkranges feed).
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Read the full current range list for a container.
    async fn read_partition_key_ranges(&self, container: &str) -> ClientResult<Vec<PartitionKeyRange>>;
}

/// Cached routing maps keyed by container link or rid.
///
/// A refresh swaps the cached `Arc<RoutingMap>` in one step, so readers see
/// either the old or the new complete map.
pub struct PartitionCatalog {
    source: Arc<dyn RangeSource>,
    maps: RwLock<HashMap<String, Arc<RoutingMap>>>,
}

impl PartitionCatalog {
    pub fn new(source: Arc<dyn RangeSource>) -> Self {
        Self {
            source,
            maps: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, container: &str) -> Option<Arc<RoutingMap>> {
        match self.maps.read() {
            Ok(maps) => maps.get(container).cloned(),
            Err(_) => None,
        }
    }

    /// Routing map for a container, fetched on first use or when forced.
    pub async fn routing_map(&self, container: &str, force_refresh: bool) -> ClientResult<Arc<RoutingMap>> {
        if !force_refresh {
            if let Some(map) = self.cached(container) {
                return Ok(map);
            }
        }

        let started = Instant::now();
        let ranges = self.source.read_partition_key_ranges(container).await?;
        let map = match RoutingMap::build(ranges) {
            Ok(map) => Arc::new(map),
            Err(e) => {
                tracing::error!(
                    event = %Event::CatalogRejected,
                    container,
                    error = %e,
                    "partition key ranges failed validation"
                );
                return Err(e);
            }
        };

        if let Ok(mut maps) = self.maps.write() {
            maps.insert(container.to_string(), Arc::clone(&map));
        }
        tracing::debug!(
            event = %Event::CatalogRefreshed,
            container,
            ranges = map.len(),
            forced = force_refresh,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "routing map cached"
        );
        Ok(map)
    }

    /// Ranges overlapping `queries`, sorted by `min_inclusive`.
    ///
    /// `queries` must be sorted and disjoint. A lookup that finds no covering
    /// range is retried once against a freshly fetched map before it is
    /// surfaced as fatal.
    pub async fn overlapping_ranges(
        &self,
        container: &str,
        queries: &[QueryRange],
        force_refresh: bool,
    ) -> ClientResult<Vec<PartitionKeyRange>> {
        validate_sorted_disjoint(queries)?;

        let map = self.routing_map(container, force_refresh).await?;
        match map.overlapping_ranges(queries) {
            Err(e) if e.kind == ErrorKind::CorruptCatalog && !force_refresh => {
                tracing::warn!(container, error = %e, "retrying range lookup with refreshed catalog");
                let map = self.routing_map(container, true).await?;
                map.overlapping_ranges(queries)
            }
            other => other,
        }
    }

    /// Owning range of one effective key, with the same single refresh retry.
    pub async fn range_for_epk(&self, container: &str, epk: &str) -> ClientResult<PartitionKeyRange> {
        let map = self.routing_map(container, false).await?;
        if let Some(range) = map.range_for_epk(epk) {
            return Ok(range.clone());
        }
        let map = self.routing_map(container, true).await?;
        map.range_for_epk(epk).cloned().ok_or_else(|| {
            ClientError::corrupt_catalog(format!("No partition key range owns effective key '{}'", epk))
        })
    }

    pub async fn range_by_id(&self, container: &str, id: &str, force_refresh: bool) -> ClientResult<Option<PartitionKeyRange>> {
        let map = self.routing_map(container, force_refresh).await?;
        Ok(map.range_by_id(id).cloned())
    }

    /// Drop a container's cached map.
    pub fn invalidate(&self, container: &str) {
        if let Ok(mut maps) = self.maps.write() {
            maps.remove(container);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves a scripted sequence of range lists, repeating the last one.
    struct ScriptedSource {
        lists: Mutex<Vec<Vec<PartitionKeyRange>>>,
        reads: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(lists: Vec<Vec<PartitionKeyRange>>) -> Arc<Self> {
            Arc::new(Self {
                lists: Mutex::new(lists),
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RangeSource for ScriptedSource {
        async fn read_partition_key_ranges(&self, _container: &str) -> ClientResult<Vec<PartitionKeyRange>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let mut lists = self.lists.lock().unwrap();
            if lists.len() > 1 {
                Ok(lists.remove(0))
            } else {
                Ok(lists[0].clone())
            }
        }
    }

    fn halves() -> Vec<PartitionKeyRange> {
        vec![
            PartitionKeyRange::new("0", "", "80"),
            PartitionKeyRange::new("1", "80", "FF"),
        ]
    }

    #[tokio::test]
    async fn test_map_is_cached() {
        let source = ScriptedSource::new(vec![halves()]);
        let catalog = PartitionCatalog::new(source.clone());
        catalog.routing_map("c", false).await.unwrap();
        catalog.routing_map("c", false).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        catalog.routing_map("c", true).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsorted_queries_are_caller_error() {
        let catalog = PartitionCatalog::new(ScriptedSource::new(vec![halves()]));
        let err = catalog
            .overlapping_ranges(
                "c",
                &[QueryRange::point("90"), QueryRange::point("10")],
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_corrupt_source_is_fatal() {
        let catalog = PartitionCatalog::new(ScriptedSource::new(vec![vec![
            PartitionKeyRange::new("0", "", "70"),
            PartitionKeyRange::new("1", "80", "FF"),
        ]]));
        let err = catalog.routing_map("c", false).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(catalog.cached("c").is_none());
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_split_parent() {
        let split = vec![
            PartitionKeyRange::new("2", "", "40").with_parents(vec!["0".into()]),
            PartitionKeyRange::new("3", "40", "80").with_parents(vec!["0".into()]),
            PartitionKeyRange::new("1", "80", "FF"),
        ];
        let catalog = PartitionCatalog::new(ScriptedSource::new(vec![halves(), split]));

        let before = catalog
            .overlapping_ranges("c", &[QueryRange::new("", "80", true, false)], false)
            .await
            .unwrap();
        assert_eq!(before.len(), 1);

        let after = catalog
            .overlapping_ranges("c", &[QueryRange::new("", "80", true, false)], true)
            .await
            .unwrap();
        let ids: Vec<&str> = after.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_range_for_epk() {
        let catalog = PartitionCatalog::new(ScriptedSource::new(vec![halves()]));
        assert_eq!(catalog.range_for_epk("c", "9A").await.unwrap().id, "1");
        assert!(catalog.range_by_id("c", "0", false).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = ScriptedSource::new(vec![halves()]);
        let catalog = PartitionCatalog::new(source.clone());
        catalog.routing_map("c", false).await.unwrap();
        catalog.invalidate("c");
        catalog.routing_map("c", false).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }
}
