//! Collection synchronizer.
//!
//! For each cache key the synchronizer decides between serving the cached
//! snapshot and refetching the collection:
//!
//! 1. the freshness marker is resolved first (a failure aborts the sync),
//! 2. a forced sync, a missing snapshot or a changed marker triggers a full
//!    fetch, sorted per domain and written back as a new snapshot,
//! 3. otherwise the cached items are returned unchanged.
//!
//! Concurrent syncs of the same key share one in-flight future, so only one
//! marker check and one fetch run at a time for a given key. A forced sync
//! arriving while an unforced one is running waits for it to settle and
//! then runs on its own, which keeps snapshot writes for a key strictly
//! sequential.

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DEFAULT_FAILURE_MESSAGE, SyncError};
use crate::freshness::FreshnessOracle;
use crate::remote::CollectionApi;
use crate::snapshot::{CacheKey, Snapshot, SnapshotCache};

type SyncResult = Result<Arc<Vec<Value>>, SyncError>;
type SharedSync = Shared<BoxFuture<'static, SyncResult>>;

struct InFlight {
    id: u64,
    force: bool,
    future: SharedSync,
}

struct Inner {
    cache: SnapshotCache,
    oracle: FreshnessOracle,
    api: Arc<dyn CollectionApi>,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    next_id: AtomicU64,
}

/// Reuses or refreshes cached collections, one logical resource per key
#[derive(Clone)]
pub struct CollectionSynchronizer {
    inner: Arc<Inner>,
}

impl CollectionSynchronizer {
    pub fn new(cache: SnapshotCache, oracle: FreshnessOracle, api: Arc<dyn CollectionApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                oracle,
                api,
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.inner.cache
    }

    /// Synchronizes `key` and decodes the items as `T`
    pub async fn sync<T: DeserializeOwned>(
        &self,
        key: impl Into<CacheKey>,
        force: bool,
    ) -> Result<Vec<T>, SyncError> {
        let key = key.into();
        let domain = key.domain;
        let values = self.sync_values(key, force).await?;

        values
            .iter()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| SyncError::Decode {
                    domain,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Synchronizes `key`, returning the raw items shared with any other
    /// caller that joined the same in-flight sync
    pub async fn sync_values(&self, key: CacheKey, force: bool) -> SyncResult {
        let future = self.join_or_start(key, force);
        future.await
    }

    fn join_or_start(&self, key: CacheKey, force: bool) -> SharedSync {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // A running forced sync satisfies any request; a running unforced
        // one only satisfies another unforced request.
        let previous = match in_flight.get(&key) {
            Some(running) if running.force || !force => {
                debug!("{key}: joining in-flight sync");
                return running.future.clone();
            }
            Some(running) => Some(running.future.clone()),
            None => None,
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        let future = async move {
            if let Some(previous) = previous {
                // Outcome belongs to the callers of the earlier sync
                let _ = previous.await;
            }

            let result = inner.run(&task_key, force).await;

            let mut in_flight = inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if in_flight.get(&task_key).is_some_and(|entry| entry.id == id) {
                in_flight.remove(&task_key);
            }

            result
        }
        .boxed()
        .shared();

        in_flight.insert(
            key,
            InFlight {
                id,
                force,
                future: future.clone(),
            },
        );
        future
    }
}

impl Inner {
    async fn run(&self, key: &CacheKey, force: bool) -> SyncResult {
        let domain = key.domain;
        let cached: Option<Snapshot<Value>> = self.cache.read(key);

        // The marker check always completes before any fetch decision
        let freshness = self
            .oracle
            .is_fresh(domain, cached.as_ref().map(|snapshot| &snapshot.marker))
            .await?;

        match cached {
            Some(snapshot) if freshness.is_latest && !force => {
                debug!("{key}: cache hit under marker {}", snapshot.marker);
                return Ok(Arc::new(snapshot.items));
            }
            Some(_) if force => info!("{key}: forced refetch"),
            Some(_) => info!("{key}: marker changed to {}, refetching", freshness.current_marker),
            None => info!("{key}: no cached snapshot, fetching"),
        }

        let response = self
            .api
            .fetch_collection(domain, &key.scope)
            .await
            .map_err(|e| SyncError::Transport {
                domain,
                message: format!("{e:#}"),
            })?;

        if !response.is_success() {
            let message = response
                .message
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            warn!("{key}: fetch failed with code {}: {message}", response.code);
            return Err(SyncError::CollectionFetch {
                domain,
                code: response.code,
                message,
            });
        }

        let mut items = response.data.unwrap_or_default();
        domain.sort_items(&mut items);

        let snapshot = Snapshot::new(freshness.current_marker, items);
        if let Err(e) = self.cache.write(key, &snapshot) {
            // Serving fresh data still beats failing the sync
            warn!("{key}: {e:#}");
        }

        Ok(Arc::new(snapshot.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, MarkerScope};
    use crate::mock::{MockRemote, mock_albums, mock_tags};
    use crate::model::Album;
    use crate::snapshot::FreshnessMarker;
    use crate::store::{KeyValueStore, MemoryStore};
    use serde_json::json;
    use std::time::Duration;

    fn synchronizer(remote: &Arc<MockRemote>) -> (Arc<MemoryStore>, CollectionSynchronizer) {
        let store = Arc::new(MemoryStore::new());
        let sync = CollectionSynchronizer::new(
            SnapshotCache::new(store.clone()),
            FreshnessOracle::new(remote.clone()),
            remote.clone(),
        );
        (store, sync)
    }

    #[tokio::test]
    async fn test_write_through_then_cache_hit() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        let (_, sync) = synchronizer(&remote);

        let first: Vec<Album> = sync.sync(Domain::Albums, false).await.unwrap();
        let second: Vec<Album> = sync.sync(Domain::Albums, false).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(remote.collection_calls(), 1);
        assert_eq!(remote.marker_calls(), 2);
    }

    #[tokio::test]
    async fn test_changed_marker_refetches() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        let (_, sync) = synchronizer(&remote);

        sync.sync::<Album>(Domain::Albums, false).await.unwrap();

        remote.set_marker(MarkerScope::Album, "m2");
        remote.set_collection(Domain::Albums, vec![json!({"id": "new"})]);
        let albums: Vec<Album> = sync.sync(Domain::Albums, false).await.unwrap();

        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].id, "new");
        assert_eq!(remote.collection_calls(), 2);

        let snapshot: Snapshot<Value> = sync.cache().read(&Domain::Albums.into()).unwrap();
        assert_eq!(snapshot.marker, FreshnessMarker::new("m2"));
    }

    #[tokio::test]
    async fn test_force_refetches_under_unchanged_marker() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        let (_, sync) = synchronizer(&remote);

        sync.sync::<Value>(Domain::FeaturedAlbums, false).await.unwrap();
        sync.sync::<Value>(Domain::FeaturedAlbums, true).await.unwrap();

        assert_eq!(remote.collection_calls(), 2);
    }

    #[tokio::test]
    async fn test_marker_failure_is_fail_closed() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        let (_, sync) = synchronizer(&remote);
        sync.sync::<Album>(Domain::Albums, false).await.unwrap();

        remote.fail_markers(true);
        let err = sync.sync::<Album>(Domain::Albums, false).await.unwrap_err();

        assert!(matches!(err, SyncError::MarkerFetch { .. }));
        assert_eq!(remote.collection_calls(), 1);
        // The old snapshot is still there for the next successful sync
        assert!(sync.cache().read::<Value>(&Domain::Albums.into()).is_some());
    }

    #[tokio::test]
    async fn test_application_failure_keeps_stale_snapshot() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Travel, "t1");
        remote.set_collection(Domain::TravelRecords, vec![json!({"id": "t1"})]);
        let (_, sync) = synchronizer(&remote);
        sync.sync::<Value>(Domain::TravelRecords, false).await.unwrap();

        remote.set_marker(MarkerScope::Travel, "t2");
        remote.set_collection_failure(Domain::TravelRecords, 500, None);
        let err = sync
            .sync::<Value>(Domain::TravelRecords, false)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SyncError::CollectionFetch {
                domain: Domain::TravelRecords,
                code: 500,
                message: DEFAULT_FAILURE_MESSAGE.to_string(),
            }
        );
        let snapshot: Snapshot<Value> = sync.cache().read(&Domain::TravelRecords.into()).unwrap();
        assert_eq!(snapshot.marker, FreshnessMarker::new("t1"));

        // Recovers once the API does
        remote.set_collection(Domain::TravelRecords, vec![json!({"id": "t2"})]);
        let items: Vec<Value> = sync.sync(Domain::TravelRecords, false).await.unwrap();
        assert_eq!(items, vec![json!({"id": "t2"})]);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.fail_collections(true);
        let (store, sync) = synchronizer(&remote);

        let err = sync.sync::<Value>(Domain::GeoTaggedAlbums, false).await.unwrap_err();

        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_cached_sorted() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::AlbumTags, mock_tags());
        let (_, sync) = synchronizer(&remote);

        let tags: Vec<String> = sync.sync(Domain::AlbumTags, false).await.unwrap();
        assert_eq!(tags, vec!["Berlin", "Japan", "city", "travel"]);

        let snapshot: Snapshot<String> = sync.cache().read(&Domain::AlbumTags.into()).unwrap();
        assert_eq!(snapshot.items, tags);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_refetched() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        let (store, sync) = synchronizer(&remote);
        store
            .set_item(&CacheKey::new(Domain::Albums).storage_key(), "garbage")
            .unwrap();

        let albums: Vec<Album> = sync.sync(Domain::Albums, false).await.unwrap();

        assert_eq!(albums.len(), 3);
        assert_eq!(remote.collection_calls(), 1);
    }

    #[tokio::test]
    async fn test_decode_error() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::AlbumTags, vec![json!({"not": "a string"})]);
        let (_, sync) = synchronizer(&remote);

        let err = sync.sync::<String>(Domain::AlbumTags, false).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { domain: Domain::AlbumTags, .. }));
    }

    #[tokio::test]
    async fn test_scoped_keys_are_cached_separately() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        let (store, sync) = synchronizer(&remote);

        let y2023 = CacheKey::new(Domain::Albums).with("year", "2023");
        let y2024 = CacheKey::new(Domain::Albums).with("year", "2024");
        sync.sync::<Value>(y2023.clone(), false).await.unwrap();
        sync.sync::<Value>(y2024, false).await.unwrap();
        sync.sync::<Value>(y2023, false).await.unwrap();

        assert_eq!(remote.collection_calls(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_syncs_share_one_fetch() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        remote.set_collection_delay(Duration::from_millis(50));
        let (_, sync) = synchronizer(&remote);

        let (a, b, c) = tokio::join!(
            sync.sync::<Album>(Domain::Albums, false),
            sync.sync::<Album>(Domain::Albums, false),
            sync.sync::<Album>(Domain::Albums, false),
        );

        assert_eq!(a.unwrap().len(), 3);
        assert_eq!(b.unwrap().len(), 3);
        assert_eq!(c.unwrap().len(), 3);
        assert_eq!(remote.marker_calls(), 1);
        assert_eq!(remote.collection_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_sync_waits_for_running_sync() {
        let remote = Arc::new(MockRemote::new());
        remote.set_marker(MarkerScope::Album, "m1");
        remote.set_collection(Domain::Albums, mock_albums());
        remote.set_collection_delay(Duration::from_millis(50));
        let (_, sync) = synchronizer(&remote);

        let (plain, forced) = tokio::join!(
            sync.sync::<Album>(Domain::Albums, false),
            sync.sync::<Album>(Domain::Albums, true),
        );

        assert!(plain.is_ok());
        assert!(forced.is_ok());
        assert_eq!(remote.collection_calls(), 2);

        // Nothing left running, the next call starts from the cache
        sync.sync::<Album>(Domain::Albums, false).await.unwrap();
        assert_eq!(remote.collection_calls(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_shared_but_not_sticky() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_markers(true);
        let (_, sync) = synchronizer(&remote);

        assert!(sync.sync::<Value>(Domain::Albums, false).await.is_err());

        remote.fail_markers(false);
        remote.set_marker(MarkerScope::Album, "m1");
        assert!(sync.sync::<Value>(Domain::Albums, false).await.is_ok());
    }
}
