//! Typed access to every cached gallery collection.
//!
//! `GalleryCollections` wraps one [`CollectionSynchronizer`] and exposes a
//! method per domain, so the presentation layer never deals with cache keys
//! or raw JSON. Each instance owns its store, which keeps tests isolated
//! from one another.

use log::warn;
use std::sync::Arc;

use crate::domain::Domain;
use crate::error::SyncError;
use crate::freshness::FreshnessOracle;
use crate::model::{Album, AlbumTag, TravelRecord};
use crate::remote::{CollectionApi, MarkerSource};
use crate::snapshot::{CacheKey, SnapshotCache};
use crate::store::KeyValueStore;
use crate::synchronizer::CollectionSynchronizer;

/// Snapshot group holding every year-filtered album list
pub const YEAR_FILTERED_ALBUMS: &str = "albums-by-year";

/// Cache key of the albums filed under `year`
pub fn albums_by_year_key(year: &str) -> CacheKey {
    CacheKey::new(Domain::Albums).with("year", year)
}

#[derive(Clone)]
pub struct GalleryCollections {
    synchronizer: CollectionSynchronizer,
}

impl GalleryCollections {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        markers: Arc<dyn MarkerSource>,
        api: Arc<dyn CollectionApi>,
    ) -> Self {
        Self {
            synchronizer: CollectionSynchronizer::new(
                SnapshotCache::new(store),
                FreshnessOracle::new(markers),
                api,
            ),
        }
    }

    pub fn synchronizer(&self) -> &CollectionSynchronizer {
        &self.synchronizer
    }

    /// All albums visible to the current user
    pub async fn albums(&self, force: bool) -> Result<Vec<Album>, SyncError> {
        self.synchronizer.sync(Domain::Albums, force).await
    }

    /// Albums filed under one year, cached separately from the full list
    pub async fn albums_by_year(&self, year: &str, force: bool) -> Result<Vec<Album>, SyncError> {
        let key = albums_by_year_key(year);
        let albums = self.synchronizer.sync(key.clone(), force).await?;

        if let Err(e) = self
            .synchronizer
            .cache()
            .add_to_group(YEAR_FILTERED_ALBUMS, &key)
        {
            warn!("Failed to track {key}: {e:#}");
        }
        Ok(albums)
    }

    /// Distinct album tags, sorted case-sensitively ascending
    pub async fn album_tags(&self, force: bool) -> Result<Vec<AlbumTag>, SyncError> {
        self.synchronizer.sync(Domain::AlbumTags, force).await
    }

    pub async fn featured_albums(&self, force: bool) -> Result<Vec<Album>, SyncError> {
        self.synchronizer.sync(Domain::FeaturedAlbums, force).await
    }

    pub async fn geo_tagged_albums(&self, force: bool) -> Result<Vec<Album>, SyncError> {
        self.synchronizer.sync(Domain::GeoTaggedAlbums, force).await
    }

    pub async fn travel_records(&self, force: bool) -> Result<Vec<TravelRecord>, SyncError> {
        self.synchronizer.sync(Domain::TravelRecords, force).await
    }
}
