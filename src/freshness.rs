//! Freshness oracle: decides whether a cached snapshot is still current.
//!
//! The oracle is fail-closed. If the authoritative marker cannot be fetched
//! the caller gets a [`SyncError::MarkerFetch`], never a guess that the
//! cached data is fine.

use log::debug;
use std::sync::Arc;

use crate::domain::Domain;
use crate::error::SyncError;
use crate::remote::MarkerSource;
use crate::snapshot::FreshnessMarker;

/// Result of comparing a cached marker with the authoritative one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    pub is_latest: bool,
    pub current_marker: FreshnessMarker,
}

pub struct FreshnessOracle {
    source: Arc<dyn MarkerSource>,
}

impl FreshnessOracle {
    pub fn new(source: Arc<dyn MarkerSource>) -> Self {
        Self { source }
    }

    /// Fetches the authoritative marker covering `domain`
    pub async fn current_marker(&self, domain: Domain) -> Result<FreshnessMarker, SyncError> {
        self.source
            .fetch_marker(domain.marker_scope())
            .await
            .map_err(|e| SyncError::MarkerFetch {
                domain,
                message: format!("{e:#}"),
            })
    }

    /// Compares `cached` with the current marker by strict equality.
    ///
    /// No cached marker is always stale. Markers are never ordered, any
    /// difference counts as a change.
    pub async fn is_fresh(
        &self,
        domain: Domain,
        cached: Option<&FreshnessMarker>,
    ) -> Result<Freshness, SyncError> {
        let current_marker = self.current_marker(domain).await?;
        let is_latest = cached == Some(&current_marker);

        debug!(
            "{domain}: cached marker {:?}, current {current_marker}, latest: {is_latest}",
            cached.map(FreshnessMarker::as_str)
        );

        Ok(Freshness {
            is_latest,
            current_marker,
        })
    }
}
