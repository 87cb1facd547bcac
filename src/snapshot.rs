//! Local snapshot cache.
//!
//! A snapshot pairs a freshness marker with the collection items fetched
//! while that marker was current. Snapshots are only ever replaced whole:
//! each write serializes the complete snapshot into a single store value.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::domain::Domain;
use crate::store::KeyValueStore;

const KEY_PREFIX: &str = "gallery-sync";

/// Opaque "data last changed at" token. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessMarker(String);

impl FreshnessMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FreshnessMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one cached collection: a domain plus optional query scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub domain: Domain,
    pub scope: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            scope: BTreeMap::new(),
        }
    }

    /// Adds a scope parameter, e.g. `("year", "2023")`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope.insert(name.into(), value.into());
        self
    }

    /// The key under which the snapshot lives in the durable store.
    ///
    /// Scope parameters are hashed from their canonical (sorted) form, so
    /// equal keys always map to the same entry and different domains never
    /// share one.
    pub fn storage_key(&self) -> String {
        if self.scope.is_empty() {
            return format!("{KEY_PREFIX}:{}", self.domain);
        }

        let canonical: Vec<String> = self
            .scope
            .iter()
            .map(|(name, value)| format!("{}:{name}={}:{value}", name.len(), value.len()))
            .collect();
        let digest = md5::compute(canonical.join(";"));
        format!("{KEY_PREFIX}:{}:{digest:x}", self.domain)
    }
}

impl From<Domain> for CacheKey {
    fn from(domain: Domain) -> Self {
        CacheKey::new(domain)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.domain)?;
        for (name, value) in &self.scope {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// A collection captured under a single freshness marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub marker: FreshnessMarker,
    pub items: Vec<T>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(marker: FreshnessMarker, items: Vec<T>) -> Self {
        Self {
            marker,
            items,
            fetched_at: Utc::now(),
        }
    }
}

/// Typed snapshot access over a shared key-value store
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads the snapshot for `key`. Missing and corrupt entries both read
    /// as `None`.
    pub fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<Snapshot<T>> {
        let raw = self.store.get_item(&key.storage_key())?;

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Ignoring corrupt snapshot for {key}: {e}");
                None
            }
        }
    }

    /// Replaces the snapshot for `key`
    pub fn write<T: Serialize>(&self, key: &CacheKey, snapshot: &Snapshot<T>) -> Result<()> {
        let json = serde_json::to_string(snapshot)
            .with_context(|| format!("Failed to serialize snapshot for {key}"))?;
        self.store
            .set_item(&key.storage_key(), &json)
            .with_context(|| format!("Failed to store snapshot for {key}"))?;
        debug!(
            "Stored {} items for {key} under marker {}",
            snapshot.items.len(),
            snapshot.marker
        );
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        self.store
            .remove_item(&key.storage_key())
            .with_context(|| format!("Failed to remove snapshot for {key}"))
    }

    /// Records `key` as a member of `group` so the whole group can later be
    /// dropped with [`SnapshotCache::remove_group`]
    pub fn add_to_group(&self, group: &str, key: &CacheKey) -> Result<()> {
        let mut members = self.group_members(group);
        if !members.insert(key.storage_key()) {
            return Ok(());
        }

        let json = serde_json::to_string(&members)
            .with_context(|| format!("Failed to serialize snapshot group {group}"))?;
        self.store
            .set_item(&group_key(group), &json)
            .with_context(|| format!("Failed to store snapshot group {group}"))
    }

    /// Removes every snapshot recorded in `group`, then the group itself.
    /// Returns how many snapshots were dropped.
    pub fn remove_group(&self, group: &str) -> Result<usize> {
        let members = self.group_members(group);
        for storage_key in &members {
            self.store
                .remove_item(storage_key)
                .with_context(|| format!("Failed to remove {storage_key} from group {group}"))?;
        }
        self.store
            .remove_item(&group_key(group))
            .with_context(|| format!("Failed to remove snapshot group {group}"))?;

        debug!("Dropped {} snapshots of group {group}", members.len());
        Ok(members.len())
    }

    fn group_members(&self, group: &str) -> BTreeSet<String> {
        let Some(raw) = self.store.get_item(&group_key(group)) else {
            return BTreeSet::new();
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt snapshot group {group}: {e}");
            BTreeSet::new()
        })
    }
}

fn group_key(group: &str) -> String {
    format!("{KEY_PREFIX}:group:{group}")
}
