//! In-memory stand-ins for the remote gallery API.
//!
//! `MockRemote` implements every remote trait, records how often it was
//! called and can be scripted to fail or to answer slowly. Used by the unit
//! and integration tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{Domain, MarkerScope};
use crate::error::PhotoFetchError;
use crate::fingerprint::LocalFile;
use crate::model::Photo;
use crate::remote::{
    ApiResponse, CollectionApi, MarkerSource, PhotoSource, UploadApi, UploadResponse,
};
use crate::snapshot::FreshnessMarker;

/// How the mock answers an upload for a given file name
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Success,
    /// The API answers, but with a status other than "Success"
    Rejected(String),
    /// The call itself fails
    Error(String),
}

/// Scriptable fake of the gallery API
#[derive(Default)]
pub struct MockRemote {
    markers: Mutex<HashMap<MarkerScope, String>>,
    fail_markers: AtomicBool,
    marker_calls: AtomicUsize,

    collections: Mutex<HashMap<Domain, ApiResponse<Vec<Value>>>>,
    fail_collections: AtomicBool,
    collection_calls: AtomicUsize,
    collection_delay: Mutex<Option<Duration>>,

    upload_outcomes: Mutex<HashMap<String, UploadOutcome>>,
    uploads: Mutex<Vec<(String, String)>>,

    photos: Mutex<HashMap<String, Result<Vec<Photo>, PhotoFetchError>>>,
    photo_delays: Mutex<HashMap<String, Duration>>,
    photo_calls: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_marker(&self, scope: MarkerScope, marker: &str) {
        self.markers.lock().unwrap().insert(scope, marker.to_string());
    }

    pub fn fail_markers(&self, fail: bool) {
        self.fail_markers.store(fail, Ordering::SeqCst);
    }

    pub fn marker_calls(&self) -> usize {
        self.marker_calls.load(Ordering::SeqCst)
    }

    pub fn set_collection(&self, domain: Domain, items: Vec<Value>) {
        self.collections
            .lock()
            .unwrap()
            .insert(domain, ApiResponse::ok(items));
    }

    /// Makes the collection endpoint answer with a non-200 code
    pub fn set_collection_failure(&self, domain: Domain, code: i64, message: Option<&str>) {
        self.collections.lock().unwrap().insert(
            domain,
            ApiResponse {
                code,
                data: None,
                message: message.map(String::from),
            },
        );
    }

    /// Makes every collection request fail at the transport level
    pub fn fail_collections(&self, fail: bool) {
        self.fail_collections.store(fail, Ordering::SeqCst);
    }

    pub fn set_collection_delay(&self, delay: Duration) {
        *self.collection_delay.lock().unwrap() = Some(delay);
    }

    pub fn collection_calls(&self) -> usize {
        self.collection_calls.load(Ordering::SeqCst)
    }

    pub fn set_upload_outcome(&self, file_name: &str, outcome: UploadOutcome) {
        self.upload_outcomes
            .lock()
            .unwrap()
            .insert(file_name.to_string(), outcome);
    }

    /// `(file name, album id)` for every upload call, in call order
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn set_photos(&self, album_id: &str, photos: Vec<Photo>) {
        self.photos
            .lock()
            .unwrap()
            .insert(album_id.to_string(), Ok(photos));
    }

    pub fn set_photo_error(&self, album_id: &str, error: PhotoFetchError) {
        self.photos
            .lock()
            .unwrap()
            .insert(album_id.to_string(), Err(error));
    }

    pub fn set_photo_delay(&self, album_id: &str, delay: Duration) {
        self.photo_delays
            .lock()
            .unwrap()
            .insert(album_id.to_string(), delay);
    }

    pub fn photo_calls(&self) -> usize {
        self.photo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarkerSource for MockRemote {
    async fn fetch_marker(&self, scope: MarkerScope) -> Result<FreshnessMarker> {
        self.marker_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_markers.load(Ordering::SeqCst) {
            return Err(anyhow!("marker endpoint unreachable"));
        }

        let markers = self.markers.lock().unwrap();
        markers
            .get(&scope)
            .map(|m| FreshnessMarker::new(m.clone()))
            .ok_or_else(|| anyhow!("no marker for scope {scope}"))
    }
}

#[async_trait]
impl CollectionApi for MockRemote {
    async fn fetch_collection(
        &self,
        domain: Domain,
        _params: &BTreeMap<String, String>,
    ) -> Result<ApiResponse<Vec<Value>>> {
        self.collection_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.collection_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_collections.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }

        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| ApiResponse::ok(Vec::new())))
    }
}

#[async_trait]
impl UploadApi for MockRemote {
    async fn upload(&self, file: &LocalFile, album_id: &str) -> Result<UploadResponse> {
        let name = file.descriptor.name.clone();
        self.uploads
            .lock()
            .unwrap()
            .push((name.clone(), album_id.to_string()));

        // Let sibling uploads interleave
        tokio::task::yield_now().await;

        let outcome = self
            .upload_outcomes
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or(UploadOutcome::Success);

        match outcome {
            UploadOutcome::Success => Ok(UploadResponse::success()),
            UploadOutcome::Rejected(status) => Ok(UploadResponse { status }),
            UploadOutcome::Error(message) => Err(anyhow!(message)),
        }
    }
}

#[async_trait]
impl PhotoSource for MockRemote {
    async fn fetch_photos(
        &self,
        album_id: &str,
        _year: &str,
    ) -> Result<Vec<Photo>, PhotoFetchError> {
        self.photo_calls.fetch_add(1, Ordering::SeqCst);

        // Answer with the photos set when the request was made
        let delay = self.photo_delays.lock().unwrap().get(album_id).copied();
        let answer = self
            .photos
            .lock()
            .unwrap()
            .get(album_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }
}

/// Creates a photo stored under `<year>/<album>/<name>`
pub fn mock_photo(year: &str, album_id: &str, name: &str) -> Photo {
    let key = format!("{year}/{album_id}/{name}");
    Photo {
        url: format!("https://cdn.example.com/{key}"),
        key,
        size: Some(1024),
        last_modified: None,
    }
}

/// A few albums in wire format
pub fn mock_albums() -> Vec<Value> {
    vec![
        json!({"id": "tokyo", "albumName": "Tokyo", "year": "2023", "isFeatured": true,
               "tags": ["city", "Japan"]}),
        json!({"id": "oslo", "albumName": "Oslo", "year": "2022",
               "place": {"lat": 59.91, "lng": 10.75, "displayName": "Oslo, Norway"}}),
        json!({"id": "family", "albumName": "Family", "year": "2023", "isPrivate": true}),
    ]
}

/// Tags in the unsorted order the API might return them
pub fn mock_tags() -> Vec<Value> {
    vec![json!("travel"), json!("Japan"), json!("city"), json!("Berlin")]
}

/// A couple of travel legs in wire format
pub fn mock_travel_records() -> Vec<Value> {
    vec![
        json!({"id": "t1", "departure": "Berlin", "destination": "Tokyo", "distance": 8918.0}),
        json!({"id": "t2", "departure": "Tokyo", "destination": "Oslo"}),
    ]
}
