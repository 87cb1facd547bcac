//! Remote collaborators of the sync and upload layer.
//!
//! Each concern the core consumes is a small trait so tests can substitute
//! in-memory fakes (see [`crate::mock`]). `HttpGalleryApi` implements all of
//! them against the gallery's HTTP API.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::fs as tokio_fs;
use url::Url;

use crate::domain::{Domain, MarkerScope};
use crate::error::PhotoFetchError;
use crate::fingerprint::LocalFile;
use crate::model::Photo;
use crate::snapshot::FreshnessMarker;

/// Application-level success code in collection responses
pub const SUCCESS_CODE: i64 = 200;

/// Upload status reported for a stored file
pub const UPLOAD_SUCCESS: &str = "Success";

/// Envelope returned by the collection endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

#[derive(Debug, Deserialize)]
struct MarkerResponse {
    #[serde(alias = "lastModified")]
    marker: String,
}

/// Body returned by the upload endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
}

impl UploadResponse {
    pub fn success() -> Self {
        Self {
            status: UPLOAD_SUCCESS.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UPLOAD_SUCCESS
    }
}

/// Source of truth for per-scope freshness markers
#[async_trait]
pub trait MarkerSource: Send + Sync {
    async fn fetch_marker(&self, scope: MarkerScope) -> Result<FreshnessMarker>;
}

/// Full-collection reads
#[async_trait]
pub trait CollectionApi: Send + Sync {
    async fn fetch_collection(
        &self,
        domain: Domain,
        params: &BTreeMap<String, String>,
    ) -> Result<ApiResponse<Vec<Value>>>;
}

/// Single-file uploads into an album
#[async_trait]
pub trait UploadApi: Send + Sync {
    async fn upload(&self, file: &LocalFile, album_id: &str) -> Result<UploadResponse>;
}

/// Photo listing for one album
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photos(
        &self,
        album_id: &str,
        year: &str,
    ) -> Result<Vec<Photo>, PhotoFetchError>;
}

/// HTTP implementation of every remote collaborator
#[derive(Debug, Clone)]
pub struct HttpGalleryApi {
    client: Client,
    base_url: Url,
}

impl HttpGalleryApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot have paths appended: {base_url}");
        }

        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Builds `<base>/api/<segments...>`, escaping each segment
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("API base URL cannot have paths appended"))?;
            path.pop_if_empty().push("api");
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to GET {url}"))?;

        decode_json(response, &url).await
    }
}

/// Decodes a JSON envelope, also from error statuses that carry one.
///
/// An error status without a decodable body is reported as an HTTP error
/// rather than a decode failure.
async fn decode_json<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {url}"));
    }

    let body = response
        .text()
        .await
        .with_context(|| format!("{url} returned HTTP {status}"))?;
    serde_json::from_str(&body).map_err(|_| anyhow!("{url} returned HTTP {status}"))
}

#[async_trait]
impl MarkerSource for HttpGalleryApi {
    async fn fetch_marker(&self, scope: MarkerScope) -> Result<FreshnessMarker> {
        let url = self.endpoint(["freshness", scope.as_str()])?;
        debug!("GET {url}");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to GET {url}"))?
            .error_for_status()
            .with_context(|| format!("Marker endpoint {url} returned an error"))?;

        let body: MarkerResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to decode marker from {url}"))?;

        Ok(FreshnessMarker::new(body.marker))
    }
}

#[async_trait]
impl CollectionApi for HttpGalleryApi {
    async fn fetch_collection(
        &self,
        domain: Domain,
        params: &BTreeMap<String, String>,
    ) -> Result<ApiResponse<Vec<Value>>> {
        let mut url = self.endpoint(domain.collection_path().split('/'))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }

        self.get_json(url).await
    }
}

#[async_trait]
impl UploadApi for HttpGalleryApi {
    async fn upload(&self, file: &LocalFile, album_id: &str) -> Result<UploadResponse> {
        let url = self.endpoint(["albums", album_id, "photos"])?;

        let bytes = tokio_fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        let part = Part::bytes(bytes)
            .file_name(file.descriptor.name.clone())
            .mime_str(&file.descriptor.media_type)
            .with_context(|| format!("Invalid media type {}", file.descriptor.media_type))?;
        let form = Form::new().part("file", part);

        debug!("POST {url} ({})", file.descriptor.name);
        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to POST {url}"))?;

        decode_json(response, &url).await
    }
}

#[async_trait]
impl PhotoSource for HttpGalleryApi {
    async fn fetch_photos(
        &self,
        album_id: &str,
        year: &str,
    ) -> Result<Vec<Photo>, PhotoFetchError> {
        let mut url = self
            .endpoint(["albums", album_id, "photos"])
            .map_err(|e| PhotoFetchError::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("year", year);
        debug!("GET {url}");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PhotoFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PhotoFetchError::Unauthorized {
                code: i64::from(status.as_u16()),
            });
        }

        let body: ApiResponse<Vec<Photo>> = decode_json(response, &url)
            .await
            .map_err(|e| PhotoFetchError::Transport(format!("{e:#}")))?;

        if !body.is_success() {
            return Err(PhotoFetchError::from_code(body.code, body.message));
        }
        Ok(body.data.unwrap_or_default())
    }
}
