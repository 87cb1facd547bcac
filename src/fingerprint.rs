//! Content fingerprints for local files.
//!
//! A fingerprint is derived only from a file's static attributes (name,
//! size, modification time and media type), never from its bytes. Two
//! distinct files sharing all four attributes collide on purpose: the
//! second submission is treated as a duplicate.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// The static attributes of a local file chosen for upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub media_type: String,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
        media_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified,
            media_type: media_type.into(),
        }
    }
}

/// Derives the deduplication and idempotency key for a file.
///
/// Format: `<len>:<name>-<size>-<modified millis>-<len>:<media type>`.
/// The free-text parts carry their byte length, so a `-` inside a name or
/// media type cannot shift the other fields.
pub fn fingerprint(file: &FileDescriptor) -> String {
    format!(
        "{}:{}-{}-{}-{}:{}",
        file.name.len(),
        file.name,
        file.size,
        file.last_modified.timestamp_millis(),
        file.media_type.len(),
        file.media_type
    )
}

/// A file on disk, described and ready to be turned into an upload candidate
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub descriptor: FileDescriptor,
    pub path: PathBuf,
    /// `file://` URL the presentation layer can use as a preview source
    pub preview_url: String,
}

impl LocalFile {
    /// Reads the static attributes of the file at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;

        let last_modified: DateTime<Utc> = metadata
            .modified()
            .with_context(|| format!("Failed to read modification time for {}", path.display()))?
            .into();

        let absolute = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let preview_url = Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| anyhow::anyhow!("Cannot build preview URL for {}", absolute.display()))?;

        Ok(Self {
            descriptor: FileDescriptor::new(
                name,
                metadata.len(),
                last_modified,
                media_type_for(path),
            ),
            path: absolute,
            preview_url,
        })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.descriptor)
    }
}

/// Guesses the media type from the file extension
pub fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
