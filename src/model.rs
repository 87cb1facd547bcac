//! Records exchanged with the gallery API.
//!
//! Field names are camelCase on the wire. Every field has a default so a
//! record missing an optional path still decodes, with the default standing
//! in for the absent value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an album as listed by the gallery
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Album {
    pub id: String,
    pub album_name: String,
    /// Year bucket the album is filed under (e.g. "2023")
    pub year: String,
    pub cover_image: Option<String>,
    pub is_private: bool,
    pub is_featured: bool,
    pub tags: Vec<String>,
    /// Only set for geo-tagged albums
    pub place: Option<Place>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Geographic location attached to an album
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    pub display_name: Option<String>,
}

/// Album tags are plain strings
pub type AlbumTag = String;

/// A single leg of a trip shown on the travel map
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TravelRecord {
    pub id: String,
    pub departure: String,
    pub destination: String,
    pub departure_time: Option<DateTime<Utc>>,
    pub distance: Option<f64>,
    pub notes: Option<String>,
}

/// A photo stored in an album
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Photo {
    /// Storage key, e.g. "2023/tokyo/IMG_0001.jpg"
    pub key: String,
    pub url: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Photo {
    /// The last path segment of the storage key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_missing_fields_default() -> anyhow::Result<()> {
        let album: Album = serde_json::from_str(r#"{"id": "tokyo", "albumName": "Tokyo"}"#)?;

        assert_eq!(album.id, "tokyo");
        assert_eq!(album.album_name, "Tokyo");
        assert_eq!(album.year, "");
        assert!(!album.is_private);
        assert!(album.tags.is_empty());
        assert!(album.place.is_none());
        Ok(())
    }

    #[test]
    fn test_geo_album_place() -> anyhow::Result<()> {
        let album: Album = serde_json::from_str(
            r#"{"id": "oslo", "year": "2022", "place": {"lat": 59.91, "lng": 10.75}}"#,
        )?;

        let place = album.place.expect("place should decode");
        assert_eq!(place.lat, 59.91);
        assert_eq!(place.display_name, None);
        Ok(())
    }

    #[test]
    fn test_photo_file_name() {
        let photo = Photo {
            key: "2023/tokyo/IMG_0001.jpg".to_string(),
            ..Default::default()
        };
        assert_eq!(photo.file_name(), "IMG_0001.jpg");

        let flat = Photo {
            key: "cover.png".to_string(),
            ..Default::default()
        };
        assert_eq!(flat.file_name(), "cover.png");
    }
}
