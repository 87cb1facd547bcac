//! Named logical collections and their per-domain policies.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A named logical collection cached on the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Albums,
    AlbumTags,
    FeaturedAlbums,
    GeoTaggedAlbums,
    TravelRecords,
}

/// The remote scope whose freshness marker covers a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerScope {
    Album,
    Travel,
}

impl MarkerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerScope::Album => "album",
            MarkerScope::Travel => "travel",
        }
    }
}

impl fmt::Display for MarkerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Albums,
        Domain::AlbumTags,
        Domain::FeaturedAlbums,
        Domain::GeoTaggedAlbums,
        Domain::TravelRecords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Albums => "albums",
            Domain::AlbumTags => "album-tags",
            Domain::FeaturedAlbums => "featured-albums",
            Domain::GeoTaggedAlbums => "geo-tagged-albums",
            Domain::TravelRecords => "travel-records",
        }
    }

    /// Path of the collection endpoint, relative to the API root
    pub fn collection_path(&self) -> &'static str {
        match self {
            Domain::Albums => "albums",
            Domain::AlbumTags => "albums/tags",
            Domain::FeaturedAlbums => "albums/featured",
            Domain::GeoTaggedAlbums => "albums/geo",
            Domain::TravelRecords => "travels",
        }
    }

    /// All album-derived domains share the album marker
    pub fn marker_scope(&self) -> MarkerScope {
        match self {
            Domain::TravelRecords => MarkerScope::Travel,
            _ => MarkerScope::Album,
        }
    }

    /// Applies the domain's ordering policy to freshly fetched items.
    ///
    /// Runs once, before the snapshot is written, so every reader of the
    /// cache sees the same pre-sorted sequence.
    pub fn sort_items(&self, items: &mut [Value]) {
        if let Domain::AlbumTags = self {
            items.sort_by(|a, b| tag_text(a).cmp(tag_text(b)));
        }
    }
}

// Tags arrive either as bare strings or as `{ "tag": "..." }` objects
fn tag_text(value: &Value) -> &str {
    value
        .as_str()
        .or_else(|| value.get("tag").and_then(Value::as_str))
        .unwrap_or_default()
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Domain::ALL.iter().map(Domain::as_str).collect();
                format!("unknown domain '{s}', expected one of: {}", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_round_trips_names() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>(), Ok(domain));
        }
        assert!("photos".parse::<Domain>().is_err());
    }

    #[test]
    fn test_marker_scopes() {
        assert_eq!(Domain::Albums.marker_scope(), MarkerScope::Album);
        assert_eq!(Domain::GeoTaggedAlbums.marker_scope(), MarkerScope::Album);
        assert_eq!(Domain::TravelRecords.marker_scope(), MarkerScope::Travel);
    }

    #[test]
    fn test_tags_sorted_case_sensitively() {
        let mut items = vec![json!("beach"), json!("Zoo"), json!("alps"), json!("Berlin")];
        Domain::AlbumTags.sort_items(&mut items);
        assert_eq!(
            items,
            vec![json!("Berlin"), json!("Zoo"), json!("alps"), json!("beach")]
        );
    }

    #[test]
    fn test_other_domains_keep_remote_order() {
        let mut items = vec![json!({"id": "b"}), json!({"id": "a"})];
        Domain::Albums.sort_items(&mut items);
        assert_eq!(items, vec![json!({"id": "b"}), json!({"id": "a"})]);
    }
}
