//! Error types for collection synchronization and photo fetching.
//!
//! Upload failures are deliberately absent here: they are absorbed into the
//! per-candidate status of an upload batch and never surface as errors.

use thiserror::Error;

use crate::domain::Domain;

/// Message used when the remote reports a failure code without a message
pub const DEFAULT_FAILURE_MESSAGE: &str = "request failed";

/// Failure of a single `sync` call for one domain.
///
/// `Clone` so that every caller collapsed onto one in-flight fetch receives
/// the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The authoritative freshness marker could not be resolved
    #[error("failed to fetch freshness marker for {domain}: {message}")]
    MarkerFetch { domain: Domain, message: String },

    /// The collection API answered with a non-200 application code
    #[error("collection fetch for {domain} failed with code {code}: {message}")]
    CollectionFetch {
        domain: Domain,
        code: i64,
        message: String,
    },

    /// The collection request never produced an application response
    #[error("transport error while fetching {domain}: {message}")]
    Transport { domain: Domain, message: String },

    /// The collection payload did not match the requested item type
    #[error("could not decode {domain} items: {message}")]
    Decode { domain: Domain, message: String },
}

impl SyncError {
    /// The domain whose synchronization failed
    pub fn domain(&self) -> Domain {
        match self {
            SyncError::MarkerFetch { domain, .. }
            | SyncError::CollectionFetch { domain, .. }
            | SyncError::Transport { domain, .. }
            | SyncError::Decode { domain, .. } => *domain,
        }
    }
}

/// Failure of a photo-collection fetch for the selected album
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhotoFetchError {
    #[error("not authorized to view album photos (code {code})")]
    Unauthorized { code: i64 },

    #[error("photo fetch failed with code {code}: {message}")]
    Application { code: i64, message: String },

    #[error("transport error while fetching photos: {0}")]
    Transport(String),
}

impl PhotoFetchError {
    /// Maps an application or HTTP status code onto the error taxonomy
    pub fn from_code(code: i64, message: Option<String>) -> Self {
        match code {
            401 | 403 => PhotoFetchError::Unauthorized { code },
            _ => PhotoFetchError::Application {
                code,
                message: message.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PhotoFetchError::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_codes() {
        assert!(PhotoFetchError::from_code(401, None).is_unauthorized());
        assert!(PhotoFetchError::from_code(403, None).is_unauthorized());
        assert!(!PhotoFetchError::from_code(500, None).is_unauthorized());
    }

    #[test]
    fn test_missing_message_defaults() {
        let err = PhotoFetchError::from_code(500, None);
        assert_eq!(
            err,
            PhotoFetchError::Application {
                code: 500,
                message: DEFAULT_FAILURE_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_sync_error_domain() {
        let err = SyncError::MarkerFetch {
            domain: Domain::AlbumTags,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.domain(), Domain::AlbumTags);
        assert!(err.to_string().contains("album-tags"));
    }
}
