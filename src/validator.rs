//! Static type/size policy applied to files before they enter the upload pipeline.

use serde::{Deserialize, Serialize};

use crate::fingerprint::FileDescriptor;

/// Default ceiling for a single upload (20 MiB)
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 20 * 1024 * 1024;

/// Outcome of validating one candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    InvalidFormat,
    InvalidSize,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

/// Which files may be uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Accepted media types, e.g. "image/jpeg"
    pub allowed_types: Vec<String>,
    /// Largest accepted file, in bytes
    pub max_size_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_types: ["image/jpeg", "image/png", "image/gif", "image/webp", "image/avif"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Classifies a file. The format check wins over the size check.
    pub fn validate(&self, file: &FileDescriptor) -> Validation {
        if !self.allowed_types.iter().any(|t| t == &file.media_type) {
            return Validation::InvalidFormat;
        }
        if file.size > self.max_size_bytes {
            return Validation::InvalidSize;
        }
        Validation::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(media_type: &str, size: u64) -> FileDescriptor {
        FileDescriptor::new("photo", size, Utc::now(), media_type)
    }

    #[test]
    fn test_valid_file() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.validate(&file("image/jpeg", 1024)), Validation::Valid);
        assert_eq!(
            policy.validate(&file("image/png", DEFAULT_MAX_SIZE_BYTES)),
            Validation::Valid
        );
    }

    #[test]
    fn test_oversized_file() {
        let policy = UploadPolicy::default();
        assert_eq!(
            policy.validate(&file("image/jpeg", DEFAULT_MAX_SIZE_BYTES + 1)),
            Validation::InvalidSize
        );
    }

    #[test]
    fn test_format_takes_precedence_over_size() {
        let policy = UploadPolicy::default();
        assert_eq!(
            policy.validate(&file("application/pdf", DEFAULT_MAX_SIZE_BYTES * 2)),
            Validation::InvalidFormat
        );
    }

    #[test]
    fn test_custom_policy() {
        let policy = UploadPolicy {
            allowed_types: vec!["image/heic".to_string()],
            max_size_bytes: 10,
        };
        assert_eq!(policy.validate(&file("image/heic", 10)), Validation::Valid);
        assert_eq!(policy.validate(&file("image/jpeg", 1)), Validation::InvalidFormat);
    }
}
