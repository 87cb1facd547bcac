//! # gallery-sync
//!
//! Client-side data freshness and upload orchestration for a photo-album
//! gallery.
//!
//! Collections (albums, album tags, featured albums, geo-tagged albums and
//! travel records) are cached locally together with the freshness marker
//! they were fetched under, and only refetched when the remote marker
//! changes. Uploads are validated, deduplicated by fingerprint and driven
//! concurrently with per-file status tracking.
//!
//! ## Layout
//!
//! - `fingerprint`, `validator`: per-file identity and upload policy
//! - `store`, `snapshot`: durable key-value storage and typed snapshots
//! - `freshness`, `synchronizer`, `gallery`: marker checks and cached syncs
//! - `upload`: the upload state machine and batch aggregation
//! - `selection`: the selected album and its photo collection
//! - `remote`, `mock`: HTTP and in-memory collaborators

pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod freshness;
pub mod gallery;
pub mod mock;
pub mod model;
pub mod remote;
pub mod selection;
pub mod snapshot;
pub mod store;
pub mod synchronizer;
pub mod upload;
pub mod validator;
