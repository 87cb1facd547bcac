//! Upload orchestration.
//!
//! Every candidate moves through a one-way state machine:
//!
//! ```text
//! Pending --begin--> Loading --success--> Uploaded
//!    |                  \------failure--> Failed
//!    \----invalid or existing, no overwrite--> Failed
//! ```
//!
//! `Uploaded` and `Failed` are terminal. A batch uploads all of its
//! candidates concurrently and is complete only once every one of them has
//! settled; a failing candidate never aborts its siblings and never turns
//! into a batch-level error.

use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

use crate::fingerprint::LocalFile;
use crate::model::Photo;
use crate::remote::UploadApi;
use crate::validator::{UploadPolicy, Validation};

/// Lifecycle of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    /// Selected, not yet attempted
    Pending,
    Loading,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Uploaded | UploadStatus::Failed)
    }

    fn can_become(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Pending, UploadStatus::Loading)
                | (UploadStatus::Pending, UploadStatus::Failed)
                | (UploadStatus::Loading, UploadStatus::Uploaded)
                | (UploadStatus::Loading, UploadStatus::Failed)
        )
    }
}

/// Aggregate phase of a batch, published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Uploading,
    Complete,
}

/// Photos already present in the target album, looked up by file name
pub trait RemotePhotoIndex: Send + Sync {
    fn contains(&self, file_name: &str) -> bool;
}

impl RemotePhotoIndex for HashSet<String> {
    fn contains(&self, file_name: &str) -> bool {
        HashSet::contains(self, file_name)
    }
}

/// File names of an album's known photo collection
#[derive(Debug, Clone, Default)]
pub struct PhotoNames(HashSet<String>);

impl PhotoNames {
    pub fn from_photos(photos: &[Photo]) -> Self {
        Self(photos.iter().map(|p| p.file_name().to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl RemotePhotoIndex for PhotoNames {
    fn contains(&self, file_name: &str) -> bool {
        self.0.contains(file_name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A file submitted for upload
#[derive(Debug)]
pub struct UploadCandidate {
    pub fingerprint: String,
    pub file: LocalFile,
    pub validation: Validation,
    exists_remotely: Mutex<Option<bool>>,
    status: Mutex<UploadStatus>,
}

impl UploadCandidate {
    /// Validates `file` against `policy`; the verdict is fixed from here on
    pub fn new(file: LocalFile, policy: &UploadPolicy) -> Self {
        Self {
            fingerprint: file.fingerprint(),
            validation: policy.validate(&file.descriptor),
            file,
            exists_remotely: Mutex::new(None),
            status: Mutex::new(UploadStatus::Pending),
        }
    }

    /// The name the file is stored under in the album
    pub fn remote_name(&self) -> &str {
        &self.file.descriptor.name
    }

    pub fn preview_url(&self) -> &str {
        &self.file.preview_url
    }

    pub fn status(&self) -> UploadStatus {
        *lock(&self.status)
    }

    /// `None` until checked against the album at upload time
    pub fn exists_remotely(&self) -> Option<bool> {
        *lock(&self.exists_remotely)
    }

    fn transition(&self, next: UploadStatus) -> bool {
        let mut status = lock(&self.status);
        if !status.can_become(next) {
            warn!(
                "{}: ignoring transition {:?} -> {next:?}",
                self.fingerprint, *status
            );
            return false;
        }
        *status = next;
        true
    }
}

struct BatchInner {
    id: Uuid,
    candidates: Vec<UploadCandidate>,
    is_uploading: AtomicBool,
    is_complete: AtomicBool,
    phase: watch::Sender<BatchPhase>,
}

/// Candidates submitted together, tracked in aggregate
#[derive(Clone)]
pub struct UploadBatch {
    inner: Arc<BatchInner>,
}

impl UploadBatch {
    /// Builds a batch, validating each file. Files with a fingerprint
    /// already in the batch are dropped.
    pub fn new(files: Vec<LocalFile>, policy: &UploadPolicy) -> Self {
        let mut seen = HashSet::new();
        let candidates: Vec<UploadCandidate> = files
            .into_iter()
            .filter_map(|file| {
                let candidate = UploadCandidate::new(file, policy);
                if seen.insert(candidate.fingerprint.clone()) {
                    Some(candidate)
                } else {
                    debug!("Dropping duplicate submission {}", candidate.fingerprint);
                    None
                }
            })
            .collect();

        let (phase, _) = watch::channel(BatchPhase::Idle);
        Self {
            inner: Arc::new(BatchInner {
                id: Uuid::new_v4(),
                candidates,
                is_uploading: AtomicBool::new(false),
                is_complete: AtomicBool::new(false),
                phase,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn candidates(&self) -> &[UploadCandidate] {
        &self.inner.candidates
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.is_uploading.load(Ordering::SeqCst)
    }

    pub fn is_complete_uploading(&self) -> bool {
        self.inner.is_complete.load(Ordering::SeqCst)
    }

    /// Observe the aggregate phase as it changes
    pub fn subscribe(&self) -> watch::Receiver<BatchPhase> {
        self.inner.phase.subscribe()
    }

    pub fn statuses(&self) -> HashMap<String, UploadStatus> {
        self.candidates()
            .iter()
            .map(|c| (c.fingerprint.clone(), c.status()))
            .collect()
    }
}

/// Counts reported once a batch has settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub uploaded: usize,
    /// Rejected by validation or already present without overwrite
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.uploaded + self.skipped + self.failed
    }
}

pub struct UploadOrchestrator {
    api: Arc<dyn UploadApi>,
    overwrite: bool,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn UploadApi>, overwrite: bool) -> Self {
        Self { api, overwrite }
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Drives one candidate to a terminal status and returns it.
    ///
    /// Candidates that already left `Pending` are returned as they are.
    pub async fn upload_file(
        &self,
        candidate: &UploadCandidate,
        album_id: &str,
        existing: &dyn RemotePhotoIndex,
    ) -> UploadStatus {
        if candidate.status() != UploadStatus::Pending {
            return candidate.status();
        }

        if !candidate.validation.is_valid() {
            debug!(
                "{}: rejected by policy ({:?})",
                candidate.fingerprint, candidate.validation
            );
            candidate.transition(UploadStatus::Failed);
            return candidate.status();
        }

        let exists = existing.contains(candidate.remote_name());
        *lock(&candidate.exists_remotely) = Some(exists);

        if exists && !self.overwrite {
            info!(
                "Skipping {}: already in album {album_id}",
                candidate.remote_name()
            );
            candidate.transition(UploadStatus::Failed);
            return candidate.status();
        }

        if !candidate.transition(UploadStatus::Loading) {
            return candidate.status();
        }

        let next = match self.api.upload(&candidate.file, album_id).await {
            Ok(response) if response.is_success() => UploadStatus::Uploaded,
            Ok(response) => {
                warn!(
                    "Upload of {} answered with status {}",
                    candidate.remote_name(),
                    response.status
                );
                UploadStatus::Failed
            }
            Err(e) => {
                warn!("Upload of {} failed: {e:#}", candidate.remote_name());
                UploadStatus::Failed
            }
        };
        candidate.transition(next);
        candidate.status()
    }

    /// Uploads every candidate of `batch` concurrently.
    ///
    /// The batch is flagged uploading immediately and complete only after
    /// all candidates settled. A batch is uploaded at most once; later calls
    /// just report the summary.
    pub async fn upload_files(
        &self,
        batch: &UploadBatch,
        album_id: &str,
        existing: &dyn RemotePhotoIndex,
    ) -> BatchSummary {
        let inner = &batch.inner;

        if inner.is_complete.load(Ordering::SeqCst)
            || inner
                .is_uploading
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            warn!("Batch {} was already uploaded", inner.id);
            return self.summarize(batch);
        }
        inner.phase.send_replace(BatchPhase::Uploading);

        info!(
            "Uploading {} files to album {album_id} (batch {})",
            inner.candidates.len(),
            inner.id
        );

        join_all(
            inner
                .candidates
                .iter()
                .map(|candidate| self.upload_file(candidate, album_id, existing)),
        )
        .await;

        inner.is_uploading.store(false, Ordering::SeqCst);
        inner.is_complete.store(true, Ordering::SeqCst);
        inner.phase.send_replace(BatchPhase::Complete);

        let summary = self.summarize(batch);
        info!(
            "Batch {} complete: {} uploaded, {} skipped, {} failed",
            inner.id, summary.uploaded, summary.skipped, summary.failed
        );
        summary
    }

    fn summarize(&self, batch: &UploadBatch) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for candidate in batch.candidates() {
            match candidate.status() {
                UploadStatus::Uploaded => summary.uploaded += 1,
                UploadStatus::Failed
                    if !candidate.validation.is_valid()
                        || (candidate.exists_remotely() == Some(true) && !self.overwrite) =>
                {
                    summary.skipped += 1
                }
                UploadStatus::Failed => summary.failed += 1,
                UploadStatus::Pending | UploadStatus::Loading => {}
            }
        }
        summary
    }
}
