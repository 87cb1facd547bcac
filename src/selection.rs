//! Selected-album context.
//!
//! Album selection is the only thing that drives photo fetching. Selecting
//! a different album clears the photo collection at once, and a fetch whose
//! selection has since been replaced is discarded when it lands instead of
//! overwriting the newer album's state; the same holds for a refresh that
//! is overtaken by a newer request for the same album. Errors are reported
//! on an event channel; navigation after an authorization failure is left
//! to the presentation layer, which can use [`schedule_redirect`] to apply
//! the delayed-redirect policy.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::PhotoFetchError;
use crate::gallery::YEAR_FILTERED_ALBUMS;
use crate::model::Photo;
use crate::remote::PhotoSource;
use crate::snapshot::SnapshotCache;
use crate::upload::PhotoNames;

const EVENT_CAPACITY: usize = 32;

/// The album currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumSelection {
    pub album_id: String,
    pub year: String,
}

impl AlbumSelection {
    pub fn new(album_id: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            album_id: album_id.into(),
            year: year.into(),
        }
    }
}

/// Where to send the user after an authorization failure, and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub path: String,
    pub delay: Duration,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            delay: Duration::from_secs(3),
        }
    }
}

/// Navigation collaborator
pub trait Navigator: Send + Sync {
    fn navigate_to(&self, path: &str);
}

/// Reported outcome of a photo fetch that was applied to the context
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    PhotosLoaded {
        selection: AlbumSelection,
        count: usize,
    },
    FetchFailed {
        selection: AlbumSelection,
        error: PhotoFetchError,
    },
    /// The year-filtered album snapshots have been dropped; the
    /// presentation layer should follow `redirect`
    AuthorizationFailed {
        selection: AlbumSelection,
        redirect: RedirectPolicy,
    },
}

/// What happened to a fetch result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// The selection moved on, or a newer fetch already landed
    Discarded,
    /// The requested album was already selected
    Unchanged,
}

#[derive(Default)]
struct State {
    selection: Option<AlbumSelection>,
    generation: u64,
    next_request: u64,
    applied_request: u64,
    photos: Vec<Photo>,
}

impl State {
    fn start_request(&mut self) -> Request {
        self.next_request += 1;
        Request {
            generation: self.generation,
            id: self.next_request,
        }
    }
}

/// Identifies one photo fetch: the selection it was issued under and its
/// place among all fetches
#[derive(Debug, Clone, Copy)]
struct Request {
    generation: u64,
    id: u64,
}

pub struct SelectedAlbumContext {
    source: Arc<dyn PhotoSource>,
    cache: SnapshotCache,
    redirect: RedirectPolicy,
    state: Mutex<State>,
    events: broadcast::Sender<ContextEvent>,
}

impl SelectedAlbumContext {
    /// `cache` is where the year-filtered album lists live; they are
    /// dropped when the photo source refuses access
    pub fn new(
        source: Arc<dyn PhotoSource>,
        cache: SnapshotCache,
        redirect: RedirectPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            cache,
            redirect,
            state: Mutex::new(State::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    pub fn selection(&self) -> Option<AlbumSelection> {
        self.state().selection.clone()
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.state().photos.clone()
    }

    /// Names of the selected album's photos, for upload existence checks
    pub fn photo_names(&self) -> PhotoNames {
        PhotoNames::from_photos(&self.state().photos)
    }

    /// Switches to another album and loads its photos.
    ///
    /// The previous album's photos are cleared before the fetch starts.
    pub async fn select(
        &self,
        album_id: &str,
        year: &str,
    ) -> Result<FetchOutcome, PhotoFetchError> {
        let selection = AlbumSelection::new(album_id, year);

        let request = {
            let mut state = self.state();
            if state.selection.as_ref() == Some(&selection) {
                return Ok(FetchOutcome::Unchanged);
            }
            state.selection = Some(selection.clone());
            state.generation += 1;
            state.photos.clear();
            state.start_request()
        };

        info!("Selected album {} ({})", selection.album_id, selection.year);
        self.fetch(selection, request).await
    }

    /// Re-fetches the selected album's photos, keeping the current ones
    /// on display until the new list arrives
    pub async fn refresh(&self) -> Result<FetchOutcome, PhotoFetchError> {
        let (selection, request) = {
            let mut state = self.state();
            match state.selection.clone() {
                Some(selection) => (selection, state.start_request()),
                None => return Ok(FetchOutcome::Unchanged),
            }
        };

        debug!("Refreshing photos for {}", selection.album_id);
        self.fetch(selection, request).await
    }

    async fn fetch(
        &self,
        selection: AlbumSelection,
        request: Request,
    ) -> Result<FetchOutcome, PhotoFetchError> {
        let result = self
            .source
            .fetch_photos(&selection.album_id, &selection.year)
            .await;

        let mut state = self.state();
        if state.generation != request.generation {
            debug!(
                "Discarding late photo result for {}, selection has moved on",
                selection.album_id
            );
            return Ok(FetchOutcome::Discarded);
        }
        if request.id < state.applied_request {
            debug!(
                "Discarding photo result #{} for {}, #{} already landed",
                request.id, selection.album_id, state.applied_request
            );
            return Ok(FetchOutcome::Discarded);
        }
        state.applied_request = request.id;

        match result {
            Ok(photos) => {
                let count = photos.len();
                state.photos = photos;
                drop(state);
                self.report(ContextEvent::PhotosLoaded { selection, count });
                Ok(FetchOutcome::Applied)
            }
            Err(error) if error.is_unauthorized() => {
                warn!("Not authorized to view album {}", selection.album_id);
                drop(state);
                match self.cache.remove_group(YEAR_FILTERED_ALBUMS) {
                    Ok(dropped) => debug!("Dropped {dropped} year-filtered album lists"),
                    Err(e) => warn!("Failed to drop year-filtered album lists: {e:#}"),
                }
                self.report(ContextEvent::AuthorizationFailed {
                    selection,
                    redirect: self.redirect.clone(),
                });
                Err(error)
            }
            Err(error) => {
                warn!("Failed to fetch photos for {}: {error}", selection.album_id);
                drop(state);
                self.report(ContextEvent::FetchFailed {
                    selection,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn report(&self, event: ContextEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Navigates to `policy.path` once `policy.delay` has elapsed
pub fn schedule_redirect(navigator: Arc<dyn Navigator>, policy: RedirectPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(policy.delay).await;
        info!("Redirecting to {}", policy.path);
        navigator.navigate_to(&policy.path);
    })
}
