//! Upload coordination
//!
//! [`UploadCoordinator`] owns the lifecycle of the selected video:
//! selection, local metadata extraction, transmission and hand-off of the
//! backend's answer to the [`AnalysisDistributor`].
//!
//! Selecting a new file supersedes the current session at once. An upload
//! still in flight for the old session is not aborted; its response is
//! recognised by session id and dropped. Previews are acquired on the
//! blocking pool and attached only if their session is still current.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use crate::backend::{cheating_detected, DetectionBackend, VideoUpload};
use crate::distributor::{AnalysisDistributor, IngestOutcome};
use crate::error::{Error, Result};
use crate::media::{MediaProbe, PreviewHandle, PreviewSource};
use crate::store::SessionStore;
use crate::types::{SessionId, UploadStatus, VideoSession};

pub const NO_FILE_SELECTED: &str = "Please select a video file.";
pub const UPLOADING: &str = "Uploading...";
pub const CHEATING_DETECTED: &str = "Cheating Detected!";
pub const NO_CHEATING_DETECTED: &str = "No Cheating Detected.";
pub const UPLOAD_FAILED: &str = "Upload failed. Please try again.";

/// Result of an upload that reached the backend and got an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Verdict shown for the current session
    Completed {
        session: SessionId,
        cheating_detected: bool,
        analysis: IngestOutcome,
    },
    /// A newer file was selected while the request was outstanding
    Superseded { session: SessionId },
}

/// The selected file and the resources bound to its lifetime.
struct ActiveVideo {
    id: SessionId,
    path: PathBuf,
    file_name: String,
    preview: Option<PreviewHandle>,
    probe_task: Option<JoinHandle<()>>,
    preview_task: Option<JoinHandle<()>>,
}

impl Drop for ActiveVideo {
    fn drop(&mut self) {
        for task in [self.probe_task.take(), self.preview_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

type ActiveSlot = Mutex<Option<ActiveVideo>>;

/// Coordinates selection and upload of one video at a time.
pub struct UploadCoordinator {
    store: SessionStore,
    distributor: AnalysisDistributor,
    backend: Arc<dyn DetectionBackend>,
    probe: Arc<dyn MediaProbe>,
    previews: Option<Arc<dyn PreviewSource>>,
    active: Arc<ActiveSlot>,
    in_flight: AtomicBool,
}

impl UploadCoordinator {
    pub fn new(
        store: SessionStore,
        backend: Arc<dyn DetectionBackend>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            distributor: AnalysisDistributor::new(store.clone()),
            store,
            backend,
            probe,
            previews: None,
            active: Arc::new(Mutex::new(None)),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Acquire a preview for every selected file from `source`.
    pub fn with_previews(mut self, source: Arc<dyn PreviewSource>) -> Self {
        self.previews = Some(source);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Path of the selected file, if any
    pub fn selected_path(&self) -> Option<PathBuf> {
        self.lock_active().as_ref().map(|a| a.path.clone())
    }

    /// Location of the current preview resource, once it has been produced
    pub fn preview_location(&self) -> Option<PathBuf> {
        self.lock_active()
            .as_ref()
            .and_then(|a| a.preview.as_ref())
            .map(|p| p.location().to_path_buf())
    }

    /// Make `path` the current video, superseding the previous one.
    ///
    /// The new session is visible in the store (with its analysis cleared)
    /// before this returns. Duration and preview are produced in the
    /// background when called inside a tokio runtime.
    pub fn select_file(&self, path: impl AsRef<Path>) -> Result<SessionId> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let video = VideoSession::new(file_name.clone(), metadata.len());
        let id = video.id;

        let runtime = tokio::runtime::Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("No async runtime, skipping duration probe");
        }

        // Without a runtime the preview is made here, before the lock is taken
        let preview = match (&runtime, &self.previews) {
            (None, Some(source)) => acquire_preview(source.as_ref(), id, path),
            _ => None,
        };

        let previous = {
            let mut active = self.lock_active();
            let previous = active.take();

            self.distributor.begin(video);
            let (probe_task, preview_task) = match &runtime {
                Some(runtime) => (
                    Some(self.spawn_probe(runtime, id, path.to_path_buf())),
                    self.spawn_preview(runtime, id, path.to_path_buf()),
                ),
                None => (None, None),
            };

            *active = Some(ActiveVideo {
                id,
                path: path.to_path_buf(),
                file_name,
                preview,
                probe_task,
                preview_task,
            });
            previous
        };

        // Dropping the old session releases its preview and stops its tasks
        if let Some(previous) = previous {
            tracing::debug!(previous = %previous.id, next = %id, "Superseding video session");
        }

        tracing::info!(session = %id, path = %path.display(), size_bytes = metadata.len(), "Video selected");
        Ok(id)
    }

    /// Send the selected video to the backend and publish its answer.
    ///
    /// Every failure is already reflected in the store's status message when
    /// this returns; the busy flag is cleared on every path.
    pub async fn upload(&self) -> Result<UploadOutcome> {
        let (id, path, file_name) = match self.lock_active().as_ref() {
            Some(active) => (active.id, active.path.clone(), active.file_name.clone()),
            None => {
                tracing::warn!("Upload requested with no file selected");
                self.store.set_status_message(NO_FILE_SELECTED);
                return Err(Error::NoFileSelected);
            }
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(session = %id, "Upload rejected, another upload is in progress");
            return Err(Error::UploadAlreadyInProgress);
        }
        let _busy = BusyGuard::engage(self);

        self.store.update_current(id, |state| {
            state.status_message = UPLOADING.to_string();
            if let Some(video) = state.video.as_mut() {
                video.status = UploadStatus::Uploading;
            }
        });

        tracing::info!(session = %id, file = %file_name, "Uploading video");

        let result = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                self.backend
                    .upload_video(VideoUpload { file_name, bytes })
                    .await
            }
            Err(e) => Err(Error::Io(e)),
        };

        let payload = result.and_then(|payload| {
            let verdict = cheating_detected(&payload)?;
            Ok((payload, verdict))
        });

        match payload {
            Ok((payload, verdict)) => {
                let shown = self.store.update_current(id, |state| {
                    state.status_message = if verdict {
                        CHEATING_DETECTED
                    } else {
                        NO_CHEATING_DETECTED
                    }
                    .to_string();
                    if let Some(video) = state.video.as_mut() {
                        video.status = UploadStatus::Succeeded;
                    }
                });
                if !shown {
                    tracing::info!(session = %id, "Discarding upload response for superseded session");
                    return Ok(UploadOutcome::Superseded { session: id });
                }

                tracing::info!(session = %id, cheating_detected = verdict, "Upload completed");
                let analysis = self.distributor.ingest(id, &payload);
                Ok(UploadOutcome::Completed {
                    session: id,
                    cheating_detected: verdict,
                    analysis,
                })
            }
            Err(e) => {
                tracing::error!(session = %id, error = %e, "Upload failed");
                let message = failure_message(&e);
                self.store.update_current(id, |state| {
                    state.status_message = message;
                    if let Some(video) = state.video.as_mut() {
                        video.status = UploadStatus::Failed;
                    }
                });
                Err(e)
            }
        }
    }

    fn spawn_probe(
        &self,
        runtime: &tokio::runtime::Handle,
        id: SessionId,
        path: PathBuf,
    ) -> JoinHandle<()> {
        let probe = Arc::clone(&self.probe);
        let store = self.store.clone();
        runtime.spawn(async move {
            match probe.duration_seconds(&path).await {
                Ok(seconds) => {
                    let applied = store.update_current(id, |state| {
                        if let Some(video) = state.video.as_mut() {
                            video.duration_seconds = Some(seconds);
                        }
                    });
                    tracing::debug!(session = %id, seconds, applied, "Duration probed");
                }
                Err(e) => tracing::warn!(session = %id, error = %e, "Duration probe failed"),
            }
        })
    }

    /// Acquire the preview on the blocking pool and attach it to session `id`.
    ///
    /// A handle that arrives after `id` was superseded is dropped, which
    /// releases it. Aborting the task has the same effect once the blocking
    /// acquire returns.
    fn spawn_preview(
        &self,
        runtime: &tokio::runtime::Handle,
        id: SessionId,
        path: PathBuf,
    ) -> Option<JoinHandle<()>> {
        let source = Arc::clone(self.previews.as_ref()?);
        let slot = Arc::downgrade(&self.active);
        Some(runtime.spawn(async move {
            let acquired =
                tokio::task::spawn_blocking(move || acquire_preview(source.as_ref(), id, &path))
                    .await;
            match acquired {
                Ok(Some(handle)) => attach_preview(&slot, id, handle),
                Ok(None) => {}
                Err(e) => tracing::warn!(session = %id, error = %e, "Preview task failed"),
            }
        }))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveVideo>> {
        lock_slot(&self.active)
    }
}

fn lock_slot(slot: &ActiveSlot) -> MutexGuard<'_, Option<ActiveVideo>> {
    // A panic while holding the lock leaves the data consistent
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn acquire_preview(source: &dyn PreviewSource, id: SessionId, path: &Path) -> Option<PreviewHandle> {
    source
        .acquire(path)
        .map_err(|e| tracing::warn!(session = %id, error = %e, "No preview for {}", path.display()))
        .ok()
}

fn attach_preview(slot: &Weak<ActiveSlot>, id: SessionId, handle: PreviewHandle) {
    let stale = match slot.upgrade() {
        Some(slot) => {
            let mut active = lock_slot(&slot);
            match active.as_mut() {
                Some(video) if video.id == id => {
                    video.preview = Some(handle);
                    None
                }
                _ => Some(handle),
            }
        }
        None => Some(handle),
    };

    if let Some(handle) = stale {
        tracing::debug!(session = %id, "Releasing preview for superseded session");
        drop(handle);
    } else {
        tracing::debug!(session = %id, "Preview attached");
    }
}

/// Holds the busy flag for the duration of one upload.
struct BusyGuard<'a> {
    coordinator: &'a UploadCoordinator,
}

impl<'a> BusyGuard<'a> {
    fn engage(coordinator: &'a UploadCoordinator) -> Self {
        coordinator.store.set_busy(true);
        Self { coordinator }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.store.set_busy(false);
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}

fn failure_message(error: &Error) -> String {
    match error.backend_message() {
        Some(reason) if !reason.is_empty() => format!("Upload failed: {}", reason),
        _ => UPLOAD_FAILED.to_string(),
    }
}
