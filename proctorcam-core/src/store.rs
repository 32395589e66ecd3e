//! Session store: the single source of truth for display surfaces.
//!
//! The store is a `tokio::sync::watch` channel over [`SessionState`]. Writers
//! go through the mutators below; every display surface holds a
//! [`SessionView`] and re-renders when it reports a change. Writes are short
//! and never span an `.await`, so readers never observe a torn state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{AnalysisResult, SessionId, VideoSession};

/// Everything the display surfaces render from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Latest human-readable status, overwritten on every change
    pub status_message: String,
    /// True while an upload is outstanding
    pub busy: bool,
    pub video: Option<VideoSession>,
    pub analysis: Option<AnalysisResult>,
}

impl SessionState {
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.video.as_ref().map(|v| v.id)
    }
}

/// Shared handle to the session state. Cloning shares the same store.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

/// Read-only view of the store handed to display surfaces.
pub type SessionView = watch::Receiver<SessionState>;

impl SessionStore {
    /// Create a store in its initial state:
    /// `{status: "", busy: false, video: None, analysis: None}`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe a display surface to state changes.
    pub fn subscribe(&self) -> SessionView {
        self.tx.subscribe()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.tx.borrow().current_session_id()
    }

    pub fn is_busy(&self) -> bool {
        self.tx.borrow().busy
    }

    pub fn set_status_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|state| state.status_message = message);
    }

    pub fn set_busy(&self, busy: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.busy != busy;
            state.busy = busy;
            changed
        });
    }

    pub fn set_video_session(&self, video: Option<VideoSession>) {
        self.tx.send_modify(|state| state.video = video);
    }

    pub fn set_analysis_result(&self, analysis: Option<AnalysisResult>) {
        self.tx.send_modify(|state| state.analysis = analysis);
    }

    /// Replace the current session in a single write.
    ///
    /// The previous analysis and status message are cleared together with the
    /// swap, so no reader sees the new session next to the old analysis.
    pub fn begin_session(&self, video: VideoSession) {
        self.tx.send_modify(|state| {
            state.video = Some(video);
            state.analysis = None;
            state.status_message.clear();
        });
    }

    /// Apply `f` only if `id` is still the current session.
    ///
    /// The identity check and the write happen under the same lock. Returns
    /// false (and notifies nobody) when the session has been superseded.
    pub fn update_current(&self, id: SessionId, f: impl FnOnce(&mut SessionState)) -> bool {
        self.tx.send_if_modified(|state| {
            if state.current_session_id() != Some(id) {
                return false;
            }
            f(state);
            true
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
