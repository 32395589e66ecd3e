//! Wiring of the core components from configuration.

use std::sync::Arc;

use crate::backend::HttpBackend;
use crate::chat::ChatSession;
use crate::config::Config;
use crate::error::Result;
use crate::media::{FfprobeProbe, ThumbnailPreview};
use crate::store::SessionStore;
use crate::upload::UploadCoordinator;

/// The session store, upload coordinator and chat session of one client.
///
/// The store is shared by the coordinator and every display surface; the
/// chat session is independent of both.
pub struct Services {
    pub store: SessionStore,
    pub uploads: Arc<UploadCoordinator>,
    pub chat: Arc<ChatSession>,
    pub backend: Arc<HttpBackend>,
}

impl Services {
    /// Build the HTTP backend and media tooling described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.backend)?);
        let store = SessionStore::new();

        let probe = Arc::new(FfprobeProbe::new(config.media.ffprobe_path.clone()));
        let mut uploads = UploadCoordinator::new(store.clone(), backend.clone(), probe);
        if config.media.previews {
            uploads = uploads.with_previews(Arc::new(ThumbnailPreview::new(
                config.media.ffmpeg_path.clone(),
                Config::preview_dir(),
            )));
        }

        let chat = Arc::new(ChatSession::new(backend.clone(), config.chat.ordering));

        tracing::info!(
            backend = %backend.base_url(),
            ordering = ?config.chat.ordering,
            previews = config.media.previews,
            "Services ready"
        );

        Ok(Self {
            store,
            uploads: Arc::new(uploads),
            chat,
            backend,
        })
    }
}
