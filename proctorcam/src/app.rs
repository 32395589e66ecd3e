//! Application state for the TUI.

use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use proctorcam_core::{
    ChatSession, ChatState, ChatView, Services, SessionState, SessionView, UploadCoordinator,
};
use tokio::runtime::Handle;

/// Top-level tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveTab {
    /// Selected video, upload status and verdict (default)
    #[default]
    Upload,
    /// Statistics cards and raw counts
    Analysis,
    /// Conversation with the backend bot
    Chat,
}

impl ActiveTab {
    /// Tab cycles: Upload -> Analysis -> Chat -> Upload
    pub fn next(self) -> Self {
        match self {
            ActiveTab::Upload => ActiveTab::Analysis,
            ActiveTab::Analysis => ActiveTab::Chat,
            ActiveTab::Chat => ActiveTab::Upload,
        }
    }
}

/// Where typed characters go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Keys are commands
    #[default]
    Normal,
    /// Typing a video path to open
    Path,
    /// Typing a chat message
    Chat,
}

/// Main application state.
pub struct App {
    uploads: Arc<UploadCoordinator>,
    chat: Arc<ChatSession>,
    runtime: Handle,
    session_view: SessionView,
    chat_view: ChatView,
    /// Latest session store state
    pub session: SessionState,
    /// Latest chat state
    pub conversation: ChatState,
    pub active_tab: ActiveTab,
    pub input_mode: InputMode,
    /// Path being typed in [`InputMode::Path`]
    pub path_input: String,
    /// One-line notice shown in the footer (e.g. a file that could not be opened)
    pub notice: Option<String>,
    /// Backend base URL, shown in the header
    pub backend_url: String,
    /// Full path of the selected video
    pub selected_path: Option<PathBuf>,
    /// Preview frame written for the selected video
    pub preview_path: Option<PathBuf>,
    /// Chat lines scrolled up from the bottom
    pub chat_scroll: u16,
    /// Animation frame counter (spinner, typing dots)
    pub animation_frame: u64,
    /// Whether the app should quit
    pub should_quit: bool,
}

impl App {
    /// Create a new app instance over the core services.
    pub fn new(services: Services, runtime: Handle) -> Self {
        let backend_url = services.backend.base_url().to_string();
        Self::with_parts(services.uploads, services.chat, backend_url, runtime)
    }

    fn with_parts(
        uploads: Arc<UploadCoordinator>,
        chat: Arc<ChatSession>,
        backend_url: String,
        runtime: Handle,
    ) -> Self {
        let mut session_view = uploads.store().subscribe();
        let mut chat_view = chat.subscribe();
        let session = session_view.borrow_and_update().clone();
        let conversation = chat_view.borrow_and_update().clone();

        Self {
            uploads,
            chat,
            runtime,
            session_view,
            chat_view,
            session,
            conversation,
            active_tab: ActiveTab::default(),
            input_mode: InputMode::default(),
            path_input: String::new(),
            notice: None,
            backend_url,
            selected_path: None,
            preview_path: None,
            chat_scroll: 0,
            animation_frame: 0,
            should_quit: false,
        }
    }

    /// Copy in any store or chat changes since the last frame.
    pub fn refresh(&mut self) {
        if self.session_view.has_changed().unwrap_or(false) {
            self.session = self.session_view.borrow_and_update().clone();
            self.selected_path = self.uploads.selected_path();
        }
        // Previews attach after selection without a store change
        self.preview_path = self.uploads.preview_location();
        if self.chat_view.has_changed().unwrap_or(false) {
            self.conversation = self.chat_view.borrow_and_update().clone();
        }
    }

    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Path => self.handle_path_key(key),
            InputMode::Chat => self.handle_chat_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.active_tab = self.active_tab.next();
            }
            KeyCode::Char('o') => {
                self.notice = None;
                self.path_input.clear();
                self.active_tab = ActiveTab::Upload;
                self.input_mode = InputMode::Path;
            }
            KeyCode::Char('u') => {
                self.start_upload();
            }
            KeyCode::Char('c') if self.active_tab == ActiveTab::Chat => {
                self.chat.clear();
                self.chat_scroll = 0;
            }
            KeyCode::Char('i') | KeyCode::Enter if self.active_tab == ActiveTab::Chat => {
                self.input_mode = InputMode::Chat;
            }
            KeyCode::Up | KeyCode::Char('k') if self.active_tab == ActiveTab::Chat => {
                self.chat_scroll = self.chat_scroll.saturating_add(1);
            }
            KeyCode::Down | KeyCode::Char('j') if self.active_tab == ActiveTab::Chat => {
                self.chat_scroll = self.chat_scroll.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn handle_path_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.open_path();
            }
            KeyCode::Backspace => {
                self.path_input.pop();
            }
            KeyCode::Char(c) => {
                self.path_input.push(c);
            }
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Enter => {
                self.chat_scroll = 0;
                let chat = Arc::clone(&self.chat);
                self.runtime.spawn(async move {
                    chat.submit().await;
                });
            }
            KeyCode::Backspace => {
                let mut text = self.chat.input();
                text.pop();
                self.chat.set_input(text);
            }
            KeyCode::Char(c) => {
                let mut text = self.chat.input();
                text.push(c);
                self.chat.set_input(text);
            }
            _ => {}
        }
    }

    /// Select the typed path as the current video.
    fn open_path(&mut self) {
        let path = self.path_input.trim().to_string();
        if path.is_empty() {
            return;
        }

        match self.uploads.select_file(&path) {
            Ok(_) => {
                self.notice = None;
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Could not open video");
                self.notice = Some(format!("Could not open {}: {}", path, e));
            }
        }
    }

    /// Upload the selected video in the background.
    ///
    /// Ignored while an upload is running; outcomes land in the store.
    fn start_upload(&mut self) {
        if self.session.busy {
            self.notice = Some("Upload already in progress".to_string());
            return;
        }
        self.notice = None;

        let uploads = Arc::clone(&self.uploads);
        self.runtime.spawn(async move {
            if let Err(e) = uploads.upload().await {
                tracing::debug!(error = %e, "Upload did not complete");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proctorcam_core::backend::{ChatBackend, ChatReply, DetectionBackend, VideoUpload};
    use proctorcam_core::media::MediaProbe;
    use proctorcam_core::upload::NO_FILE_SELECTED;
    use proctorcam_core::{ChatOrdering, Error, SessionStore};
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeBackend {
        uploads: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl DetectionBackend for FakeBackend {
        async fn upload_video(&self, _upload: VideoUpload) -> proctorcam_core::Result<Value> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(json!({"cheating_detected": false}))
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn chat(&self, message: &str) -> proctorcam_core::Result<ChatReply> {
            Ok(ChatReply {
                response: Some(format!("echo: {}", message)),
                message: None,
                tag: None,
            })
        }
    }

    struct NoProbe;

    #[async_trait]
    impl MediaProbe for NoProbe {
        async fn duration_seconds(&self, _path: &std::path::Path) -> proctorcam_core::Result<f64> {
            Err(Error::Probe("unavailable".to_string()))
        }
    }

    fn test_app() -> (App, Arc<FakeBackend>, SessionStore) {
        let backend = Arc::new(FakeBackend::default());
        let store = SessionStore::new();
        let uploads = Arc::new(UploadCoordinator::new(
            store.clone(),
            backend.clone(),
            Arc::new(NoProbe),
        ));
        let chat = Arc::new(ChatSession::new(backend.clone(), ChatOrdering::Completion));
        let app = App::with_parts(
            uploads,
            chat,
            "http://127.0.0.1:5000".to_string(),
            Handle::current(),
        );
        (app, backend, store)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[tokio::test]
    async fn test_tab_cycles_views() {
        let (mut app, _, _) = test_app();
        assert_eq!(app.active_tab, ActiveTab::Upload);

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.active_tab, ActiveTab::Analysis);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.active_tab, ActiveTab::Chat);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.active_tab, ActiveTab::Upload);
    }

    #[tokio::test]
    async fn test_open_path_selects_video() {
        let (mut app, _, _) = test_app();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exam.mp4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        press(&mut app, KeyCode::Char('o'));
        assert_eq!(app.input_mode, InputMode::Path);
        type_text(&mut app, &path.display().to_string());
        press(&mut app, KeyCode::Enter);
        app.refresh();

        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.notice.is_none());
        assert_eq!(app.session.video.as_ref().unwrap().name, "exam.mp4");
        assert_eq!(app.selected_path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_open_missing_path_shows_notice() {
        let (mut app, _, _) = test_app();

        press(&mut app, KeyCode::Char('o'));
        type_text(&mut app, "/nonexistent/exam.mp4");
        press(&mut app, KeyCode::Enter);
        app.refresh();

        assert!(app.session.video.is_none());
        assert!(app
            .notice
            .as_deref()
            .unwrap()
            .starts_with("Could not open /nonexistent/exam.mp4"));
    }

    #[tokio::test]
    async fn test_upload_without_file_sets_status() {
        let (mut app, backend, store) = test_app();
        let mut view = store.subscribe();

        press(&mut app, KeyCode::Char('u'));
        view.wait_for(|s| s.status_message == NO_FILE_SELECTED)
            .await
            .unwrap();

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_key_ignored_while_busy() {
        let (mut app, backend, store) = test_app();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exam.mp4");
        std::fs::write(&path, b"video").unwrap();
        app.uploads.select_file(&path).unwrap();

        let mut view = store.subscribe();
        press(&mut app, KeyCode::Char('u'));
        view.wait_for(|s| s.busy).await.unwrap();
        app.refresh();

        press(&mut app, KeyCode::Char('u'));
        assert_eq!(app.notice.as_deref(), Some("Upload already in progress"));

        backend.gate.notify_one();
        view.wait_for(|s| !s.busy).await.unwrap();
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chat_input_sends_message() {
        let (mut app, _, _) = test_app();
        let mut view = app.chat.subscribe();

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.input_mode, InputMode::Chat);

        // Command keys are plain text while typing
        type_text(&mut app, "quit");
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.chat.input(), "qui");

        press(&mut app, KeyCode::Enter);
        view.wait_for(|s| s.messages.len() == 2).await.unwrap();
        app.refresh();

        assert_eq!(app.conversation.messages[0].content, "qui");
        assert_eq!(app.conversation.messages[1].content, "echo: qui");
        assert!(app.conversation.input.is_empty());
    }

    #[tokio::test]
    async fn test_clear_chat_key_leaves_session() {
        let (mut app, _, store) = test_app();
        store.set_status_message("No Cheating Detected.");
        app.chat.send("hello").await;

        app.active_tab = ActiveTab::Chat;
        press(&mut app, KeyCode::Char('c'));
        app.refresh();

        assert!(app.conversation.messages.is_empty());
        assert_eq!(app.session.status_message, "No Cheating Detected.");
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let (mut app, _, _) = test_app();
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);

        let (mut app, _, _) = test_app();
        app.input_mode = InputMode::Chat;
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
