//! Chat session
//!
//! Owns the conversation with the backend bot. The message log is local:
//! it is never persisted and never shares state with the session store.
//!
//! Each `send` runs one turn: `Idle → Sending → AwaitingResponse → Idle`.
//! [`ChatState::bot_typing`] is true while any turn is unresolved.
//!
//! With [`ChatOrdering::Completion`] turns overlap freely and bot replies are
//! appended as they complete. With [`ChatOrdering::Serialized`] turns queue
//! behind each other and replies land in send order.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::{watch, Mutex as TurnLock};

use crate::backend::ChatBackend;
use crate::config::ChatOrdering;
use crate::error::Error;
use crate::types::{ChatMessage, ChatRole};

/// Bot text used when a failure carries no description
pub const REQUEST_FAILED: &str = "Request failed";

/// Where the conversation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    /// User message appended, request not yet dispatched
    Sending,
    /// Request dispatched, waiting for the bot
    AwaitingResponse,
}

/// Chat log and turn bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    /// Pending text in the input box
    pub input: String,
    sending: usize,
    awaiting: usize,
    /// Bumped by `clear()`; turns started under an older epoch are stale
    epoch: u64,
    next_seq: u64,
}

impl ChatState {
    /// True while the typing indicator should be shown
    pub fn bot_typing(&self) -> bool {
        self.sending + self.awaiting > 0
    }

    pub fn phase(&self) -> TurnPhase {
        if self.awaiting > 0 {
            TurnPhase::AwaitingResponse
        } else if self.sending > 0 {
            TurnPhase::Sending
        } else {
            TurnPhase::Idle
        }
    }

    fn push(&mut self, role: ChatRole, content: String, tag: Option<String>) -> ChatMessage {
        self.next_seq += 1;
        let now = Local::now();
        let message = ChatMessage {
            id: format!("{}-{}", now.timestamp_millis(), self.next_seq),
            role,
            content,
            tag,
            timestamp: now.format("%H:%M:%S").to_string(),
        };
        self.messages.push(message.clone());
        message
    }
}

/// Read-only view of the chat handed to display surfaces.
pub type ChatView = watch::Receiver<ChatState>;

/// One conversation with the backend bot.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    ordering: ChatOrdering,
    state: watch::Sender<ChatState>,
    turn_lock: TurnLock<()>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, ordering: ChatOrdering) -> Self {
        let (state, _rx) = watch::channel(ChatState::default());
        Self {
            backend,
            ordering,
            state,
            turn_lock: TurnLock::new(()),
        }
    }

    pub fn subscribe(&self) -> ChatView {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn bot_typing(&self) -> bool {
        self.state.borrow().bot_typing()
    }

    pub fn input(&self) -> String {
        self.state.borrow().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Send whatever is in the input buffer.
    pub async fn submit(&self) -> Option<ChatMessage> {
        let text = self.input();
        self.send(&text).await
    }

    /// Run one turn and return the bot message it appended.
    ///
    /// Blank text is ignored. Returns `None` when nothing was appended for
    /// the bot: blank input, or the chat was cleared while the turn waited
    /// or ran. A turn cleared while queued never reaches the backend.
    pub async fn send(&self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            return None;
        }

        let mut turn = Turn::start(self, text);

        let _order = match self.ordering {
            ChatOrdering::Serialized => Some(self.turn_lock.lock().await),
            ChatOrdering::Completion => None,
        };

        // A clear while queued behind the lock retires the turn unsent
        if turn.is_stale() {
            tracing::debug!(epoch = turn.epoch, "Dropping queued turn for cleared chat");
            return None;
        }

        turn.dispatch();
        tracing::debug!(epoch = turn.epoch, "Sending chat message");

        let (content, tag) = match self.backend.chat(text).await {
            Ok(reply) => (reply.content().to_string(), reply.tag),
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed");
                (failure_content(&e), None)
            }
        };

        turn.finish(content, tag)
    }

    /// Discard the whole conversation.
    ///
    /// Replies to turns started before the clear are dropped when they arrive.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.messages.clear();
            state.sending = 0;
            state.awaiting = 0;
            state.epoch += 1;
        });
        tracing::debug!("Chat cleared");
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Queued,
    Dispatched,
    Done,
}

/// Bookkeeping for one in-progress turn.
///
/// Dropping an unfinished turn (e.g. a cancelled future) still settles the
/// typing counters.
struct Turn<'a> {
    session: &'a ChatSession,
    epoch: u64,
    stage: Stage,
}

impl<'a> Turn<'a> {
    fn start(session: &'a ChatSession, text: &str) -> Self {
        let mut epoch = 0;
        session.state.send_modify(|state| {
            state.push(ChatRole::User, text.to_string(), None);
            state.input.clear();
            state.sending += 1;
            epoch = state.epoch;
        });
        Self {
            session,
            epoch,
            stage: Stage::Queued,
        }
    }

    fn is_stale(&self) -> bool {
        self.session.state.borrow().epoch != self.epoch
    }

    fn dispatch(&mut self) {
        let epoch = self.epoch;
        self.session.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.sending -= 1;
            state.awaiting += 1;
            true
        });
        self.stage = Stage::Dispatched;
    }

    fn finish(mut self, content: String, tag: Option<String>) -> Option<ChatMessage> {
        let epoch = self.epoch;
        let mut appended = None;
        self.session.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.awaiting -= 1;
            appended = Some(state.push(ChatRole::Bot, content, tag));
            true
        });
        self.stage = Stage::Done;
        if appended.is_none() {
            tracing::debug!(epoch, "Dropping reply for cleared chat");
        }
        appended
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let epoch = self.epoch;
        let stage = self.stage;
        if stage == Stage::Done {
            return;
        }
        self.session.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            match stage {
                Stage::Queued => state.sending -= 1,
                Stage::Dispatched => state.awaiting -= 1,
                Stage::Done => {}
            }
            true
        });
    }
}

/// Bot text for a failed turn: backend `error`, else the error's own
/// description (the status code for a bare non-success response, the
/// transport failure), else [`REQUEST_FAILED`].
fn failure_content(error: &Error) -> String {
    if let Some(reason) = error.backend_message().filter(|r| !r.is_empty()) {
        return reason.to_string();
    }
    match error {
        Error::Backend { status, .. } => format!("{} with status code {}", REQUEST_FAILED, status),
        Error::Transport(description) if !description.is_empty() => description.clone(),
        _ => REQUEST_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatReply;
    use crate::error::Result;
    use crate::store::SessionStore;
    use crate::types::VideoSession;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Echoes messages unless a canned reply is registered; any message can
    /// be held back behind a gate.
    #[derive(Default)]
    struct FakeChat {
        replies: Mutex<HashMap<String, Result<ChatReply>>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        calls: Mutex<Vec<String>>,
        entered: Notify,
    }

    impl FakeChat {
        fn reply(self, message: &str, reply: Result<ChatReply>) -> Self {
            self.replies.lock().unwrap().insert(message.to_string(), reply);
            self
        }

        fn gate(&self, message: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(message.to_string(), gate.clone());
            gate
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for FakeChat {
        async fn chat(&self, message: &str) -> Result<ChatReply> {
            self.calls.lock().unwrap().push(message.to_string());
            self.entered.notify_one();
            let gate = self.gates.lock().unwrap().get(message).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let canned = self.replies.lock().unwrap().remove(message);
            canned.unwrap_or_else(|| {
                Ok(ChatReply {
                    response: Some(format!("echo: {}", message)),
                    ..Default::default()
                })
            })
        }
    }

    fn session(backend: Arc<FakeChat>, ordering: ChatOrdering) -> Arc<ChatSession> {
        Arc::new(ChatSession::new(backend, ordering))
    }

    fn bot_contents(state: &ChatState) -> Vec<String> {
        state
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Bot)
            .map(|m| m.content.clone())
            .collect()
    }

    async fn wait_for_messages(chat: &ChatSession, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while chat.snapshot().messages.len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_blank_messages_are_ignored() {
        let backend = Arc::new(FakeChat::default());
        let chat = session(backend.clone(), ChatOrdering::Completion);

        assert!(chat.send("").await.is_none());
        assert!(chat.send("   ").await.is_none());

        assert!(chat.snapshot().messages.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_user_message_appended_before_reply() {
        let backend = Arc::new(FakeChat::default());
        let gate = backend.gate("hi");
        let chat = session(backend.clone(), ChatOrdering::Completion);
        chat.set_input("hi");

        let pending = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.submit().await }
        });
        backend.entered.notified().await;

        let state = chat.snapshot();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, ChatRole::User);
        assert_eq!(state.messages[0].content, "hi");
        assert!(state.input.is_empty());
        assert!(state.bot_typing());
        assert_eq!(state.phase(), TurnPhase::AwaitingResponse);

        gate.notify_one();
        let reply = pending.await.unwrap().unwrap();
        assert_eq!(reply.content, "echo: hi");

        let state = chat.snapshot();
        assert_eq!(state.messages.len(), 2);
        assert!(!state.bot_typing());
        assert_eq!(state.phase(), TurnPhase::Idle);
        assert_ne!(state.messages[0].id, state.messages[1].id);
    }

    #[tokio::test]
    async fn test_reply_falls_back_to_message_field_and_keeps_tag() {
        let backend = Arc::new(FakeChat::default().reply(
            "help",
            Ok(ChatReply {
                response: None,
                message: Some("Ask me about your results".to_string()),
                tag: Some("help".to_string()),
            }),
        ));
        let chat = session(backend, ChatOrdering::Completion);

        let reply = chat.send("help").await.unwrap();

        assert_eq!(reply.role, ChatRole::Bot);
        assert_eq!(reply.content, "Ask me about your results");
        assert_eq!(reply.tag.as_deref(), Some("help"));
    }

    #[tokio::test]
    async fn test_empty_reply_reads_no_response() {
        let backend = Arc::new(FakeChat::default().reply("?", Ok(ChatReply::default())));
        let chat = session(backend, ChatOrdering::Completion);

        assert_eq!(chat.send("?").await.unwrap().content, "No response");
    }

    #[tokio::test]
    async fn test_failed_turn_appends_backend_error() {
        let backend = Arc::new(FakeChat::default().reply(
            "hello",
            Err(Error::Backend {
                status: 400,
                message: Some("Message required".to_string()),
            }),
        ));
        let chat = session(backend.clone(), ChatOrdering::Completion);

        chat.send("hello").await;

        let state = chat.snapshot();
        assert_eq!(bot_contents(&state), vec!["Message required".to_string()]);
        assert!(!state.bot_typing());
        // Never retried
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_without_backend_text() {
        let backend = Arc::new(
            FakeChat::default()
                .reply("a", Err(Error::Backend { status: 500, message: None }))
                .reply("b", Err(Error::Transport("could not connect to backend".to_string())))
                .reply("c", Err(Error::MalformedResponse("bad json".to_string()))),
        );
        let chat = session(backend, ChatOrdering::Completion);

        chat.send("a").await;
        chat.send("b").await;
        chat.send("c").await;

        assert_eq!(
            bot_contents(&chat.snapshot()),
            vec![
                "Request failed with status code 500".to_string(),
                "could not connect to backend".to_string(),
                REQUEST_FAILED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_empties_log_and_leaves_store_alone() {
        let store = SessionStore::new();
        store.begin_session(VideoSession::new("exam.mp4", 100));
        store.set_status_message("No Cheating Detected.");
        let before = store.snapshot();

        let chat = session(Arc::new(FakeChat::default()), ChatOrdering::Completion);
        chat.send("one").await;
        chat.send("two").await;
        assert_eq!(chat.snapshot().messages.len(), 4);

        chat.clear();

        assert!(chat.snapshot().messages.is_empty());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_reply_after_clear_is_dropped() {
        let backend = Arc::new(FakeChat::default());
        let gate = backend.gate("slow");
        let chat = session(backend.clone(), ChatOrdering::Completion);

        let pending = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("slow").await }
        });
        backend.entered.notified().await;

        chat.clear();
        assert!(!chat.bot_typing());

        gate.notify_one();
        assert!(pending.await.unwrap().is_none());
        let state = chat.snapshot();
        assert!(state.messages.is_empty());
        assert!(!state.bot_typing());
    }

    #[tokio::test]
    async fn test_completion_order_for_overlapping_sends() {
        let backend = Arc::new(FakeChat::default());
        let first_gate = backend.gate("first");
        let second_gate = backend.gate("second");
        let chat = session(backend.clone(), ChatOrdering::Completion);

        let first = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("first").await }
        });
        backend.entered.notified().await;
        let second = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("second").await }
        });
        backend.entered.notified().await;

        second_gate.notify_one();
        second.await.unwrap();
        assert!(chat.bot_typing());
        first_gate.notify_one();
        first.await.unwrap();

        let state = chat.snapshot();
        let users: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["first", "second"]);
        assert_eq!(
            bot_contents(&state),
            vec!["echo: second".to_string(), "echo: first".to_string()]
        );
        assert!(!state.bot_typing());
    }

    #[tokio::test]
    async fn test_serialized_turns_reply_in_send_order() {
        let backend = Arc::new(FakeChat::default());
        let first_gate = backend.gate("first");
        let chat = session(backend.clone(), ChatOrdering::Serialized);

        let first = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("first").await }
        });
        backend.entered.notified().await;
        let second = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("second").await }
        });
        wait_for_messages(&chat, 2).await;

        // Second turn waits its turn before reaching the backend
        assert_eq!(backend.calls(), vec!["first".to_string()]);

        first_gate.notify_one();
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            backend.calls(),
            vec!["first".to_string(), "second".to_string()]
        );
        assert_eq!(
            bot_contents(&chat.snapshot()),
            vec!["echo: first".to_string(), "echo: second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_serialized_turn_queued_before_clear_is_never_sent() {
        let backend = Arc::new(FakeChat::default());
        let first_gate = backend.gate("first");
        let chat = session(backend.clone(), ChatOrdering::Serialized);

        let first = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("first").await }
        });
        backend.entered.notified().await;
        let second = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("second").await }
        });
        wait_for_messages(&chat, 2).await;

        chat.clear();
        first_gate.notify_one();

        assert!(first.await.unwrap().is_none());
        assert!(second.await.unwrap().is_none());
        assert_eq!(backend.calls(), vec!["first".to_string()]);
        let state = chat.snapshot();
        assert!(state.messages.is_empty());
        assert!(!state.bot_typing());
    }

    #[tokio::test]
    async fn test_cancelled_turn_settles_typing_flag() {
        let backend = Arc::new(FakeChat::default());
        let _gate = backend.gate("stuck");
        let chat = session(backend.clone(), ChatOrdering::Completion);

        let pending = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.send("stuck").await }
        });
        backend.entered.notified().await;
        assert!(chat.bot_typing());

        pending.abort();
        let _ = pending.await;

        assert!(!chat.bot_typing());
        assert_eq!(chat.snapshot().messages.len(), 1);
    }
}
