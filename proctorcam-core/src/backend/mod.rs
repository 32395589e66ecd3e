//! Detection backend interface
//!
//! The coordinators talk to the backend through [`DetectionBackend`] and
//! [`ChatBackend`]; [`HttpBackend`] is the HTTP implementation.

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// A video ready to be sent to `POST /upload`.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Backend that analyzes uploaded videos.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Upload a video and return the decoded 2xx response body.
    ///
    /// Non-success statuses map to [`Error::Backend`], unreachable hosts and
    /// timeouts to [`Error::Transport`], undecodable bodies to
    /// [`Error::MalformedResponse`].
    async fn upload_video(&self, upload: VideoUpload) -> Result<Value>;
}

/// Backend that answers chat messages.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, message: &str) -> Result<ChatReply>;
}

/// Body of a successful `POST /api/chat`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl ChatReply {
    /// Text to show: `response`, then `message`, then `"No response"`.
    ///
    /// Empty strings count as absent.
    pub fn content(&self) -> &str {
        [&self.response, &self.message]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|text| !text.is_empty())
            .unwrap_or("No response")
    }
}

/// Read the verdict of an upload response.
pub fn cheating_detected(payload: &Value) -> Result<bool> {
    payload
        .get("cheating_detected")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            Error::MalformedResponse("upload response has no boolean cheating_detected".to_string())
        })
}
