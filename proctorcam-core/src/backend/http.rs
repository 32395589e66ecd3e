//! HTTP client for the detection backend
//!
//! Implements `POST /upload` (multipart, field `video`) and
//! `POST /api/chat` (JSON `{message}`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::{Error, Result};

use super::{ChatBackend, ChatReply, DetectionBackend, VideoUpload};

/// HTTP client for the detection backend
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    upload_timeout: Duration,
    chat_timeout: Duration,
}

impl HttpBackend {
    /// Create a new backend client from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_timeout: config.upload_timeout(),
            chat_timeout: config.chat_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the backend answers on `GET /`
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/", self.base_url);

        match self
            .http_client
            .get(&url)
            .timeout(self.chat_timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Value> {
        let (status, body) = read_text(response).await?;
        classify_response(status, &body)
    }
}

#[async_trait]
impl DetectionBackend for HttpBackend {
    async fn upload_video(&self, upload: VideoUpload) -> Result<Value> {
        let url = format!("{}/upload", self.base_url);
        let size = upload.bytes.len();
        let mime = guess_mime(&upload.file_name);

        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(mime)
            .map_err(|e| Error::Transport(format!("invalid content type {}: {}", mime, e)))?;
        let form = Form::new().part("video", part);

        tracing::debug!(url = %url, file = %upload.file_name, bytes = size, "Sending upload request");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| describe_send_error(e, self.upload_timeout))?;

        self.read_body(response).await
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, message: &str) -> Result<ChatReply> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&ChatRequest { message })
            .timeout(self.chat_timeout)
            .send()
            .await
            .map_err(|e| describe_send_error(e, self.chat_timeout))?;

        let (status, body) = read_text(response).await?;
        parse_chat_reply(status, &body)
    }
}

async fn read_text(response: reqwest::Response) -> Result<(u16, String)> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;
    Ok((status, body))
}

/// Request body for POST /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Turn a status code and raw body into the decoded payload or an error.
///
/// Non-success bodies are searched for an `error` field, which is kept
/// verbatim for display.
fn classify_response(status: u16, body: &str) -> Result<Value> {
    if (200..300).contains(&status) {
        return serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("failed to parse response: {}", e)));
    }

    Err(backend_error(status, body))
}

/// Decode a chat reply. A success body that is not a reply object is an
/// empty reply rather than an error.
fn parse_chat_reply(status: u16, body: &str) -> Result<ChatReply> {
    if !(200..300).contains(&status) {
        return Err(backend_error(status, body));
    }

    match serde_json::from_str::<ChatReply>(body) {
        Ok(reply) => Ok(reply),
        Err(e) => {
            tracing::debug!(error = %e, "Chat reply is not an object, treating as empty");
            Ok(ChatReply::default())
        }
    }
}

fn backend_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));
    Error::Backend { status, message }
}

fn describe_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Transport(format!("request timed out after {}s", timeout.as_secs()))
    } else if err.is_connect() {
        Error::Transport(format!("could not connect to backend: {}", err))
    } else {
        Error::Transport(format!("HTTP request failed: {}", err))
    }
}

fn guess_mime(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
