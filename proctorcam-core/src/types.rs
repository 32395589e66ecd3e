//! Core domain types for proctorcam
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One selected video and its analysis outcome |
//! | **Analysis** | The detection backend's verdict and frame statistics for a session |
//! | **Turn** | One user message followed by one bot reply in the chat |
//! | **Stale response** | A reply for a session or turn that has since been superseded or cleared |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================
// Video Session
// ============================================

/// Identity of a single video selection.
///
/// A fresh id is minted every time a file is selected, so responses can be
/// matched against the session that is current when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload lifecycle of a video session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Selected, not yet sent
    #[default]
    Idle,
    /// Request to the backend is outstanding
    Uploading,
    /// Backend returned a verdict
    Succeeded,
    /// Transport failure or non-success response
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Idle => "idle",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Succeeded => "succeeded",
            UploadStatus::Failed => "failed",
        }
    }
}

/// Metadata of the currently selected video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSession {
    pub id: SessionId,
    /// File name as shown to the user
    pub name: String,
    /// Duration in seconds, `None` until the probe reports it
    pub duration_seconds: Option<f64>,
    /// File size in MB, rounded to 2 decimals
    pub size_mb: f64,
    pub status: UploadStatus,
}

impl VideoSession {
    /// Create a session in `Idle` status with the duration still pending.
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            duration_seconds: None,
            size_mb: size_in_mb(size_bytes),
            status: UploadStatus::Idle,
        }
    }
}

/// Convert a byte count to megabytes rounded to 2 decimals.
pub fn size_in_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}

// ============================================
// Analysis
// ============================================

/// Frame statistics reported by the backend.
///
/// Ratios arrive pre-formatted (e.g. `"87.5%"`) and are displayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    pub processing_ratio: String,
    pub face_detection_rate: String,
    pub lookaway_ratio: String,
    pub processed_frames: u64,
    pub total_frames: u64,
    pub multiple_faces_detected: bool,
}

/// Canonical analysis of one video session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Verdict, when the backend included it with the analysis
    pub cheating_detected: Option<bool>,
    /// Human-readable reasons behind the verdict
    pub reasons: Vec<String>,
    pub statistics: AnalysisStatistics,
    /// Diagnostic counters, passed through untouched
    pub raw_counts: BTreeMap<String, i64>,
    /// Backend completion time, as sent
    pub analyzed_at: Option<String>,
}

// ============================================
// Chat
// ============================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Bot,
}

/// One entry in the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    /// Intent tag reported by the backend (bot messages only)
    pub tag: Option<String>,
    /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_mb_rounds_to_two_decimals() {
        assert_eq!(size_in_mb(0), 0.0);
        assert_eq!(size_in_mb(1024 * 1024), 1.0);
        assert_eq!(size_in_mb(1_572_864), 1.5);
        // 1234567 bytes = 1.1773... MB
        assert_eq!(size_in_mb(1_234_567), 1.18);
    }

    #[test]
    fn test_new_session_is_idle_with_pending_duration() {
        let session = VideoSession::new("exam.mp4", 2 * 1024 * 1024);
        assert_eq!(session.status, UploadStatus::Idle);
        assert_eq!(session.duration_seconds, None);
        assert_eq!(session.size_mb, 2.0);
        assert_eq!(session.name, "exam.mp4");
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = VideoSession::new("a.mp4", 1);
        let b = VideoSession::new("a.mp4", 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChatRole::Bot).unwrap(), "\"bot\"");
        assert_eq!(UploadStatus::Uploading.as_str(), "uploading");
    }
}
