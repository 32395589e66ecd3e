//! Analysis result distribution
//!
//! Normalizes the backend's analysis payload into [`AnalysisResult`] and
//! publishes it into the [`SessionStore`], but only for the session the
//! payload was requested for.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::store::SessionStore;
use crate::types::{AnalysisResult, AnalysisStatistics, SessionId, VideoSession};

/// Status shown when an analysis payload cannot be interpreted
pub const ANALYSIS_UNREADABLE: &str = "Analysis results could not be read.";

/// What happened to an ingested payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Result written to the store
    Published,
    /// Payload carried a verdict only; nothing to publish
    NoAnalysis,
    /// Analysis section present but unusable; parse-failure status shown
    Malformed(String),
    /// Session is no longer current; payload dropped
    Superseded,
}

/// Publishes analysis results into the session store.
#[derive(Clone)]
pub struct AnalysisDistributor {
    store: SessionStore,
}

impl AnalysisDistributor {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Start a new session, clearing the published result in the same write.
    pub fn begin(&self, video: VideoSession) {
        self.store.begin_session(video);
    }

    /// Parse `payload` and publish it for `session_id`.
    pub fn ingest(&self, session_id: SessionId, payload: &Value) -> IngestOutcome {
        match parse_analysis(payload) {
            Ok(Some(result)) => {
                let published = self.store.update_current(session_id, |state| {
                    state.analysis = Some(result);
                });
                if published {
                    tracing::info!(session = %session_id, "Analysis published");
                    IngestOutcome::Published
                } else {
                    tracing::debug!(session = %session_id, "Dropping analysis for superseded session");
                    IngestOutcome::Superseded
                }
            }
            Ok(None) => {
                if self.store.current_session_id() == Some(session_id) {
                    IngestOutcome::NoAnalysis
                } else {
                    IngestOutcome::Superseded
                }
            }
            Err(reason) => {
                let shown = self.store.update_current(session_id, |state| {
                    state.analysis = None;
                    state.status_message = ANALYSIS_UNREADABLE.to_string();
                });
                if shown {
                    tracing::warn!(session = %session_id, %reason, "Malformed analysis payload");
                    IngestOutcome::Malformed(reason)
                } else {
                    IngestOutcome::Superseded
                }
            }
        }
    }
}

/// Extract the analysis section of an upload response.
///
/// The backend nests it under `details`; a flat layout with `statistics`
/// at the top level is accepted too. `Ok(None)` means the payload carried
/// no analysis at all.
pub fn parse_analysis(payload: &Value) -> Result<Option<AnalysisResult>, String> {
    let section = match payload.get("details") {
        Some(details) => details,
        None if payload.get("statistics").is_some() || payload.get("raw_counts").is_some() => {
            payload
        }
        None => return Ok(None),
    };

    if let Some(error) = section.get("error").and_then(Value::as_str) {
        return Err(format!("backend reported analysis error: {}", error));
    }

    let raw = RawSection::deserialize(section).map_err(|e| e.to_string())?;

    if raw.statistics.processed_frames > raw.statistics.total_frames {
        return Err(format!(
            "processed_frames ({}) exceeds total_frames ({})",
            raw.statistics.processed_frames, raw.statistics.total_frames
        ));
    }

    Ok(Some(AnalysisResult {
        cheating_detected: payload.get("cheating_detected").and_then(Value::as_bool),
        reasons: raw.reasons,
        statistics: AnalysisStatistics {
            processing_ratio: raw.statistics.processing_ratio,
            face_detection_rate: raw.statistics.face_detection_rate,
            lookaway_ratio: raw.statistics.lookaway_ratio,
            processed_frames: raw.statistics.processed_frames,
            total_frames: raw.statistics.total_frames,
            multiple_faces_detected: raw.statistics.multiple_faces_detected,
        },
        raw_counts: raw.raw_counts,
        analyzed_at: payload
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string),
    }))
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    reasons: Vec<String>,
    statistics: RawStatistics,
    raw_counts: BTreeMap<String, i64>,
}

#[derive(Deserialize)]
struct RawStatistics {
    #[serde(deserialize_with = "formatted")]
    processing_ratio: String,
    #[serde(deserialize_with = "formatted")]
    face_detection_rate: String,
    #[serde(deserialize_with = "formatted")]
    lookaway_ratio: String,
    processed_frames: u64,
    total_frames: u64,
    multiple_faces_detected: bool,
}

/// Ratios are display strings; bare numbers are kept in their JSON form.
fn formatted<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a formatted ratio, got {}",
            other
        ))),
    }
}
