//! Error types for proctorcam-core

use thiserror::Error;

/// Main error type for the proctorcam-core library
#[derive(Error, Debug)]
pub enum Error {
    /// `upload()` called with no video selected
    #[error("no video file selected")]
    NoFileSelected,

    /// `upload()` called while a previous upload is still outstanding
    #[error("an upload is already in progress")]
    UploadAlreadyInProgress,

    /// Network unreachable, timed out, or the request could not be sent
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("backend error ({status}): {}", message.as_deref().unwrap_or("no details"))]
    Backend {
        status: u16,
        /// `error` field of the response body, if present
        message: Option<String>,
    },

    /// Response body missing required fields
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Video metadata could not be extracted
    #[error("probe error: {0}")]
    Probe(String),

    /// Preview frame could not be produced
    #[error("preview error: {0}")]
    Preview(String),
}

impl Error {
    /// Text reported by the backend itself, if this error carries one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Error::Backend { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for proctorcam-core
pub type Result<T> = std::result::Result<T, Error>;
