//! # proctorcam-core
//!
//! Client-side session orchestration for proctorcam - a video cheating
//! detection client.
//!
//! This library provides:
//! - A session store that every display surface renders from
//! - Upload coordination for the selected video
//! - Distribution of the backend's analysis into the store
//! - A chat session with the backend bot
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use proctorcam_core::{Config, Services};
//!
//! # async fn run() -> proctorcam_core::Result<()> {
//! let config = Config::load()?;
//! let services = Services::from_config(&config)?;
//!
//! services.uploads.select_file("exam.mp4")?;
//! services.uploads.upload().await?;
//! println!("{}", services.store.snapshot().status_message);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use backend::{ChatBackend, ChatReply, DetectionBackend, HttpBackend, VideoUpload};
pub use chat::{ChatSession, ChatState, ChatView, TurnPhase};
pub use config::{ChatOrdering, Config};
pub use distributor::{AnalysisDistributor, IngestOutcome};
pub use error::{Error, Result};
pub use services::Services;
pub use store::{SessionState, SessionStore, SessionView};
pub use types::*;
pub use upload::{UploadCoordinator, UploadOutcome};

// Public modules
pub mod backend;
pub mod chat;
pub mod config;
pub mod distributor;
pub mod error;
pub mod logging;
pub mod media;
pub mod services;
pub mod store;
pub mod types;
pub mod upload;
