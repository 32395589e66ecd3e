//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/proctorcam/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/proctorcam/` (~/.config/proctorcam/)
//! - State/Logs/Previews: `$XDG_STATE_HOME/proctorcam/` (~/.local/state/proctorcam/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Detection backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chat behaviour
    #[serde(default)]
    pub chat: ChatConfig,

    /// Local media tooling
    #[serde(default)]
    pub media: MediaConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Detection backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g., `http://127.0.0.1:5000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for `POST /upload` in seconds; analysis runs server-side
    /// before the response is sent
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Timeout for `POST /api/chat` in seconds
    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            upload_timeout_secs: default_upload_timeout(),
            chat_timeout_secs: default_chat_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("backend.base_url must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.upload_timeout_secs == 0 {
            return Err(Error::Config(
                "backend.upload_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.chat_timeout_secs == 0 {
            return Err(Error::Config(
                "backend.chat_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_upload_timeout() -> u64 {
    300
}

fn default_chat_timeout() -> u64 {
    30
}

/// How bot replies are ordered when sends overlap
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatOrdering {
    /// Every send goes out immediately; replies land as they complete
    #[default]
    Completion,
    /// Sends are queued and processed one turn at a time
    Serialized,
}

/// Chat configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub ordering: ChatOrdering,
}

/// Media tooling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// ffprobe executable used for duration extraction
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,

    /// ffmpeg executable used for preview frames
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Extract a preview frame for each selected video
    #[serde(default = "default_previews")]
    pub previews: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe(),
            ffmpeg_path: default_ffmpeg(),
            previews: default_previews(),
        }
    }
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_previews() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.backend.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/proctorcam/config.toml` (~/.config/proctorcam/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("proctorcam").join("config.toml")
    }

    /// Returns the state directory path (for logs and previews)
    ///
    /// `$XDG_STATE_HOME/proctorcam/` (~/.local/state/proctorcam/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("proctorcam")
    }

    /// Returns the directory preview frames are written to
    pub fn preview_dir() -> PathBuf {
        Self::state_dir().join("previews")
    }

    /// Returns the directory daily log files are written to
    ///
    /// `$XDG_STATE_HOME/proctorcam/` (~/.local/state/proctorcam/)
    pub fn log_dir() -> PathBuf {
        Self::state_dir()
    }
}
