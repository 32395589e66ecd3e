//! Duration probing via ffprobe.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Extracts the duration of a local video file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

/// [`MediaProbe`] backed by the `ffprobe` command line tool.
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Probe(format!("failed to run {}: {}", self.ffprobe.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Probe(format!(
                "ffprobe failed on {}: {}",
                path.display(),
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's `format=duration` output.
fn parse_duration(stdout: &str) -> Result<f64> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    match line.map(str::parse::<f64>) {
        Some(Ok(seconds)) if seconds.is_finite() && seconds >= 0.0 => Ok(seconds),
        Some(Ok(seconds)) => Err(Error::Probe(format!("invalid duration: {}", seconds))),
        Some(Err(_)) | None => Err(Error::Probe(format!(
            "duration unknown (ffprobe printed {:?})",
            stdout.trim()
        ))),
    }
}
