//! Preview frames for the selected video.
//!
//! A [`PreviewHandle`] owns one preview resource and releases it when
//! dropped. Binding the handle to the session that created it means
//! replacing the session releases the preview exactly once.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Produces a preview resource for a video file.
pub trait PreviewSource: Send + Sync {
    fn acquire(&self, video: &Path) -> Result<PreviewHandle>;
}

/// Frees a preview resource.
pub trait PreviewRelease: Send + Sync {
    fn release(&self, location: &Path);
}

/// Owned preview resource, released on drop.
pub struct PreviewHandle {
    id: Uuid,
    location: PathBuf,
    releaser: Arc<dyn PreviewRelease>,
}

impl PreviewHandle {
    pub fn new(location: PathBuf, releaser: Arc<dyn PreviewRelease>) -> Self {
        Self {
            id: Uuid::new_v4(),
            location,
            releaser,
        }
    }

    /// Where the preview lives (a PNG for [`ThumbnailPreview`])
    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        tracing::debug!(preview = %self.id, path = %self.location.display(), "Releasing preview");
        self.releaser.release(&self.location);
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish()
    }
}

/// Extracts the first frame of a video with `ffmpeg` into a PNG.
pub struct ThumbnailPreview {
    ffmpeg: PathBuf,
    dir: PathBuf,
    releaser: Arc<dyn PreviewRelease>,
}

impl ThumbnailPreview {
    pub fn new(ffmpeg: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            dir: dir.into(),
            releaser: Arc::new(RemoveFile),
        }
    }
}

impl PreviewSource for ThumbnailPreview {
    fn acquire(&self, video: &Path) -> Result<PreviewHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(format!("preview_{}.png", Uuid::new_v4()));

        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(video)
            .args(["-frames:v", "1", "-vf", "scale=320:-2"])
            .arg(&target)
            .output()
            .map_err(|e| Error::Preview(format!("failed to run {}: {}", self.ffmpeg.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg may leave a partial file behind
            let _ = std::fs::remove_file(&target);
            return Err(Error::Preview(format!(
                "ffmpeg failed on {}: {}",
                video.display(),
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }

        Ok(PreviewHandle::new(target, Arc::clone(&self.releaser)))
    }
}

/// Deletes the preview file.
struct RemoveFile;

impl PreviewRelease for RemoveFile {
    fn release(&self, location: &Path) {
        if let Err(e) = std::fs::remove_file(location) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %location.display(), error = %e, "Failed to remove preview");
            }
        }
    }
}
