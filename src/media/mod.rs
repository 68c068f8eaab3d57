//! Media acquisition.
//!
//! Downloads the audio track for a discovered video and tells apart the three
//! outcomes the pipeline cares about: audio ready, permanently unavailable, and
//! a live broadcast that has not finished yet.

pub mod ffmpeg;
mod ytdlp;

pub use ytdlp::{classify_failure, live_status_pending, FailureKind, YtDlpFetcher};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of trying to acquire an item's media.
#[derive(Debug)]
pub enum AcquisitionResult {
    /// Audio is on disk. The guard deletes it when dropped.
    Ready(MediaFile),
    /// Content cannot be obtained (removed, private, tool failure, ...).
    Unavailable(String),
    /// Tied to a live broadcast that has not concluded. Retry later.
    LiveEventPending,
}

/// Fetches media for a link into a destination directory.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, link: &str, dest_dir: &Path) -> AcquisitionResult;
}

/// A downloaded media file owned by one item's processing.
///
/// The file is deleted by [`MediaFile::remove`] or, failing that, when the
/// guard is dropped, so it never outlives the item.
#[derive(Debug)]
pub struct MediaFile {
    path: PathBuf,
    removed: bool,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. A file that is already gone counts as removed.
    pub fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for MediaFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match remove_if_present(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed media file on drop"),
            Err(e) => warn!(path = %self.path.display(), "Failed to remove media file: {}", e),
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
