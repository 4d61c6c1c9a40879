//! Artifact filesystem layout
//!
//! ```text
//! <recordings_dir>/cam<id>_<ts>.mp4      continuous recordings
//! <events_dir>/thumbs/cam<id>_<ts>.jpg   event snapshots
//! <events_dir>/clips/cam<id>_<ts>.mp4    event clips
//! ```

use crate::config::PathsConfig;
use crate::utils::error::AppResult;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

const VIDEO_EXT: &str = "mp4";
const SNAPSHOT_EXT: &str = "jpg";

/// Where a camera's artifacts are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    recordings_dir: PathBuf,
    events_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(recordings_dir: impl Into<PathBuf>, events_dir: impl Into<PathBuf>) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            events_dir: events_dir.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.recordings_dir.clone(), paths.events_dir())
    }

    /// Create all artifact directories
    pub fn ensure_dirs(&self) -> AppResult<()> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        std::fs::create_dir_all(self.thumbs_dir())?;
        std::fs::create_dir_all(self.clips_dir())?;
        Ok(())
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.events_dir.join("thumbs")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.events_dir.join("clips")
    }

    pub fn recording_path(&self, camera_id: u32, at: DateTime<Local>) -> PathBuf {
        self.recordings_dir.join(artifact_name(camera_id, at, VIDEO_EXT))
    }

    pub fn snapshot_path(&self, camera_id: u32, at: DateTime<Local>) -> PathBuf {
        self.thumbs_dir().join(artifact_name(camera_id, at, SNAPSHOT_EXT))
    }

    pub fn clip_path(&self, camera_id: u32, at: DateTime<Local>) -> PathBuf {
        self.clips_dir().join(artifact_name(camera_id, at, VIDEO_EXT))
    }
}

/// `cam<id>_<timestamp>.<ext>`
pub fn artifact_name(camera_id: u32, at: DateTime<Local>, ext: &str) -> String {
    format!("cam{}_{}.{}", camera_id, at.format("%Y%m%d_%H%M%S_%3f"), ext)
}

/// File name component of an artifact path, as served by the file server
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
