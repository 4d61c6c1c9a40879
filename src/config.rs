//! Application configuration
//!
//! Loaded from a JSON file. Every section has defaults so a partial (or
//! missing) file still yields a usable configuration.

use crate::camera::Mode;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub video: VideoConfig,
    pub paths: PathsConfig,
    pub events: EventsConfig,
    pub recording: RecordingConfig,
    pub face: FaceConfig,
    pub motion: MotionConfig,
    pub stream: StreamConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
    pub cameras: Vec<CameraConfig>,
}

/// Capture geometry shared by every camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// FFmpeg demuxer used to open devices
    pub input_format: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            input_format: "v4l2".to_string(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub recordings_dir: PathBuf,
    /// Parent of `thumbs/` and `clips/`; sibling `events` of the recordings dir when unset
    pub events_dir: Option<PathBuf>,
    pub masks_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("data/recordings"),
            events_dir: None,
            masks_dir: PathBuf::from("data/masks"),
        }
    }
}

impl PathsConfig {
    pub fn events_dir(&self) -> PathBuf {
        match &self.events_dir {
            Some(dir) => dir.clone(),
            None => self
                .recordings_dir
                .parent()
                .map(|p| p.join("events"))
                .unwrap_or_else(|| PathBuf::from("events")),
        }
    }
}

/// Event snapshot and clip settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub debounce_secs: f64,
    pub clip_extension_secs: f64,
    pub clip_width: u32,
    pub clip_height: u32,
    pub snapshot_quality: u8,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 1.5,
            clip_extension_secs: 3.0,
            clip_width: 320,
            clip_height: 240,
            snapshot_quality: 70,
        }
    }
}

/// On-motion continuous recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub cooldown_secs: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { cooldown_secs: 5.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Maximum recognizer distance accepted as a match (lower is better)
    pub acceptance_threshold: f64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 80.0,
        }
    }
}

/// Motion detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub pixel_threshold: u8,
    pub learning_rate: f32,
    pub cell_size: u32,
    pub min_area: u64,
    pub mask_suffix: String,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: 25,
            learning_rate: 0.05,
            cell_size: 8,
            min_area: 500,
            mask_suffix: "_mask.png".to_string(),
        }
    }
}

/// MJPEG viewer stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Falls back to the capture fps
    pub fps: Option<u32>,
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: None,
            jpeg_quality: 80,
        }
    }
}

/// Capture loop pacing and shutdown bound
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub missing_frame_pause_ms: u64,
    pub loop_yield_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            missing_frame_pause_ms: 50,
            loop_yield_ms: 1,
            shutdown_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "camwatch=info".to_string(),
        }
    }
}

/// One physical camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: u32,
    #[serde(default)]
    pub device_index: u32,
    /// Explicit FFmpeg input, overrides `device_index`
    #[serde(default)]
    pub device: Option<String>,
    /// Mode to start in at launch
    #[serde(default)]
    pub mode: Option<Mode>,
}

impl AppConfig {
    /// Read and validate a configuration file; a missing file yields defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.video.fps == 0 {
            return Err(AppError::Config("video.fps must be positive".to_string()));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(AppError::Config("video.width and video.height must be positive".to_string()));
        }
        if self.events.clip_width == 0 || self.events.clip_height == 0 {
            return Err(AppError::Config("events clip size must be positive".to_string()));
        }
        for (name, secs) in [
            ("events.debounce_secs", self.events.debounce_secs),
            ("events.clip_extension_secs", self.events.clip_extension_secs),
            ("recording.cooldown_secs", self.recording.cooldown_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(AppError::Config(format!("{name} must be a non-negative number")));
            }
        }

        let mut ids = HashSet::new();
        for camera in &self.cameras {
            if !ids.insert(camera.id) {
                return Err(AppError::Config(format!("duplicate camera id {}", camera.id)));
            }
        }
        Ok(())
    }

    /// Viewer stream rate
    pub fn stream_fps(&self) -> u32 {
        self.stream.fps.unwrap_or(self.video.fps).max(1)
    }
}

/// Seconds from config as a `Duration`
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
