//! Camera mode and event types

use crate::capture::Rect;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator-selected behaviour of a running camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Stream only, no detection
    #[default]
    Idle,
    /// Motion detection with event snapshots and clips
    Motion,
    /// Motion plus face recognition
    Face,
    /// Motion detection that also drives continuous recording
    #[serde(alias = "on_motion")]
    OnMotionRecord,
}

impl Mode {
    pub fn detects_motion(self) -> bool {
        !matches!(self, Mode::Idle)
    }

    pub fn recognizes_faces(self) -> bool {
        matches!(self, Mode::Face)
    }

    pub fn records_on_motion(self) -> bool {
        matches!(self, Mode::OnMotionRecord)
    }
}

/// What fired a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerDetail {
    Motion { boxes: Vec<Rect> },
    Face { identity: String, distance: f64 },
}

impl TriggerDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerDetail::Motion { .. } => "motion",
            TriggerDetail::Face { .. } => "face",
        }
    }
}

/// Qualifying detection for one loop iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub detail: TriggerDetail,
    pub timestamp: DateTime<Local>,
}

/// Notifications broadcast to control-surface subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CameraEvent {
    /// Debounced trigger produced a snapshot and opened a clip
    EventRecorded {
        camera_id: u32,
        event_id: Uuid,
        trigger: TriggerEvent,
        snapshot: Option<String>,
        clip: Option<String>,
    },
    ClipClosed {
        camera_id: u32,
    },
    RecordingStarted {
        camera_id: u32,
        name: String,
    },
    RecordingStopped {
        camera_id: u32,
        name: String,
    },
}

/// Per-camera entry of the status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    /// `None` while stopped
    pub mode: Option<Mode>,
    pub recording: bool,
}
