//! Detection capabilities consumed by the capture loop
//!
//! The loop only sees the two port traits. Each call is independent; a
//! failing call is treated by the loop as "no trigger" for that frame.

pub mod face;
pub mod mask;
pub mod motion;

use crate::capture::{Frame, Rect};
use crate::utils::error::AppResult;

pub use face::NullRecognizer;
pub use mask::Mask;
pub use motion::MotionDetector;

/// Result of one motion detection call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionDetection {
    pub triggered: bool,
    pub boxes: Vec<Rect>,
}

impl MotionDetection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: Vec<Rect>) -> Self {
        Self {
            triggered: !boxes.is_empty(),
            boxes,
        }
    }
}

/// Result of one face recognition call. Lower distance means a better match.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub identity: Option<String>,
    pub distance: f64,
    pub bbox: Option<Rect>,
}

impl Recognition {
    pub fn unknown() -> Self {
        Self {
            identity: None,
            distance: f64::INFINITY,
            bbox: None,
        }
    }

    /// Identity if it was recognized below `threshold`
    pub fn accepted(&self, threshold: f64) -> Option<&str> {
        match &self.identity {
            Some(name) if self.distance < threshold => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Motion detection capability
pub trait DetectionPort: Send {
    fn detect(&mut self, frame: &Frame) -> AppResult<MotionDetection>;

    /// Replace the active-region mask. Detectors without mask support ignore it.
    fn set_mask(&mut self, _mask: Option<Mask>) {}
}

/// Face recognition capability
pub trait RecognitionPort: Send {
    fn recognize(&mut self, frame: &Frame) -> AppResult<Recognition>;
}
