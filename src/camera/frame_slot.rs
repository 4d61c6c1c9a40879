//! Latest-frame hand-off between the capture loop and viewers
//!
//! The lock is held only while a frame is copied in or out, never while
//! detection or encoding runs.

use crate::capture::Frame;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published frame with a copy of `frame`
    pub fn publish(&self, frame: &Frame) {
        // Copy outside the lock; only the swap is exclusive
        let copy = frame.clone();
        let previous = self.latest.lock().replace(copy);
        drop(previous);
    }

    /// Copy of the most recently published frame
    pub fn latest(&self) -> Option<Frame> {
        self.latest.lock().clone()
    }
}
