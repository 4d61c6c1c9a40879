//! Capture trait definitions
//!
//! Device-agnostic traits for frame producers.

use super::frame::Frame;
use crate::utils::error::AppResult;
use std::fmt;
use std::sync::Arc;

/// Pull-based frame producer owned by a running capture loop
pub trait FrameSource: Send {
    /// Next decoded frame, or `None` when nothing is available right now.
    ///
    /// A `None` is a transient condition; callers retry after a pause.
    fn read(&mut self) -> Option<Frame>;

    /// Release the underlying device. Must be idempotent.
    fn release(&mut self);

    /// Handle that can tear the device down from another thread
    fn release_handle(&self) -> Option<ReleaseHandle> {
        None
    }
}

/// Opens a fresh `FrameSource` for each camera session
pub trait CaptureDevice: Send + Sync {
    /// Human readable identifier used in logs
    fn describe(&self) -> String;

    fn open(&self) -> AppResult<Box<dyn FrameSource>>;
}

/// Out-of-band release of a capture device.
///
/// Used when a capture loop does not exit within its shutdown bound.
#[derive(Clone)]
pub struct ReleaseHandle(Arc<dyn Fn() + Send + Sync>);

impl ReleaseHandle {
    pub fn new<F>(release: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(release))
    }

    pub fn release(&self) {
        (self.0)()
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReleaseHandle")
    }
}
