//! Frame capture
//!
//! Frames, the traits capture devices implement, and the FFmpeg device.

pub mod ffmpeg;
pub mod frame;
pub mod traits;

pub use ffmpeg::FfmpegCaptureDevice;
pub use frame::{Frame, Rect};
pub use traits::{CaptureDevice, FrameSource, ReleaseHandle};
