//! Recording system module
//!
//! - `PreRollBuffer` keeps the last couple of seconds of frames
//! - `EventClipRecorder` writes short downscaled clips per event
//! - `ContinuousRecorder` writes full-resolution on-motion recordings
//! - `EncoderFactory`/`EncoderSink` abstract the video encoder

pub mod artifacts;
pub mod continuous;
pub mod event_clip;
pub mod preroll;
pub mod sink;

pub use artifacts::ArtifactLayout;
pub use continuous::{ContinuousRecorder, RecordingChange};
pub use event_clip::EventClipRecorder;
pub use preroll::PreRollBuffer;
pub use sink::{EncoderFactory, EncoderSink, FfmpegEncoderFactory, VideoSpec};
