//! Control surface handlers
//!
//! Transport-agnostic handlers a web or IPC layer calls into: camera
//! control and MJPEG live view.

pub mod control;
pub mod stream;
