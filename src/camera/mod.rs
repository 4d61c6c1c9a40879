//! Camera workers and the registry that controls them

pub mod frame_slot;
pub mod registry;
pub mod state;
pub mod worker;

pub use frame_slot::FrameSlot;
pub use registry::{CameraRegistry, MaskStore};
pub use state::{CameraEvent, CameraStatus, Mode, TriggerDetail, TriggerEvent};
pub use worker::{CameraWorker, Detectors, WorkerSettings};
