//! Camera registry
//!
//! The control surface over all configured cameras. Cameras are fixed at
//! construction; each one is started and stopped independently.

use super::state::{CameraEvent, CameraStatus, Mode};
use super::worker::{CameraWorker, Detectors, WorkerSettings};
use crate::capture::{FfmpegCaptureDevice, Frame};
use crate::config::AppConfig;
use crate::detection::mask::{ensure_mask_file, mask_path};
use crate::detection::{Mask, MotionDetector, NullRecognizer};
use crate::recorder::{ArtifactLayout, EncoderFactory, FfmpegEncoderFactory};
use crate::utils::error::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where per-camera motion masks live
#[derive(Debug, Clone)]
pub struct MaskStore {
    pub dir: PathBuf,
    pub suffix: String,
}

impl MaskStore {
    pub fn path(&self, camera_id: u32) -> PathBuf {
        mask_path(&self.dir, camera_id, &self.suffix)
    }
}

pub struct CameraRegistry {
    workers: BTreeMap<u32, CameraWorker>,
    events: broadcast::Sender<CameraEvent>,
    masks: MaskStore,
}

impl CameraRegistry {
    pub fn new(masks: MaskStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            workers: BTreeMap::new(),
            events,
            masks,
        }
    }

    /// Build FFmpeg-backed workers for every configured camera
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let mut registry = Self::new(MaskStore {
            dir: config.paths.masks_dir.clone(),
            suffix: config.motion.mask_suffix.clone(),
        });
        let layout = ArtifactLayout::from_config(&config.paths);
        let encoders: Arc<dyn EncoderFactory> =
            Arc::new(FfmpegEncoderFactory::new(config.events.snapshot_quality));
        let settings = WorkerSettings::from_config(config);

        for camera in &config.cameras {
            let input = camera.device.clone().unwrap_or_else(|| {
                FfmpegCaptureDevice::device_path(&config.video.input_format, camera.device_index)
            });
            let device = FfmpegCaptureDevice::new(
                input,
                config.video.input_format.clone(),
                config.video.width,
                config.video.height,
                config.video.fps,
            );
            let mask = Mask::load(&registry.masks.path(camera.id));
            let detectors = Detectors {
                motion: Box::new(MotionDetector::new(&config.motion, mask)),
                faces: Box::new(NullRecognizer),
            };
            let worker = CameraWorker::new(
                camera.id,
                settings.clone(),
                layout.clone(),
                Box::new(device),
                Arc::clone(&encoders),
                detectors,
                registry.events.clone(),
            );
            registry.insert(worker)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, worker: CameraWorker) -> AppResult<()> {
        let id = worker.id();
        if self.workers.contains_key(&id) {
            return Err(AppError::Config(format!("duplicate camera id {id}")));
        }
        self.workers.insert(id, worker);
        Ok(())
    }

    /// Sender handed to workers built outside `from_config`
    pub fn event_sender(&self) -> broadcast::Sender<CameraEvent> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    pub fn camera_ids(&self) -> Vec<u32> {
        self.workers.keys().copied().collect()
    }

    fn worker(&self, camera_id: u32) -> AppResult<&CameraWorker> {
        self.workers
            .get(&camera_id)
            .ok_or(AppError::UnknownCamera(camera_id))
    }

    pub fn start(&self, camera_id: u32, mode: Mode) -> AppResult<()> {
        self.worker(camera_id)?.start(mode)
    }

    pub fn stop(&self, camera_id: u32) -> AppResult<()> {
        self.worker(camera_id)?.stop()
    }

    pub fn stop_all(&self) {
        for (id, worker) in &self.workers {
            if let Err(e) = worker.stop() {
                tracing::warn!("Failed to stop camera {}: {}", id, e);
            }
        }
    }

    /// Start or stop several cameras; `None` stops. Unknown ids are skipped.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub fn apply_modes(&self, modes: &HashMap<u32, Option<Mode>>) -> AppResult<()> {
        let mut first_error = None;
        for (&camera_id, &mode) in modes {
            let Some(worker) = self.workers.get(&camera_id) else {
                tracing::debug!("Ignoring unknown camera {}", camera_id);
                continue;
            };
            let result = match mode {
                Some(mode) => worker.start(mode),
                None => worker.stop(),
            };
            if let Err(e) = result {
                tracing::warn!("Camera {} mode change failed: {}", camera_id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn status(&self) -> BTreeMap<u32, CameraStatus> {
        self.workers
            .iter()
            .map(|(&id, worker)| (id, worker.status()))
            .collect()
    }

    pub fn latest_frame(&self, camera_id: u32) -> Option<Frame> {
        self.workers.get(&camera_id)?.latest_frame()
    }

    /// Store an uploaded mask image and apply it to the live detector
    pub fn upload_mask(&self, camera_id: u32, bytes: &[u8]) -> AppResult<PathBuf> {
        let worker = self.worker(camera_id)?;
        let mask = Mask::decode(bytes)?;
        let path = self.masks.path(camera_id);
        mask.save(&path)?;

        if mask.dimensions() != worker.frame_size() {
            tracing::warn!(
                "Mask for camera {} is {:?}, frames are {:?}; it is ignored until sizes match",
                camera_id,
                mask.dimensions(),
                worker.frame_size()
            );
        }
        worker.update_mask(Some(mask));
        tracing::info!("Updated motion mask for camera {} at {:?}", camera_id, path);
        Ok(path)
    }

    /// Path of the camera's mask file, creating a blank one if missing
    pub fn ensure_mask_file(&self, camera_id: u32) -> AppResult<PathBuf> {
        let (width, height) = self.worker(camera_id)?.frame_size();
        let path = self.masks.path(camera_id);
        ensure_mask_file(&path, width, height)?;
        Ok(path)
    }
}
