//! Event clip recorder
//!
//! Short downscaled clip per event: opened on a debounced trigger with the
//! pre-roll flushed first, kept alive while the deadline keeps moving,
//! closed by the first `feed` after the deadline passes.

use super::artifacts::{file_name, ArtifactLayout};
use super::sink::{EncoderFactory, EncoderSink, VideoSpec};
use crate::capture::Frame;
use crate::utils::error::AppResult;
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ActiveClip {
    sink: Box<dyn EncoderSink>,
    deadline: Instant,
    name: String,
    frames: u64,
}

/// Owns at most one event clip encoder at a time
pub struct EventClipRecorder {
    camera_id: u32,
    factory: Arc<dyn EncoderFactory>,
    layout: ArtifactLayout,
    spec: VideoSpec,
    extension: Duration,
    active: Option<ActiveClip>,
}

impl EventClipRecorder {
    pub fn new(
        camera_id: u32,
        factory: Arc<dyn EncoderFactory>,
        layout: ArtifactLayout,
        spec: VideoSpec,
        extension: Duration,
    ) -> Self {
        Self {
            camera_id,
            factory,
            layout,
            spec,
            extension,
            active: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|clip| clip.deadline)
    }

    /// Start a clip and flush `preroll` into it, oldest first.
    ///
    /// Returns the clip file name, or `None` if a clip is already open.
    pub fn open(&mut self, preroll: &[Frame], now: Instant) -> AppResult<Option<String>> {
        if self.active.is_some() {
            return Ok(None);
        }

        let path = self.layout.clip_path(self.camera_id, Local::now());
        let mut sink = self.factory.open_video(&path, self.spec)?;

        for frame in preroll {
            if let Err(e) = sink.write(&self.downscale(frame)) {
                let _ = sink.close();
                return Err(e);
            }
        }

        let name = file_name(&path);
        tracing::debug!(
            "Camera {} event clip {} opened with {} pre-roll frames",
            self.camera_id,
            name,
            preroll.len()
        );
        self.active = Some(ActiveClip {
            sink,
            deadline: now + self.extension,
            name: name.clone(),
            frames: preroll.len() as u64,
        });
        Ok(Some(name))
    }

    /// Write the current frame; closes the clip once `now` is past the deadline.
    ///
    /// Returns `true` when the clip closed during this call. A write failure
    /// closes the clip before the error is returned.
    pub fn feed(&mut self, frame: &Frame, now: Instant) -> AppResult<bool> {
        if self.active.is_none() {
            return Ok(false);
        }
        let small = self.downscale(frame);
        let Some(clip) = self.active.as_mut() else {
            return Ok(false);
        };

        if let Err(e) = clip.sink.write(&small) {
            let _ = self.close();
            return Err(e);
        }
        clip.frames += 1;

        if now > clip.deadline {
            self.close()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Push the deadline to `now + extension`. No effect when closed.
    pub fn extend(&mut self, now: Instant) -> bool {
        match self.active.as_mut() {
            Some(clip) => {
                clip.deadline = now + self.extension;
                true
            }
            None => false,
        }
    }

    /// Release the encoder if held. Safe to call repeatedly.
    pub fn close(&mut self) -> AppResult<()> {
        let Some(mut clip) = self.active.take() else {
            return Ok(());
        };
        tracing::debug!(
            "Camera {} event clip {} closed after {} frames",
            self.camera_id,
            clip.name,
            clip.frames
        );
        clip.sink.close()
    }

    fn downscale(&self, frame: &Frame) -> Frame {
        frame.resized(self.spec.width, self.spec.height)
    }
}

impl Drop for EventClipRecorder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
