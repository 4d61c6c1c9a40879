//! On-motion continuous recording
//!
//! One full-resolution file per sustained activity period. Every trigger
//! pushes the cooldown to `now + cooldown`; the file closes on the first
//! quiet tick after the cooldown has passed, so gaps shorter than the
//! cooldown never split a recording.

use super::artifacts::{file_name, ArtifactLayout};
use super::sink::{EncoderFactory, EncoderSink, VideoSpec};
use crate::capture::Frame;
use crate::utils::error::AppResult;
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of feeding one iteration into the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingChange {
    Unchanged,
    Started(String),
    Stopped(String),
}

struct ActiveRecording {
    sink: Box<dyn EncoderSink>,
    cooldown_until: Instant,
    name: String,
    frames: u64,
}

/// Owns at most one continuous recording encoder at a time
pub struct ContinuousRecorder {
    camera_id: u32,
    factory: Arc<dyn EncoderFactory>,
    layout: ArtifactLayout,
    spec: VideoSpec,
    cooldown: Duration,
    active: Option<ActiveRecording>,
}

impl ContinuousRecorder {
    pub fn new(
        camera_id: u32,
        factory: Arc<dyn EncoderFactory>,
        layout: ArtifactLayout,
        spec: VideoSpec,
        cooldown: Duration,
    ) -> Self {
        Self {
            camera_id,
            factory,
            layout,
            spec,
            cooldown,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.active.as_ref().map(|rec| rec.cooldown_until)
    }

    /// Start recording if idle, and refresh the cooldown either way
    pub fn on_trigger(&mut self, now: Instant) -> AppResult<RecordingChange> {
        if let Some(rec) = self.active.as_mut() {
            rec.cooldown_until = now + self.cooldown;
            return Ok(RecordingChange::Unchanged);
        }

        let path = self.layout.recording_path(self.camera_id, Local::now());
        let sink = self.factory.open_video(&path, self.spec)?;
        let name = file_name(&path);
        tracing::info!("Recording started for cam {}: {:?}", self.camera_id, path);

        self.active = Some(ActiveRecording {
            sink,
            cooldown_until: now + self.cooldown,
            name: name.clone(),
            frames: 0,
        });
        Ok(RecordingChange::Started(name))
    }

    /// Per-iteration update. Stops once quiet past the cooldown.
    pub fn on_tick(&mut self, now: Instant, triggered: bool) -> AppResult<RecordingChange> {
        if triggered {
            return self.on_trigger(now);
        }
        let expired = self.active.as_ref().is_some_and(|rec| now > rec.cooldown_until);
        if expired {
            self.stop()
        } else {
            Ok(RecordingChange::Unchanged)
        }
    }

    /// Append a full-resolution frame. A write failure stops the recording.
    pub fn write(&mut self, frame: &Frame) -> AppResult<()> {
        let Some(rec) = self.active.as_mut() else {
            return Ok(());
        };
        if let Err(e) = rec.sink.write(frame) {
            let _ = self.stop();
            return Err(e);
        }
        rec.frames += 1;
        Ok(())
    }

    /// Close the encoder if recording. Safe to call repeatedly.
    pub fn stop(&mut self) -> AppResult<RecordingChange> {
        let Some(mut rec) = self.active.take() else {
            return Ok(RecordingChange::Unchanged);
        };
        tracing::info!(
            "Recording stopped for cam {}: {} ({} frames)",
            self.camera_id,
            rec.name,
            rec.frames
        );
        rec.sink.close()?;
        Ok(RecordingChange::Stopped(rec.name))
    }
}

impl Drop for ContinuousRecorder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
