//! Per-camera capture worker
//!
//! A `CameraWorker` owns one device and, while running, one capture thread.
//! The thread reads frames, runs detection for the current mode, drives the
//! event clip and continuous recorders, then publishes the annotated frame
//! to the `FrameSlot` and the pre-roll buffer.
//!
//! Each run gets its own `Session` holding the stop flag and the recorders.
//! `stop` can close a session's recorders itself when the thread does not
//! exit within the shutdown bound, and a thread left behind only ever
//! touches the session it was started with.

use super::frame_slot::FrameSlot;
use super::state::{CameraEvent, CameraStatus, Mode, TriggerDetail, TriggerEvent};
use crate::capture::frame::{FACE_COLOR, MOTION_COLOR};
use crate::capture::{CaptureDevice, Frame, FrameSource, Rect, ReleaseHandle};
use crate::config::{secs, AppConfig};
use crate::detection::{DetectionPort, Mask, MotionDetection, RecognitionPort};
use crate::recorder::{
    ArtifactLayout, ContinuousRecorder, EncoderFactory, EventClipRecorder, PreRollBuffer,
    RecordingChange, VideoSpec,
};
use crate::recorder::artifacts::file_name;
use crate::utils::error::{AppError, AppResult};
use chrono::Local;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

const OVERLAY_THICKNESS: u32 = 2;
const LABEL_HEIGHT: u32 = 6;
const FORCED_CLOSE_WAIT: Duration = Duration::from_millis(500);

/// Timing and geometry for one worker
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub clip_width: u32,
    pub clip_height: u32,
    pub clip_extension: Duration,
    pub cooldown: Duration,
    pub debounce: Duration,
    pub face_threshold: f64,
    pub missing_frame_pause: Duration,
    pub loop_yield: Duration,
    pub shutdown_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            width: config.video.width,
            height: config.video.height,
            fps: config.video.fps,
            clip_width: config.events.clip_width,
            clip_height: config.events.clip_height,
            clip_extension: secs(config.events.clip_extension_secs),
            cooldown: secs(config.recording.cooldown_secs),
            debounce: secs(config.events.debounce_secs),
            face_threshold: config.face.acceptance_threshold,
            missing_frame_pause: Duration::from_millis(config.worker.missing_frame_pause_ms),
            loop_yield: Duration::from_millis(config.worker.loop_yield_ms),
            shutdown_timeout: Duration::from_millis(config.worker.shutdown_timeout_ms),
        }
    }

    fn clip_spec(&self) -> VideoSpec {
        VideoSpec {
            width: self.clip_width,
            height: self.clip_height,
            fps: self.fps.max(1),
            channels: 3,
        }
    }

    fn recording_spec(&self) -> VideoSpec {
        VideoSpec {
            width: self.width,
            height: self.height,
            fps: self.fps.max(1),
            channels: 3,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Detection capabilities of one camera
pub struct Detectors {
    pub motion: Box<dyn DetectionPort>,
    pub faces: Box<dyn RecognitionPort>,
}

struct Recorders {
    clip: EventClipRecorder,
    continuous: ContinuousRecorder,
}

impl Recorders {
    fn close_all(&mut self, camera_id: u32, events: &broadcast::Sender<CameraEvent>) {
        match self.continuous.stop() {
            Ok(RecordingChange::Stopped(name)) => {
                let _ = events.send(CameraEvent::RecordingStopped { camera_id, name });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to finalize recording for camera {}: {}", camera_id, e),
        }
        if let Err(e) = self.clip.close() {
            tracing::warn!("Failed to finalize event clip for camera {}: {}", camera_id, e);
        }
    }
}

/// State shared between the worker handle and its capture threads
struct Shared {
    camera_id: u32,
    settings: WorkerSettings,
    layout: ArtifactLayout,
    encoders: Arc<dyn EncoderFactory>,
    detectors: Mutex<Detectors>,
    mode: RwLock<Mode>,
    latest: FrameSlot,
    events: broadcast::Sender<CameraEvent>,
}

impl Shared {
    fn new_session(&self) -> Arc<Session> {
        let settings = &self.settings;
        Arc::new(Session {
            stop: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            recorders: Mutex::new(Recorders {
                clip: EventClipRecorder::new(
                    self.camera_id,
                    Arc::clone(&self.encoders),
                    self.layout.clone(),
                    settings.clip_spec(),
                    settings.clip_extension,
                ),
                continuous: ContinuousRecorder::new(
                    self.camera_id,
                    Arc::clone(&self.encoders),
                    self.layout.clone(),
                    settings.recording_spec(),
                    settings.cooldown,
                ),
            }),
        })
    }
}

/// One start/stop cycle of the capture thread
struct Session {
    stop: AtomicBool,
    recorders: Mutex<Recorders>,
    recording: AtomicBool,
}

impl Session {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct RunningLoop {
    session: Arc<Session>,
    thread: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
    release: Option<ReleaseHandle>,
}

impl RunningLoop {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }
}

/// Control handle for one camera
pub struct CameraWorker {
    shared: Arc<Shared>,
    device: Box<dyn CaptureDevice>,
    // Serializes start and stop; `running` is only held briefly
    control: Mutex<()>,
    running: Mutex<Option<RunningLoop>>,
}

impl CameraWorker {
    pub fn new(
        camera_id: u32,
        settings: WorkerSettings,
        layout: ArtifactLayout,
        device: Box<dyn CaptureDevice>,
        encoders: Arc<dyn EncoderFactory>,
        detectors: Detectors,
        events: broadcast::Sender<CameraEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                camera_id,
                settings,
                layout,
                encoders,
                detectors: Mutex::new(detectors),
                mode: RwLock::new(Mode::Idle),
                latest: FrameSlot::new(),
                events,
            }),
            device,
            control: Mutex::new(()),
            running: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.shared.camera_id
    }

    /// Start capturing in `mode`. If already running only the mode changes.
    pub fn start(&self, mode: Mode) -> AppResult<()> {
        let camera_id = self.shared.camera_id;
        let _control = self.control.lock();

        let finished = {
            let mut running = self.running.lock();
            if running.as_ref().is_some_and(RunningLoop::is_alive) {
                *self.shared.mode.write() = mode;
                tracing::info!("Camera {} switched to {:?}", camera_id, mode);
                return Ok(());
            }
            running.take()
        };
        if let Some(finished) = finished {
            // Loop ended on its own (panic); reap it before reopening
            if finished.thread.join().is_err() {
                tracing::warn!("Camera {} capture loop had panicked", camera_id);
            }
        }

        let source = self.device.open()?;
        let release = source.release_handle();
        *self.shared.mode.write() = mode;

        let session = self.shared.new_session();
        let (exit_tx, exited) = mpsc::channel();
        let mut capture =
            CaptureLoop::new(Arc::clone(&self.shared), Arc::clone(&session), source, exit_tx);

        let thread = thread::Builder::new()
            .name(format!("cam{}", camera_id))
            .spawn(move || capture.run())
            .map_err(|e| AppError::Worker(format!("failed to spawn capture thread: {}", e)))?;

        tracing::info!(
            "Camera {} started in {:?} on {}",
            camera_id,
            mode,
            self.device.describe()
        );
        *self.running.lock() = Some(RunningLoop {
            session,
            thread,
            exited,
            release,
        });
        Ok(())
    }

    /// Stop the capture thread, waiting at most the shutdown timeout.
    ///
    /// On timeout the device is released and the session's recorders
    /// closed from here; the thread is left to finish on its own and does
    /// no further recording.
    pub fn stop(&self) -> AppResult<()> {
        let camera_id = self.shared.camera_id;
        let _control = self.control.lock();
        let Some(active) = self.running.lock().take() else {
            return Ok(());
        };

        active.session.stop.store(true, Ordering::SeqCst);
        match active.exited.recv_timeout(self.shared.settings.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if active.thread.join().is_err() {
                    tracing::warn!("Camera {} capture loop had panicked", camera_id);
                }
                tracing::info!("Camera {} stopped", camera_id);
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Camera {} capture loop did not exit within {:?}, forcing release",
                    camera_id,
                    self.shared.settings.shutdown_timeout
                );
                if let Some(release) = &active.release {
                    release.release();
                }
                self.force_close_recorders(&active.session);
            }
        }

        active.session.recording.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn force_close_recorders(&self, session: &Session) {
        let camera_id = self.shared.camera_id;
        match session.recorders.try_lock_for(FORCED_CLOSE_WAIT) {
            Some(mut recorders) => recorders.close_all(camera_id, &self.shared.events),
            None => tracing::warn!(
                "Camera {} recorders still busy, they close when the loop exits",
                camera_id
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(RunningLoop::is_alive)
    }

    pub fn status(&self) -> CameraStatus {
        let recording = match self.running.lock().as_ref() {
            Some(active) if active.is_alive() => {
                Some(active.session.recording.load(Ordering::SeqCst))
            }
            _ => None,
        };
        CameraStatus {
            mode: recording.map(|_| *self.shared.mode.read()),
            recording: recording.unwrap_or(false),
        }
    }

    /// Copy of the most recent annotated frame
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.latest.latest()
    }

    /// Swap the motion mask used by the live detector
    pub fn update_mask(&self, mask: Option<Mask>) {
        self.shared.detectors.lock().motion.set_mask(mask);
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.shared.settings.width, self.shared.settings.height)
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Body of the capture thread. Cleanup runs in `Drop` so it also happens
/// when detection panics.
struct CaptureLoop {
    shared: Arc<Shared>,
    session: Arc<Session>,
    source: Box<dyn FrameSource>,
    preroll: PreRollBuffer,
    last_event: Option<Instant>,
    _exit: mpsc::Sender<()>,
}

impl CaptureLoop {
    fn new(
        shared: Arc<Shared>,
        session: Arc<Session>,
        source: Box<dyn FrameSource>,
        exit: mpsc::Sender<()>,
    ) -> Self {
        let preroll = PreRollBuffer::for_fps(shared.settings.fps);
        Self {
            shared,
            session,
            source,
            preroll,
            last_event: None,
            _exit: exit,
        }
    }

    fn run(&mut self) {
        tracing::debug!("Camera {} capture loop running", self.shared.camera_id);
        while !self.session.stop_requested() {
            let Some(frame) = self.source.read() else {
                thread::sleep(self.shared.settings.missing_frame_pause);
                continue;
            };
            self.process(frame, Instant::now());
            thread::sleep(self.shared.settings.loop_yield);
        }
    }

    /// One iteration for a frame captured at `now`.
    ///
    /// Nothing is recorded or published once stop has been requested, even
    /// if detection was already under way.
    fn process(&mut self, mut frame: Frame, now: Instant) {
        let mode = *self.shared.mode.read();
        let (motion_triggered, trigger) = self.detect(mode, &mut frame);

        let shared = Arc::clone(&self.shared);
        let session = Arc::clone(&self.session);
        let mut recorders = session.recorders.lock();
        if session.stop_requested() {
            tracing::debug!("Camera {} dropping frame after stop", shared.camera_id);
            return;
        }

        // Outside OnMotionRecord a running recording still winds down on its cooldown
        let record_trigger = mode.records_on_motion() && motion_triggered;
        match recorders.continuous.on_tick(now, record_trigger) {
            Ok(RecordingChange::Started(name)) => self.emit(CameraEvent::RecordingStarted {
                camera_id: shared.camera_id,
                name,
            }),
            Ok(RecordingChange::Stopped(name)) => self.emit(CameraEvent::RecordingStopped {
                camera_id: shared.camera_id,
                name,
            }),
            Ok(RecordingChange::Unchanged) => {}
            Err(e) => tracing::warn!("Camera {} recording failed: {}", shared.camera_id, e),
        }

        if let Some(trigger) = trigger {
            let debounced = self
                .last_event
                .map_or(true, |last| now.duration_since(last) > shared.settings.debounce);
            if debounced {
                self.record_event(&mut recorders, trigger, &frame, now);
            } else {
                recorders.clip.extend(now);
            }
        }

        match recorders.clip.feed(&frame, now) {
            Ok(true) => self.emit(CameraEvent::ClipClosed {
                camera_id: shared.camera_id,
            }),
            Ok(false) => {}
            Err(e) => tracing::warn!("Camera {} event clip write failed: {}", shared.camera_id, e),
        }

        if let Err(e) = recorders.continuous.write(&frame) {
            tracing::warn!("Camera {} recording write failed: {}", shared.camera_id, e);
        }
        session
            .recording
            .store(recorders.continuous.is_recording(), Ordering::SeqCst);
        drop(recorders);

        shared.latest.publish(&frame);
        self.preroll.push(frame);
    }

    /// Run the detectors for `mode`; draws overlays onto `frame`.
    ///
    /// Returns whether motion triggered, and the trigger to record. A face
    /// match supersedes the motion trigger of the same frame.
    fn detect(&self, mode: Mode, frame: &mut Frame) -> (bool, Option<TriggerEvent>) {
        if !mode.detects_motion() {
            return (false, None);
        }
        let camera_id = self.shared.camera_id;
        let mut detectors = self.shared.detectors.lock();

        let motion = detectors.motion.detect(frame).unwrap_or_else(|e| {
            tracing::debug!("Camera {} motion detection failed: {}", camera_id, e);
            MotionDetection::none()
        });
        let recognition = if mode.recognizes_faces() {
            match detectors.faces.recognize(frame) {
                Ok(recognition) => Some(recognition),
                Err(e) => {
                    tracing::debug!("Camera {} face recognition failed: {}", camera_id, e);
                    None
                }
            }
        } else {
            None
        };
        drop(detectors);

        let motion_triggered = motion.triggered;
        let mut detail = None;
        if motion_triggered {
            for rect in &motion.boxes {
                frame.draw_rect(*rect, MOTION_COLOR, OVERLAY_THICKNESS);
            }
            detail = Some(TriggerDetail::Motion {
                boxes: motion.boxes,
            });
        }

        if let Some(recognition) = recognition {
            if let Some(identity) = recognition.accepted(self.shared.settings.face_threshold) {
                if let Some(rect) = recognition.bbox {
                    frame.draw_rect(rect, FACE_COLOR, OVERLAY_THICKNESS);
                    frame.fill_rect(label_bar(rect), FACE_COLOR);
                }
                detail = Some(TriggerDetail::Face {
                    identity: identity.to_string(),
                    distance: recognition.distance,
                });
            }
        }

        let trigger = detail.map(|detail| TriggerEvent {
            detail,
            timestamp: Local::now(),
        });
        (motion_triggered, trigger)
    }

    /// Snapshot, open the clip with the pre-roll, log and broadcast
    fn record_event(
        &mut self,
        recorders: &mut Recorders,
        trigger: TriggerEvent,
        frame: &Frame,
        now: Instant,
    ) {
        let camera_id = self.shared.camera_id;
        let snapshot = self.write_snapshot(frame);

        let clip = match recorders.clip.open(&self.preroll.snapshot(), now) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("Camera {} failed to open event clip: {}", camera_id, e);
                None
            }
        };
        self.last_event = Some(now);

        let event_id = Uuid::new_v4();
        let detail = serde_json::to_string(&trigger.detail).unwrap_or_default();
        tracing::info!(
            target: "camwatch::events",
            camera = camera_id,
            event_id = %event_id,
            kind = trigger.detail.kind(),
            snapshot = snapshot.as_deref().unwrap_or("-"),
            clip = clip.as_deref().unwrap_or("-"),
            "EVENT {}",
            detail
        );

        self.emit(CameraEvent::EventRecorded {
            camera_id,
            event_id,
            trigger,
            snapshot,
            clip,
        });
    }

    fn write_snapshot(&self, frame: &Frame) -> Option<String> {
        let settings = &self.shared.settings;
        let path = self.shared.layout.snapshot_path(self.shared.camera_id, Local::now());
        let small = frame.resized(settings.clip_width, settings.clip_height);
        match self.shared.encoders.write_snapshot(&path, &small) {
            Ok(()) => Some(file_name(&path)),
            Err(e) => {
                tracing::warn!(
                    "Camera {} failed to write snapshot {:?}: {}",
                    self.shared.camera_id,
                    path,
                    e
                );
                None
            }
        }
    }

    fn emit(&self, event: CameraEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(event);
    }
}

/// Identity label strip above a face box, or below it when the box touches the top
fn label_bar(face: Rect) -> Rect {
    let y = if face.y >= LABEL_HEIGHT {
        face.y - LABEL_HEIGHT
    } else {
        face.y.saturating_add(face.height)
    };
    Rect::new(face.x, y, face.width, LABEL_HEIGHT)
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.source.release();
        self.session
            .recorders
            .lock()
            .close_all(self.shared.camera_id, &self.shared.events);
        self.session.recording.store(false, Ordering::SeqCst);
        tracing::debug!("Camera {} capture loop finished", self.shared.camera_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::NullRecognizer;
    use crate::testing::{CountingEncoders, FixedRecognizer, ScriptedDetector, ScriptedDevice};
    use std::sync::atomic::AtomicU64;

    const TICK: Duration = Duration::from_millis(100);

    fn settings() -> WorkerSettings {
        WorkerSettings {
            width: 8,
            height: 6,
            fps: 10,
            clip_width: 4,
            clip_height: 3,
            shutdown_timeout: Duration::from_millis(1000),
            ..WorkerSettings::default()
        }
    }

    struct Harness {
        worker: CameraWorker,
        encoders: Arc<CountingEncoders>,
        events: broadcast::Receiver<CameraEvent>,
        detector_calls: Arc<AtomicU64>,
        device_opens: Arc<AtomicU64>,
        device_released: Arc<AtomicBool>,
    }

    fn harness_with(
        settings: WorkerSettings,
        device: ScriptedDevice,
        detector: ScriptedDetector,
        faces: Box<dyn RecognitionPort>,
    ) -> Harness {
        let encoders = Arc::new(CountingEncoders::default());
        let (tx, events) = broadcast::channel(256);
        let detector_calls = Arc::clone(&detector.calls);
        let device_opens = Arc::clone(&device.opens);
        let device_released = Arc::clone(&device.released);
        let worker = CameraWorker::new(
            1,
            settings,
            ArtifactLayout::new("/tmp/rec", "/tmp/events"),
            Box::new(device),
            encoders.clone(),
            Detectors {
                motion: Box::new(detector),
                faces,
            },
            tx,
        );
        Harness {
            worker,
            encoders,
            events,
            detector_calls,
            device_opens,
            device_released,
        }
    }

    fn harness(detector: ScriptedDetector) -> Harness {
        harness_with(
            settings(),
            ScriptedDevice::new(8, 6),
            detector,
            Box::new(NullRecognizer),
        )
    }

    /// Capture loop with its own session, driven by hand instead of a thread
    fn manual_loop(worker: &CameraWorker, mode: Mode) -> CaptureLoop {
        *worker.shared.mode.write() = mode;
        let source = worker.device.open().unwrap();
        let (exit, _) = mpsc::channel();
        CaptureLoop::new(
            Arc::clone(&worker.shared),
            worker.shared.new_session(),
            source,
            exit,
        )
    }

    fn recording(capture: &CaptureLoop) -> bool {
        capture.session.recording.load(Ordering::SeqCst)
    }

    fn frame(value: u8) -> Frame {
        Frame::filled(8, 6, 3, value).unwrap()
    }

    fn drain(events: &mut broadcast::Receiver<CameraEvent>) -> Vec<CameraEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_motion_burst_records_single_event_with_preroll() {
        // Triggers on frames 5..=8 at 10 fps
        let mut h = harness(ScriptedDetector::triggering(5, 8));
        let mut capture = manual_loop(&h.worker, Mode::Motion);
        let t0 = Instant::now();

        let mut closed_at = None;
        for i in 0..60u32 {
            capture.process(frame(i as u8), t0 + TICK * i);
            let closed = drain(&mut h.events)
                .iter()
                .any(|e| matches!(e, CameraEvent::ClipClosed { .. }));
            if closed {
                closed_at = Some(i);
            }
            if i == 8 {
                let deadline = capture.session.recorders.lock().clip.deadline();
                assert_eq!(deadline, Some(t0 + TICK * 8 + Duration::from_secs(3)));
            }
        }

        assert_eq!(h.encoders.snapshots().len(), 1);
        assert_eq!(h.encoders.opened(), 1);
        assert_eq!(closed_at, Some(39));
        assert_eq!(h.encoders.open_handles(), 0);

        // Five pre-roll frames, then frames 5..=39
        let written = h.encoders.written_values(0);
        assert_eq!(written.len(), 40);
        assert_eq!(&written[..5], &[0, 1, 2, 3, 4]);
        assert!(h.encoders.written_sizes(0).iter().all(|&size| size == (4, 3)));
    }

    #[test]
    fn test_event_broadcast_carries_artifacts() {
        let mut h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::Motion);

        capture.process(frame(1), Instant::now());
        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CameraEvent::EventRecorded {
                camera_id,
                trigger,
                snapshot,
                clip,
                ..
            } => {
                assert_eq!(*camera_id, 1);
                assert_eq!(trigger.detail.kind(), "motion");
                assert!(snapshot.as_deref().unwrap().ends_with(".jpg"));
                assert!(clip.as_deref().unwrap().ends_with(".mp4"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_trigger_after_debounce_is_a_new_event() {
        let mut h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::Motion);
        let t0 = Instant::now();

        capture.process(frame(1), t0);
        capture.process(frame(2), t0 + Duration::from_millis(1500));
        assert_eq!(h.encoders.snapshots().len(), 1);
        capture.process(frame(3), t0 + Duration::from_millis(1600));
        assert_eq!(h.encoders.snapshots().len(), 2);

        let recorded = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, CameraEvent::EventRecorded { .. }))
            .count();
        assert_eq!(recorded, 2);
    }

    #[test]
    fn test_idle_mode_skips_detection() {
        let h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::Idle);

        for i in 0..10u32 {
            capture.process(frame(i as u8), Instant::now());
        }
        assert_eq!(h.detector_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.encoders.opened(), 0);
        assert_eq!(h.worker.latest_frame().unwrap().data()[0], 9);
    }

    #[test]
    fn test_detection_error_counts_as_no_trigger() {
        let h = harness(ScriptedDetector::new(|_| {
            Err(AppError::Detection("model missing".to_string()))
        }));
        let mut capture = manual_loop(&h.worker, Mode::OnMotionRecord);

        for i in 0..5u32 {
            capture.process(frame(i as u8), Instant::now());
        }
        assert_eq!(h.encoders.opened(), 0);
        assert!(h.encoders.snapshots().is_empty());
    }

    #[test]
    fn test_face_match_supersedes_motion() {
        let mut h = harness_with(
            settings(),
            ScriptedDevice::new(8, 6),
            ScriptedDetector::always(),
            Box::new(FixedRecognizer::new("alice", 42.0)),
        );
        let mut capture = manual_loop(&h.worker, Mode::Face);

        capture.process(frame(0), Instant::now());
        match drain(&mut h.events).first() {
            Some(CameraEvent::EventRecorded { trigger, .. }) => assert_eq!(
                trigger.detail,
                TriggerDetail::Face {
                    identity: "alice".to_string(),
                    distance: 42.0
                }
            ),
            other => panic!("unexpected event {:?}", other),
        }
        // Face box at the origin, label strip below it since the box touches the top
        let latest = h.worker.latest_frame().unwrap();
        assert_eq!(&latest.data()[..3], &FACE_COLOR);
        let below = (4 * 8 + 1) * 3;
        assert_eq!(&latest.data()[below..below + 3], &FACE_COLOR);
    }

    #[test]
    fn test_label_bar_sits_above_the_face_when_there_is_room() {
        assert_eq!(label_bar(Rect::new(10, 20, 30, 30)), Rect::new(10, 14, 30, LABEL_HEIGHT));
        assert_eq!(label_bar(Rect::new(10, 2, 30, 30)), Rect::new(10, 32, 30, LABEL_HEIGHT));
    }

    #[test]
    fn test_face_above_threshold_keeps_motion_trigger() {
        let mut h = harness_with(
            settings(),
            ScriptedDevice::new(8, 6),
            ScriptedDetector::always(),
            Box::new(FixedRecognizer::new("alice", 95.0)),
        );
        let mut capture = manual_loop(&h.worker, Mode::Face);

        capture.process(frame(0), Instant::now());
        match drain(&mut h.events).first() {
            Some(CameraEvent::EventRecorded { trigger, .. }) => {
                assert_eq!(trigger.detail.kind(), "motion")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_face_match_triggers_without_motion() {
        let recognizer = FixedRecognizer::new("alice", 10.0);
        let face_calls = Arc::clone(&recognizer.calls);
        let mut h = harness_with(
            settings(),
            ScriptedDevice::new(8, 6),
            ScriptedDetector::never(),
            Box::new(recognizer),
        );
        let mut capture = manual_loop(&h.worker, Mode::Face);

        capture.process(frame(0), Instant::now());
        assert_eq!(face_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.encoders.snapshots().len(), 1);
        match drain(&mut h.events).first() {
            Some(CameraEvent::EventRecorded { trigger, .. }) => {
                assert_eq!(trigger.detail.kind(), "face")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_motion_mode_skips_recognition() {
        let recognizer = FixedRecognizer::new("alice", 10.0);
        let face_calls = Arc::clone(&recognizer.calls);
        let h = harness_with(
            settings(),
            ScriptedDevice::new(8, 6),
            ScriptedDetector::always(),
            Box::new(recognizer),
        );
        let mut capture = manual_loop(&h.worker, Mode::Motion);

        capture.process(frame(0), Instant::now());
        assert_eq!(face_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_on_motion_record_runs_until_cooldown() {
        // Motion for the first 2.0s, then quiet
        let mut h = harness(ScriptedDetector::triggering(0, 20));
        let mut capture = manual_loop(&h.worker, Mode::OnMotionRecord);
        let t0 = Instant::now();

        let mut stopped_at = None;
        for i in 0..80u32 {
            capture.process(frame(i as u8), t0 + TICK * i);
            for event in drain(&mut h.events) {
                if matches!(event, CameraEvent::RecordingStopped { .. }) {
                    stopped_at = Some(i);
                }
            }
        }

        // Last trigger at 2.0s, cooldown 5s, first tick past 7.0s
        assert_eq!(stopped_at, Some(71));
        let recordings: Vec<_> = h
            .encoders
            .paths()
            .into_iter()
            .filter(|p| p.starts_with("/tmp/rec"))
            .collect();
        assert_eq!(recordings.len(), 1);
        assert_eq!(h.encoders.open_handles(), 0);
        assert!(!recording(&capture));
    }

    #[test]
    fn test_leaving_record_mode_finishes_cooldown() {
        let h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::OnMotionRecord);
        let t0 = Instant::now();

        capture.process(frame(0), t0);
        assert!(recording(&capture));

        *h.worker.shared.mode.write() = Mode::Idle;
        capture.process(frame(1), t0 + Duration::from_secs(4));
        assert!(recording(&capture));
        capture.process(frame(2), t0 + Duration::from_secs(6));
        assert!(!recording(&capture));
    }

    #[test]
    fn test_dropping_loop_closes_everything() {
        let h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::OnMotionRecord);

        capture.process(frame(0), Instant::now());
        assert_eq!(h.encoders.open_handles(), 2);
        drop(capture);
        assert_eq!(h.encoders.open_handles(), 0);
        assert!(h.device_released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stale_loop_only_closes_its_own_session() {
        let h = harness(ScriptedDetector::always());
        let stale = manual_loop(&h.worker, Mode::OnMotionRecord);
        let mut current = manual_loop(&h.worker, Mode::OnMotionRecord);

        current.process(frame(0), Instant::now());
        assert_eq!(h.encoders.open_handles(), 2);
        drop(stale);
        assert_eq!(h.encoders.open_handles(), 2);
        assert!(recording(&current));

        drop(current);
        assert_eq!(h.encoders.open_handles(), 0);
    }

    #[test]
    fn test_frame_after_stop_request_records_nothing() {
        let mut h = harness(ScriptedDetector::always());
        let mut capture = manual_loop(&h.worker, Mode::OnMotionRecord);

        capture.session.stop.store(true, Ordering::SeqCst);
        capture.process(frame(7), Instant::now());
        assert_eq!(h.encoders.opened(), 0);
        assert!(h.encoders.snapshots().is_empty());
        assert!(drain(&mut h.events).is_empty());
        assert!(h.worker.latest_frame().is_none());
    }

    #[test]
    fn test_encoder_failure_still_detects_and_streams() {
        let mut h = harness(ScriptedDetector::always());
        h.encoders.fail_opens(true);
        let mut capture = manual_loop(&h.worker, Mode::Motion);
        let t0 = Instant::now();

        for i in 0..20u32 {
            capture.process(frame(i as u8), t0 + TICK * i);
            // Motion box starts at (1, 1), so the first pixel keeps the frame value
            assert_eq!(h.worker.latest_frame().unwrap().data()[0], i as u8);
        }

        // Events at 0.0s and 1.6s
        assert_eq!(h.encoders.snapshots().len(), 2);
        assert_eq!(h.encoders.opened(), 0);
        let recorded: Vec<_> = drain(&mut h.events)
            .into_iter()
            .filter_map(|event| match event {
                CameraEvent::EventRecorded { snapshot, clip, .. } => Some((snapshot, clip)),
                _ => None,
            })
            .collect();
        assert_eq!(recorded.len(), 2);
        for (snapshot, clip) in recorded {
            assert!(snapshot.is_some());
            assert_eq!(clip, None);
        }
    }

    #[test]
    fn test_start_and_stop_thread() {
        let h = harness(ScriptedDetector::always());
        assert_eq!(h.worker.status().mode, None);

        h.worker.start(Mode::OnMotionRecord).unwrap();
        assert!(wait_for(|| h.worker.status().recording));
        assert_eq!(h.worker.status().mode, Some(Mode::OnMotionRecord));
        assert!(h.worker.latest_frame().is_some());

        h.worker.stop().unwrap();
        assert_eq!(h.encoders.open_handles(), 0);
        assert_eq!(
            h.worker.status(),
            CameraStatus {
                mode: None,
                recording: false
            }
        );
        assert!(h.device_released.load(Ordering::SeqCst));

        // Second stop is a no-op
        h.worker.stop().unwrap();
    }

    #[test]
    fn test_start_while_running_only_changes_mode() {
        let h = harness(ScriptedDetector::never());
        let opens = Arc::clone(&h.device_opens);

        h.worker.start(Mode::Idle).unwrap();
        h.worker.start(Mode::Motion).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(h.worker.status().mode, Some(Mode::Motion));
        h.worker.stop().unwrap();

        h.worker.start(Mode::Face).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        h.worker.stop().unwrap();
    }

    #[test]
    fn test_start_failure_leaves_camera_stopped() {
        let mut device = ScriptedDevice::new(8, 6);
        device.fail = true;
        let h = harness_with(
            settings(),
            device,
            ScriptedDetector::never(),
            Box::new(NullRecognizer),
        );

        assert!(matches!(h.worker.start(Mode::Motion), Err(AppError::Capture(_))));
        assert_eq!(h.worker.status().mode, None);
    }

    #[test]
    fn test_stop_is_bounded_when_loop_hangs() {
        let settings = WorkerSettings {
            shutdown_timeout: Duration::from_millis(50),
            ..settings()
        };
        let h = harness_with(
            settings,
            ScriptedDevice::new(8, 6),
            ScriptedDetector::never().with_delay(Duration::from_millis(1500)),
            Box::new(NullRecognizer),
        );

        // First frame goes into a detector call that outlasts the timeout
        h.worker.start(Mode::Motion).unwrap();
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        h.worker.stop().unwrap();
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(h.device_released.load(Ordering::SeqCst));
        assert_eq!(h.worker.status().mode, None);
        assert_eq!(h.encoders.open_handles(), 0);
    }

    #[test]
    fn test_nothing_recorded_after_timed_out_stop() {
        let settings = WorkerSettings {
            shutdown_timeout: Duration::from_millis(50),
            ..settings()
        };
        let mut h = harness_with(
            settings,
            ScriptedDevice::new(8, 6),
            ScriptedDetector::always().with_delay(Duration::from_millis(400)),
            Box::new(NullRecognizer),
        );

        h.worker.start(Mode::OnMotionRecord).unwrap();
        thread::sleep(Duration::from_millis(100));
        h.worker.stop().unwrap();

        // Let the detector call in flight finish
        thread::sleep(Duration::from_millis(500));
        assert_eq!(h.encoders.opened(), 0);
        assert!(h.encoders.snapshots().is_empty());
        assert_eq!(h.encoders.open_handles(), 0);
        assert!(!drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, CameraEvent::EventRecorded { .. })));
    }

    #[test]
    fn test_status_answers_while_stop_waits() {
        let settings = WorkerSettings {
            shutdown_timeout: Duration::from_millis(800),
            ..settings()
        };
        let h = harness_with(
            settings,
            ScriptedDevice::new(8, 6),
            ScriptedDetector::never().with_delay(Duration::from_millis(1500)),
            Box::new(NullRecognizer),
        );
        h.worker.start(Mode::Motion).unwrap();
        thread::sleep(Duration::from_millis(100));

        thread::scope(|scope| {
            scope.spawn(|| h.worker.stop().unwrap());
            thread::sleep(Duration::from_millis(50));

            let asked = Instant::now();
            assert_eq!(h.worker.status().mode, None);
            assert!(asked.elapsed() < Duration::from_millis(200));
        });
    }

    #[test]
    fn test_latest_frame_is_never_torn_while_running() {
        let h = harness(ScriptedDetector::never());
        h.worker.start(Mode::Idle).unwrap();
        assert!(wait_for(|| h.worker.latest_frame().is_some()));

        for _ in 0..200 {
            let frame = h.worker.latest_frame().unwrap();
            let first = frame.data()[0];
            assert!(frame.data().iter().all(|&v| v == first));
        }
        h.worker.stop().unwrap();
    }
}
