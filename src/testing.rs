//! In-memory stand-ins for devices, detectors and encoders used by unit tests

use crate::capture::{CaptureDevice, Frame, FrameSource, Rect, ReleaseHandle};
use crate::detection::{DetectionPort, Mask, MotionDetection, Recognition, RecognitionPort};
use crate::recorder::{EncoderFactory, EncoderSink, VideoSpec};
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct SinkLog {
    path: PathBuf,
    frames: Vec<((u32, u32), u8)>,
    closed: bool,
}

#[derive(Default)]
struct EncoderLog {
    sinks: Vec<SinkLog>,
    snapshots: Vec<PathBuf>,
    fail_writes: bool,
    fail_opens: bool,
}

/// Records every sink it hands out and what was written into it
#[derive(Default)]
pub struct CountingEncoders {
    log: Arc<Mutex<EncoderLog>>,
}

impl CountingEncoders {
    pub fn opened(&self) -> usize {
        self.log.lock().sinks.len()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().sinks.iter().filter(|s| s.closed).count()
    }

    pub fn open_handles(&self) -> usize {
        self.opened() - self.closed()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.log.lock().sinks.iter().map(|s| s.path.clone()).collect()
    }

    /// First byte of every frame written to sink `index`
    pub fn written_values(&self, index: usize) -> Vec<u8> {
        self.log.lock().sinks[index].frames.iter().map(|(_, v)| *v).collect()
    }

    pub fn written_sizes(&self, index: usize) -> Vec<(u32, u32)> {
        self.log.lock().sinks[index].frames.iter().map(|(size, _)| *size).collect()
    }

    pub fn snapshots(&self) -> Vec<PathBuf> {
        self.log.lock().snapshots.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.log.lock().fail_writes = fail;
    }

    pub fn fail_opens(&self, fail: bool) {
        self.log.lock().fail_opens = fail;
    }
}

struct CountingSink {
    index: usize,
    log: Arc<Mutex<EncoderLog>>,
}

impl EncoderSink for CountingSink {
    fn write(&mut self, frame: &Frame) -> AppResult<()> {
        let mut log = self.log.lock();
        if log.fail_writes {
            return Err(AppError::Encoder("scripted write failure".to_string()));
        }
        let first = frame.data().first().copied().unwrap_or_default();
        log.sinks[self.index].frames.push((frame.dimensions(), first));
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        self.log.lock().sinks[self.index].closed = true;
        Ok(())
    }
}

impl EncoderFactory for CountingEncoders {
    fn open_video(&self, path: &Path, _spec: VideoSpec) -> AppResult<Box<dyn EncoderSink>> {
        let mut log = self.log.lock();
        if log.fail_opens {
            return Err(AppError::Encoder("scripted open failure".to_string()));
        }
        log.sinks.push(SinkLog {
            path: path.to_path_buf(),
            ..Default::default()
        });
        Ok(Box::new(CountingSink {
            index: log.sinks.len() - 1,
            log: Arc::clone(&self.log),
        }))
    }

    fn write_snapshot(&self, path: &Path, _frame: &Frame) -> AppResult<()> {
        self.log.lock().snapshots.push(path.to_path_buf());
        Ok(())
    }
}

/// Endless uniform frames whose value steps by one per read
pub struct ScriptedSource {
    width: u32,
    height: u32,
    next: u8,
    delay: Duration,
    released: Arc<AtomicBool>,
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Option<Frame> {
        if self.released.load(Ordering::SeqCst) {
            return None;
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let frame = Frame::filled(self.width, self.height, 3, self.next).ok();
        self.next = self.next.wrapping_add(1);
        frame
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn release_handle(&self) -> Option<ReleaseHandle> {
        let released = Arc::clone(&self.released);
        Some(ReleaseHandle::new(move || released.store(true, Ordering::SeqCst)))
    }
}

/// Device handing out `ScriptedSource`s
pub struct ScriptedDevice {
    pub width: u32,
    pub height: u32,
    pub delay: Duration,
    pub fail: bool,
    pub opens: Arc<AtomicU64>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            delay: Duration::from_millis(5),
            fail: false,
            opens: Arc::new(AtomicU64::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CaptureDevice for ScriptedDevice {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn open(&self) -> AppResult<Box<dyn FrameSource>> {
        if self.fail {
            return Err(AppError::Capture("scripted device unavailable".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            width: self.width,
            height: self.height,
            next: 0,
            delay: self.delay,
            released: Arc::clone(&self.released),
        }))
    }
}

/// Detector whose answer depends on how many times it was called
pub struct ScriptedDetector {
    pub calls: Arc<AtomicU64>,
    pub masks: Arc<AtomicU64>,
    script: Box<dyn Fn(u64) -> AppResult<MotionDetection> + Send>,
    delay: Duration,
}

impl ScriptedDetector {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(u64) -> AppResult<MotionDetection> + Send + 'static,
    {
        Self {
            calls: Arc::new(AtomicU64::new(0)),
            masks: Arc::new(AtomicU64::new(0)),
            script: Box::new(script),
            delay: Duration::ZERO,
        }
    }

    /// Trigger on the zero-based calls in `first..=last`
    pub fn triggering(first: u64, last: u64) -> Self {
        Self::new(move |call| {
            if (first..=last).contains(&call) {
                Ok(MotionDetection::from_boxes(vec![Rect::new(1, 1, 2, 2)]))
            } else {
                Ok(MotionDetection::none())
            }
        })
    }

    pub fn always() -> Self {
        Self::triggering(0, u64::MAX)
    }

    pub fn never() -> Self {
        Self::new(|_| Ok(MotionDetection::none()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl DetectionPort for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> AppResult<MotionDetection> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(call)
    }

    fn set_mask(&mut self, _mask: Option<Mask>) {
        self.masks.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recognizer returning the same answer every call
pub struct FixedRecognizer {
    pub answer: Recognition,
    pub calls: Arc<AtomicU64>,
}

impl FixedRecognizer {
    pub fn new(identity: &str, distance: f64) -> Self {
        Self {
            answer: Recognition {
                identity: Some(identity.to_string()),
                distance,
                bbox: Some(Rect::new(0, 0, 3, 3)),
            },
            calls: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl RecognitionPort for FixedRecognizer {
    fn recognize(&mut self, _frame: &Frame) -> AppResult<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
