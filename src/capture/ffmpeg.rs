//! Camera capture through an FFmpeg child process
//!
//! FFmpeg reads the device and writes raw RGB24 frames to stdout; the
//! capture loop pulls exactly one frame worth of bytes per read.

use super::frame::Frame;
use super::traits::{CaptureDevice, FrameSource, ReleaseHandle};
use crate::utils::error::{AppError, AppResult};
use parking_lot::Mutex;
use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

/// FFmpeg-backed camera device
#[derive(Debug, Clone)]
pub struct FfmpegCaptureDevice {
    /// Device path or URL handed to `-i`
    input: String,
    /// FFmpeg demuxer (`v4l2`, `avfoundation`, `dshow`, ...)
    input_format: String,
    width: u32,
    height: u32,
    fps: u32,
}

impl FfmpegCaptureDevice {
    pub fn new(input: impl Into<String>, input_format: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            input: input.into(),
            input_format: input_format.into(),
            width,
            height,
            fps,
        }
    }

    /// Device path for a numeric index on the given demuxer
    pub fn device_path(input_format: &str, index: u32) -> String {
        match input_format {
            "v4l2" => format!("/dev/video{index}"),
            "dshow" => format!("video={index}"),
            _ => index.to_string(),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-i".to_string(),
            self.input.clone(),
            // Force exact output geometry even if the device negotiated another size
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

impl CaptureDevice for FfmpegCaptureDevice {
    fn describe(&self) -> String {
        format!("{} ({})", self.input, self.input_format)
    }

    fn open(&self) -> AppResult<Box<dyn FrameSource>> {
        let mut process = Command::new("ffmpeg")
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::Capture(format!("Failed to start FFmpeg capture for {}: {}", self.input, e)))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| AppError::Capture("Failed to capture FFmpeg stdout".to_string()))?;

        let frame_size = self.width as usize * self.height as usize * 3;

        tracing::info!(
            "Opened capture {}: {}x{} @ {}fps",
            self.describe(),
            self.width,
            self.height,
            self.fps
        );

        Ok(Box::new(FfmpegFrameSource {
            process: Arc::new(Mutex::new(Some(process))),
            stdout: Some(BufReader::with_capacity(frame_size * 2, stdout)),
            width: self.width,
            height: self.height,
            frame_size,
        }))
    }
}

/// Live FFmpeg capture session
struct FfmpegFrameSource {
    process: Arc<Mutex<Option<Child>>>,
    stdout: Option<BufReader<ChildStdout>>,
    width: u32,
    height: u32,
    frame_size: usize,
}

impl FrameSource for FfmpegFrameSource {
    fn read(&mut self) -> Option<Frame> {
        let stdout = self.stdout.as_mut()?;
        let mut buffer = vec![0u8; self.frame_size];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => Frame::new(self.width, self.height, 3, buffer).ok(),
            Err(e) => {
                tracing::debug!("Failed to read capture frame: {}", e);
                None
            }
        }
    }

    fn release(&mut self) {
        self.stdout = None;
        kill_process(&self.process);
    }

    fn release_handle(&self) -> Option<ReleaseHandle> {
        let process = Arc::clone(&self.process);
        Some(ReleaseHandle::new(move || kill_process(&process)))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn kill_process(process: &Mutex<Option<Child>>) {
    if let Some(mut child) = process.lock().take() {
        let _ = child.kill();
        let _ = child.wait();
        tracing::debug!("Capture process released");
    }
}
