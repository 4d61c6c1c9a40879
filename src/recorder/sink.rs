//! Encoder sinks
//!
//! Recorders write frames into an `EncoderSink` obtained from an
//! `EncoderFactory`. The FFmpeg implementation pipes raw frames into an
//! `ffmpeg` child process; snapshots are encoded in-process as JPEG.

use crate::capture::Frame;
use crate::utils::error::{AppError, AppResult};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Geometry and rate of a video artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub channels: u8,
}

/// Open video encoder. Owned by exactly one recorder between open and close.
pub trait EncoderSink: Send {
    fn write(&mut self, frame: &Frame) -> AppResult<()>;

    /// Flush and release the encoder. Must be idempotent.
    fn close(&mut self) -> AppResult<()>;
}

/// Creates encoder sinks and writes still images
pub trait EncoderFactory: Send + Sync {
    fn open_video(&self, path: &Path, spec: VideoSpec) -> AppResult<Box<dyn EncoderSink>>;

    fn write_snapshot(&self, path: &Path, frame: &Frame) -> AppResult<()>;
}

/// JPEG-encode a frame
pub fn encode_jpeg(frame: &Frame, quality: u8) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    let rgb = frame.to_rgb();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        &rgb,
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// FFmpeg-backed encoders (H.264 in MP4) and JPEG snapshots
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    jpeg_quality: u8,
    preset: String,
    crf: u8,
}

impl FfmpegEncoderFactory {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality,
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }

    fn args(&self, path: &Path, spec: VideoSpec) -> Vec<String> {
        let pixel_format = match spec.channels {
            1 => "gray",
            3 => "rgb24",
            _ => "rgba",
        };
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            pixel_format.to_string(),
            "-s".to_string(),
            format!("{}x{}", spec.width, spec.height),
            "-r".to_string(),
            spec.fps.max(1).to_string(),
            "-i".to_string(),
            "-".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new(70)
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open_video(&self, path: &Path, spec: VideoSpec) -> AppResult<Box<dyn EncoderSink>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut process = Command::new("ffmpeg")
            .args(self.args(path, spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Encoder(format!("Failed to start FFmpeg encoder: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AppError::Encoder("Failed to capture FFmpeg stdin".to_string()))?;

        tracing::debug!(
            "Started FFmpeg encoder: {}x{} @ {}fps -> {:?}",
            spec.width,
            spec.height,
            spec.fps,
            path
        );

        Ok(Box::new(FfmpegVideoSink {
            process: Some(process),
            stdin: Some(stdin),
            spec,
            path: path.to_path_buf(),
            frame_count: 0,
        }))
    }

    fn write_snapshot(&self, path: &Path, frame: &Frame) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
        std::fs::write(path, jpeg)?;
        Ok(())
    }
}

/// Raw frames piped into one FFmpeg process
struct FfmpegVideoSink {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    spec: VideoSpec,
    path: PathBuf,
    frame_count: u64,
}

impl EncoderSink for FfmpegVideoSink {
    fn write(&mut self, frame: &Frame) -> AppResult<()> {
        if frame.dimensions() != (self.spec.width, self.spec.height) || frame.channels() != self.spec.channels {
            return Err(AppError::Encoder(format!(
                "frame {}x{}x{} does not match encoder {}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels(),
                self.spec.width,
                self.spec.height,
                self.spec.channels
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AppError::Encoder("encoder already closed".to_string()))?;
        stdin
            .write_all(frame.data())
            .map_err(|e| AppError::Encoder(format!("Failed to write frame to FFmpeg: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        // Closing stdin signals EOF so FFmpeg can finalize the container
        drop(self.stdin.take());
        let Some(process) = self.process.take() else {
            return Ok(());
        };
        let output = process.wait_with_output()?;
        tracing::debug!("FFmpeg encoder finished: {} frames -> {:?}", self.frame_count, self.path);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Encoder(format!(
                "FFmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegVideoSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Encoder for {:?} closed with error: {}", self.path, e);
        }
    }
}
