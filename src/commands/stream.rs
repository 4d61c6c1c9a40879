//! MJPEG live view
//!
//! Each viewer gets a task that samples the camera's latest frame at a
//! fixed rate and sends multipart JPEG parts. A white placeholder goes out
//! until the camera has produced a frame.

use crate::camera::CameraRegistry;
use crate::capture::Frame;
use crate::recorder::sink::encode_jpeg;
use crate::utils::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Content type of the multipart response carrying the parts
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PLACEHOLDER_WIDTH: u32 = 320;
const PLACEHOLDER_HEIGHT: u32 = 240;
const BUFFERED_PARTS: usize = 2;

/// Wrap a JPEG payload as one multipart part
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 48);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

fn placeholder(quality: u8) -> AppResult<Vec<u8>> {
    let blank = Frame::filled(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, 3, u8::MAX)?;
    encode_jpeg(&blank, quality)
}

/// Start streaming `camera_id` at `fps`. The task ends when the receiver is dropped.
pub fn mjpeg_stream(
    registry: Arc<CameraRegistry>,
    camera_id: u32,
    fps: u32,
    quality: u8,
) -> AppResult<mpsc::Receiver<Vec<u8>>> {
    if !registry.camera_ids().contains(&camera_id) {
        return Err(AppError::UnknownCamera(camera_id));
    }
    let blank = placeholder(quality)?;
    let (tx, rx) = mpsc::channel(BUFFERED_PARTS);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!("MJPEG viewer attached to camera {}", camera_id);

        loop {
            ticker.tick().await;
            let part = match registry.latest_frame(camera_id) {
                Some(frame) => match encode_jpeg(&frame, quality) {
                    Ok(jpeg) => multipart_part(&jpeg),
                    Err(e) => {
                        tracing::debug!("Skipping frame for camera {}: {}", camera_id, e);
                        continue;
                    }
                },
                None => multipart_part(&blank),
            };
            if tx.send(part).await.is_err() {
                break;
            }
        }
        tracing::debug!("MJPEG viewer detached from camera {}", camera_id);
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraWorker, Detectors, MaskStore, WorkerSettings};
    use crate::detection::NullRecognizer;
    use crate::recorder::ArtifactLayout;
    use crate::testing::{CountingEncoders, ScriptedDetector, ScriptedDevice};

    fn registry() -> Arc<CameraRegistry> {
        let mut registry = CameraRegistry::new(MaskStore {
            dir: std::env::temp_dir(),
            suffix: "_mask.png".to_string(),
        });
        let worker = CameraWorker::new(
            0,
            WorkerSettings {
                width: 16,
                height: 12,
                ..WorkerSettings::default()
            },
            ArtifactLayout::new("/tmp/rec", "/tmp/events"),
            Box::new(ScriptedDevice::new(16, 12)),
            Arc::new(CountingEncoders::default()),
            Detectors {
                motion: Box::new(ScriptedDetector::never()),
                faces: Box::new(NullRecognizer),
            },
            registry.event_sender(),
        );
        registry.insert(worker).unwrap();
        Arc::new(registry)
    }

    fn jpeg_of(part: &[u8]) -> &[u8] {
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(header));
        assert!(part.ends_with(b"\r\n"));
        &part[header.len()..part.len() - 2]
    }

    #[tokio::test]
    async fn test_placeholder_before_first_frame() {
        let mut parts = mjpeg_stream(registry(), 0, 30, 80).unwrap();
        let part = parts.recv().await.unwrap();
        let image = image::load_from_memory(jpeg_of(&part)).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (320, 240));
        assert!(image.get_pixel(10, 10).0.iter().all(|&v| v > 240));
    }

    #[tokio::test]
    async fn test_streams_live_frames() {
        let registry = registry();
        registry.start(0, crate::camera::Mode::Idle).unwrap();
        let mut parts = mjpeg_stream(registry.clone(), 0, 50, 80).unwrap();

        let mut saw_live = false;
        for _ in 0..100 {
            let part = parts.recv().await.unwrap();
            let image = image::load_from_memory(jpeg_of(&part)).unwrap();
            if image.width() == 16 {
                saw_live = true;
                break;
            }
        }
        assert!(saw_live);
        drop(parts);
        registry.stop_all();
    }

    #[test]
    fn test_unknown_camera_rejected() {
        assert!(matches!(
            mjpeg_stream(registry(), 9, 10, 80),
            Err(AppError::UnknownCamera(9))
        ));
    }
}
