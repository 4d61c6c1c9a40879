//! Camera control commands
//!
//! Request/response types for the control surface and async handlers over
//! the registry. Start and stop block on device I/O and thread joins, so
//! they run on the blocking pool.

use crate::camera::{CameraRegistry, CameraStatus, Mode};
use crate::utils::error::{AppError, ErrorResponse};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// Body of a bulk start request, keyed by camera id.
///
/// `{"modes": {"0": "motion", "1": "face", "3": null}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModesRequest {
    #[serde(default)]
    pub modes: HashMap<String, Option<Mode>>,
}

impl ModesRequest {
    /// Numeric camera ids; entries with a non-numeric key are dropped
    pub fn parsed(&self) -> HashMap<u32, Option<Mode>> {
        self.modes
            .iter()
            .filter_map(|(key, mode)| match key.trim().parse::<u32>() {
                Ok(id) => Some((id, *mode)),
                Err(_) => {
                    tracing::warn!("Ignoring invalid camera id {:?}", key);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Mask file offered for download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

async fn blocking<T, F>(registry: Arc<CameraRegistry>, f: F) -> Result<T, ErrorResponse>
where
    T: Send + 'static,
    F: FnOnce(&CameraRegistry) -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&registry))
        .await
        .map_err(|e| ErrorResponse::from(AppError::Worker(e.to_string())))?
        .map_err(ErrorResponse::from)
}

/// Apply a bulk mode map: a mode starts (or retargets) a camera, `null` stops it
pub async fn start_cameras(
    registry: Arc<CameraRegistry>,
    request: ModesRequest,
) -> Result<OkResponse, ErrorResponse> {
    let modes = request.parsed();
    blocking(registry, move |registry| registry.apply_modes(&modes)).await?;
    Ok(OkResponse::ok())
}

pub async fn start_camera(
    registry: Arc<CameraRegistry>,
    camera_id: u32,
    mode: Mode,
) -> Result<OkResponse, ErrorResponse> {
    blocking(registry, move |registry| registry.start(camera_id, mode)).await?;
    Ok(OkResponse::ok())
}

pub async fn stop_camera(
    registry: Arc<CameraRegistry>,
    camera_id: u32,
) -> Result<OkResponse, ErrorResponse> {
    blocking(registry, move |registry| registry.stop(camera_id)).await?;
    Ok(OkResponse::ok())
}

/// Stop every camera
pub async fn stop_cameras(registry: Arc<CameraRegistry>) -> Result<OkResponse, ErrorResponse> {
    blocking(registry, |registry| {
        registry.stop_all();
        Ok(())
    })
    .await?;
    Ok(OkResponse::ok())
}

/// Status of every camera keyed by id
pub async fn get_status(registry: Arc<CameraRegistry>) -> BTreeMap<String, CameraStatus> {
    registry
        .status()
        .into_iter()
        .map(|(id, status)| (id.to_string(), status))
        .collect()
}

pub async fn upload_mask(
    registry: Arc<CameraRegistry>,
    camera_id: u32,
    bytes: Vec<u8>,
) -> Result<OkResponse, ErrorResponse> {
    blocking(registry, move |registry| registry.upload_mask(camera_id, &bytes)).await?;
    Ok(OkResponse::ok())
}

/// Current mask of a camera; a blank one is created first if missing
pub async fn download_mask(
    registry: Arc<CameraRegistry>,
    camera_id: u32,
) -> Result<MaskFile, ErrorResponse> {
    let path: PathBuf = blocking(registry, move |registry| registry.ensure_mask_file(camera_id)).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ErrorResponse::from(AppError::from(e)))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(MaskFile { file_name, bytes })
}
