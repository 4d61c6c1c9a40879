//! Binary detection masks
//!
//! White (non-zero after thresholding) pixels mark regions where motion
//! counts. Masks are stored as grayscale PNGs named `cam<id><suffix>`.

use crate::utils::error::AppResult;
use image::GrayImage;
use std::path::{Path, PathBuf};

/// Gray level above which a mask pixel is active
const MASK_THRESHOLD: u8 = 127;

/// Active-region mask for motion detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    active: Vec<bool>,
}

impl Mask {
    /// Threshold a grayscale image into a mask
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            active: image.pixels().map(|p| p.0[0] > MASK_THRESHOLD).collect(),
        }
    }

    /// Decode an uploaded image (any format the `image` crate reads)
    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        let image = image::load_from_memory(bytes)?.to_luma8();
        Ok(Self::from_gray(&image))
    }

    /// Load a mask file if it exists and decodes
    pub fn load(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match image::open(path) {
            Ok(image) => Some(Self::from_gray(&image.to_luma8())),
            Err(e) => {
                tracing::warn!("Ignoring unreadable mask {:?}: {}", path, e);
                None
            }
        }
    }

    /// Write the mask as a black/white PNG
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_image().save(path)?;
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_active(&self, x: u32, y: u32) -> bool {
        self.active[(y as usize) * (self.width as usize) + x as usize]
    }

    fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.is_active(x, y) { 255 } else { 0 }])
        })
    }
}

/// Location of a camera's mask file
pub fn mask_path(masks_dir: &Path, camera_id: u32, suffix: &str) -> PathBuf {
    masks_dir.join(format!("cam{camera_id}{suffix}"))
}

/// Create an all-black mask of the given size unless one already exists
pub fn ensure_mask_file(path: &Path, width: u32, height: u32) -> AppResult<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    GrayImage::new(width, height).save(path)?;
    tracing::info!("Created blank mask {:?}", path);
    Ok(())
}
