//! Error types and handling
//!
//! Common error types used across the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Unknown camera: {0}")]
    UnknownCamera(u32),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Error response handed to the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Image(_) => "IMAGE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Encoder(_) => "ENCODER_ERROR",
            AppError::Detection(_) => "DETECTION_ERROR",
            AppError::UnknownCamera(_) => "UNKNOWN_CAMERA",
            AppError::Worker(_) => "WORKER_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
