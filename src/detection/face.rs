//! Face recognition defaults
//!
//! Training and model persistence live outside this crate. Until a
//! trained recognizer is plugged in, cameras run with `NullRecognizer`.

use super::{Recognition, RecognitionPort};
use crate::capture::Frame;
use crate::utils::error::AppResult;

/// Recognizer with no loaded model; never identifies anyone
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecognizer;

impl RecognitionPort for NullRecognizer {
    fn recognize(&mut self, _frame: &Frame) -> AppResult<Recognition> {
        Ok(Recognition::unknown())
    }
}
