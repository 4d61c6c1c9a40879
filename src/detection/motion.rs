//! Background-subtraction motion detector
//!
//! Keeps a running-average luminance background, marks pixels that
//! differ by more than `pixel_threshold`, aggregates them into grid cells
//! and groups 4-connected active cells into bounding boxes.

use super::mask::Mask;
use super::{DetectionPort, MotionDetection};
use crate::capture::{Frame, Rect};
use crate::config::MotionConfig;
use crate::utils::error::AppResult;
use std::collections::VecDeque;

/// Default `DetectionPort` implementation
pub struct MotionDetector {
    pixel_threshold: u8,
    learning_rate: f32,
    cell_size: u32,
    min_area: u64,
    mask: Option<Mask>,
    background: Option<Background>,
}

struct Background {
    width: u32,
    height: u32,
    luma: Vec<f32>,
}

impl MotionDetector {
    pub fn new(config: &MotionConfig, mask: Option<Mask>) -> Self {
        Self {
            pixel_threshold: config.pixel_threshold,
            learning_rate: config.learning_rate.clamp(0.0, 1.0),
            cell_size: config.cell_size.max(1),
            min_area: config.min_area,
            mask,
            background: None,
        }
    }

    fn seed(&mut self, frame: &Frame) {
        let (width, height) = frame.dimensions();
        let mut luma = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                luma.push(frame.luma_at(x, y) as f32);
            }
        }
        self.background = Some(Background { width, height, luma });
    }

    /// Per-cell foreground flags, updating the background as a side effect
    fn active_cells(&mut self, frame: &Frame) -> (Vec<bool>, u32, u32) {
        let (width, height) = frame.dimensions();
        let cell = self.cell_size;
        let cols = width.div_ceil(cell);
        let rows = height.div_ceil(cell);
        let mut counts = vec![0u32; (cols * rows) as usize];

        let threshold = self.pixel_threshold as f32;
        let rate = self.learning_rate;
        // Mask applies only when it matches the frame geometry
        let mask = self.mask.as_ref().filter(|m| m.dimensions() == (width, height));

        if let Some(bg) = self.background.as_mut() {
            for y in 0..height {
                for x in 0..width {
                    let idx = (y * width + x) as usize;
                    let value = frame.luma_at(x, y) as f32;
                    let diff = (value - bg.luma[idx]).abs();
                    bg.luma[idx] += rate * (value - bg.luma[idx]);

                    if diff <= threshold {
                        continue;
                    }
                    if let Some(mask) = mask {
                        if !mask.is_active(x, y) {
                            continue;
                        }
                    }
                    counts[((y / cell) * cols + x / cell) as usize] += 1;
                }
            }
        }

        // A cell is active when at least a quarter of its pixels changed
        let active = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let col = i as u32 % cols;
                let row = i as u32 / cols;
                let cw = cell.min(width - col * cell);
                let ch = cell.min(height - row * cell);
                count * 4 >= cw * ch && count > 0
            })
            .collect();
        (active, cols, rows)
    }

    fn group_cells(&self, active: &[bool], cols: u32, rows: u32, width: u32, height: u32) -> Vec<Rect> {
        let cell = self.cell_size;
        let mut seen = vec![false; active.len()];
        let mut boxes = Vec::new();

        for start in 0..active.len() {
            if !active[start] || seen[start] {
                continue;
            }
            let (mut min_c, mut min_r) = (u32::MAX, u32::MAX);
            let (mut max_c, mut max_r) = (0u32, 0u32);
            let mut queue = VecDeque::from([start]);
            seen[start] = true;

            while let Some(idx) = queue.pop_front() {
                let c = idx as u32 % cols;
                let r = idx as u32 / cols;
                min_c = min_c.min(c);
                min_r = min_r.min(r);
                max_c = max_c.max(c);
                max_r = max_r.max(r);

                let mut neighbours = Vec::with_capacity(4);
                if c > 0 {
                    neighbours.push(idx - 1);
                }
                if c + 1 < cols {
                    neighbours.push(idx + 1);
                }
                if r > 0 {
                    neighbours.push(idx - cols as usize);
                }
                if r + 1 < rows {
                    neighbours.push(idx + cols as usize);
                }
                for n in neighbours {
                    if active[n] && !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }

            let x = min_c * cell;
            let y = min_r * cell;
            let rect = Rect::new(
                x,
                y,
                ((max_c + 1) * cell).min(width) - x,
                ((max_r + 1) * cell).min(height) - y,
            );
            if rect.area() >= self.min_area {
                boxes.push(rect);
            }
        }
        boxes
    }
}

impl DetectionPort for MotionDetector {
    fn detect(&mut self, frame: &Frame) -> AppResult<MotionDetection> {
        let (width, height) = frame.dimensions();
        let reseed = match &self.background {
            Some(bg) => (bg.width, bg.height) != (width, height),
            None => true,
        };
        if reseed {
            self.seed(frame);
            return Ok(MotionDetection::none());
        }

        let (active, cols, rows) = self.active_cells(frame);
        let boxes = self.group_cells(&active, cols, rows, width, height);
        Ok(MotionDetection::from_boxes(boxes))
    }

    fn set_mask(&mut self, mask: Option<Mask>) {
        self.mask = mask;
    }
}
