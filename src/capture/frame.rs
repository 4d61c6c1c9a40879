//! Decoded video frames
//!
//! A `Frame` owns its pixel buffer. Handing a frame to another thread
//! always goes through `Clone`, so readers never share memory with the
//! capture loop.

use crate::utils::error::{AppError, AppResult};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Overlay color for motion boxes
pub const MOTION_COLOR: [u8; 3] = [0, 255, 0];

/// Overlay color for recognized faces
pub const FACE_COLOR: [u8; 3] = [0, 0, 255];

/// Interleaved 8-bit frame (1 = gray, 3 = RGB, 4 = RGBA)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a raw pixel buffer, checking it matches the declared geometry
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> AppResult<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(AppError::Capture(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(AppError::Capture(format!(
                "frame buffer is {} bytes, expected {} for {}x{}x{}",
                data.len(),
                expected,
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Frame filled with a single byte value
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> AppResult<Self> {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Luminance of the pixel at `(x, y)`
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let idx = self.offset(x, y);
        match self.channels {
            1 => self.data[idx],
            _ => {
                let r = self.data[idx] as u32;
                let g = self.data[idx + 1] as u32;
                let b = self.data[idx + 2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            }
        }
    }

    /// Resized copy of this frame
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        let data = match self.channels {
            1 => resize_raw::<Luma<u8>>(self, width, height),
            3 => resize_raw::<Rgb<u8>>(self, width, height),
            _ => resize_raw::<Rgba<u8>>(self, width, height),
        };
        Frame {
            width,
            height,
            channels: self.channels,
            data,
        }
    }

    /// Copy of the pixel data as packed RGB
    pub fn to_rgb(&self) -> Vec<u8> {
        match self.channels {
            3 => self.data.clone(),
            1 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            _ => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        }
    }

    /// Draw a rectangle outline, clipped to the frame
    pub fn draw_rect(&mut self, rect: Rect, color: [u8; 3], thickness: u32) {
        if self.width == 0 || self.height == 0 || rect.width == 0 || rect.height == 0 {
            return;
        }
        let x0 = rect.x.min(self.width - 1);
        let y0 = rect.y.min(self.height - 1);
        let x1 = rect.x.saturating_add(rect.width - 1).min(self.width - 1);
        let y1 = rect.y.saturating_add(rect.height - 1).min(self.height - 1);

        for t in 0..thickness {
            for x in x0..=x1 {
                self.put_pixel(x, y0.saturating_add(t).min(y1), color);
                self.put_pixel(x, y1.saturating_sub(t).max(y0), color);
            }
            for y in y0..=y1 {
                self.put_pixel(x0.saturating_add(t).min(x1), y, color);
                self.put_pixel(x1.saturating_sub(t).max(x0), y, color);
            }
        }
    }

    /// Fill a rectangle, clipped to the frame
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 3]) {
        let x1 = rect.x.saturating_add(rect.width).min(self.width);
        let y1 = rect.y.saturating_add(rect.height).min(self.height);
        for y in rect.y..y1 {
            for x in rect.x..x1 {
                self.put_pixel(x, y, color);
            }
        }
    }

    fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        let idx = self.offset(x, y);
        match self.channels {
            1 => {
                let [r, g, b] = color.map(u32::from);
                self.data[idx] = ((r * 299 + g * 587 + b * 114) / 1000) as u8;
            }
            3 => self.data[idx..idx + 3].copy_from_slice(&color),
            _ => {
                self.data[idx..idx + 3].copy_from_slice(&color);
                self.data[idx + 3] = u8::MAX;
            }
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }
}

fn resize_raw<P>(frame: &Frame, width: u32, height: u32) -> Vec<u8>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    // Geometry is validated in Frame::new, so from_raw cannot fail here.
    match ImageBuffer::<P, &[u8]>::from_raw(frame.width, frame.height, frame.data.as_slice()) {
        Some(view) => imageops::resize(&view, width, height, FilterType::Triangle).into_raw(),
        None => vec![0; width as usize * height as usize * frame.channels as usize],
    }
}
