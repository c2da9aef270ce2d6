use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has zero size: {width}x{height}")]
    Empty { width: usize, height: usize },
    #[error("Frame dimensions overflow: {width}x{height}")]
    TooLarge { width: usize, height: usize },
    #[error("Frame pixel count mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Direction along which the sensor is scanned to build a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAxis {
    /// One mean per column; the profile runs along the frame width.
    #[default]
    Columns,
    /// One mean per row; the profile runs along the frame height.
    Rows,
}

/// Raw 8-bit grayscale camera frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width
            .checked_mul(height)
            .ok_or(FrameError::TooLarge { width, height })?;
        if pixels.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Builds a frame where every row is `row`.
    pub fn from_row(row: &[u8], height: usize) -> Result<Self, FrameError> {
        let len = row.len().checked_mul(height).ok_or(FrameError::TooLarge {
            width: row.len(),
            height,
        })?;
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..height {
            pixels.extend_from_slice(row);
        }
        Self::new(row.len(), height, pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x]
    }
}
