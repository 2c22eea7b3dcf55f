//! Captured frame type.

use crate::error::{Result, VisionError};
use std::time::Instant;

/// A single captured RGB8 image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Interleaved RGB pixels, row-major, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Timestamp when this frame was captured.
    pub captured_at: Instant,
    /// Sequence number assigned by the capture device.
    pub sequence: u64,
}

impl Frame {
    /// Creates a new frame stamped with the current time.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
            sequence,
        }
    }

    /// Creates a frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(pixels, width, height, sequence)
    }

    /// Creates a frame from a decoded image.
    pub fn from_rgb_image(image: image::RgbImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, sequence)
    }

    /// Number of bytes an RGB8 buffer of these dimensions must hold.
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
    }

    /// Check that the buffer matches the declared dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VisionError::Inference {
                message: format!("frame has empty shape {}x{}", self.width, self.height),
            });
        }
        let expected = Self::expected_len(self.width, self.height).ok_or_else(|| {
            VisionError::Inference {
                message: "frame dimensions overflow".to_string(),
            }
        })?;
        if self.pixels.len() != expected {
            return Err(VisionError::Inference {
                message: format!(
                    "expected {} RGB bytes for {}x{}, received {}",
                    expected,
                    self.width,
                    self.height,
                    self.pixels.len()
                ),
            });
        }
        Ok(())
    }

    /// View the pixels as an `image` buffer. Fails when the frame is malformed.
    pub fn to_rgb_image(&self) -> Result<image::RgbImage> {
        self.validate()?;
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            VisionError::Inference {
                message: "frame buffer does not match its dimensions".to_string(),
            }
        })
    }
}
