//! Replays a still image as if it were a camera.
//!
//! This is the "loaded/picked image" path: when no live device is wanted, an
//! image file is decoded once, resized to the requested shape and handed out
//! at a fixed rate.

use crate::capture::device::CaptureDevice;
use crate::capture::frame::Frame;
use crate::error::{Result, VisionError};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub struct StillImageDevice {
    path: PathBuf,
    fps: u32,
    image: Option<image::RgbImage>,
    sequence: u64,
}

impl StillImageDevice {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            fps,
            image: None,
            sequence: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decode an image file into an RGB frame, optionally resized.
pub fn load_image_frame(path: &Path, shape: Option<(u32, u32)>) -> Result<Frame> {
    let decoded = image::open(path).map_err(|e| VisionError::CaptureInit {
        message: format!("cannot read image {}: {e}", path.display()),
    })?;
    let rgb = match shape {
        Some((width, height)) if decoded.width() != width || decoded.height() != height => {
            image::imageops::resize(&decoded.to_rgb8(), width, height, FilterType::Triangle)
        }
        _ => decoded.to_rgb8(),
    };
    Ok(Frame::from_rgb_image(rgb, 0))
}

impl CaptureDevice for StillImageDevice {
    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(VisionError::CaptureInit {
                message: format!("unsupported frame size {width}x{height}"),
            });
        }
        let frame = load_image_frame(&self.path, Some((width, height)))?;
        let image = frame.to_rgb_image().map_err(|e| VisionError::CaptureInit {
            message: e.to_string(),
        })?;
        tracing::debug!(
            "loaded still image {} as {}x{}",
            self.path.display(),
            width,
            height
        );
        self.image = Some(image);
        self.sequence = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = &self.image else {
            return Err(VisionError::Capture {
                message: "device is not open".to_string(),
            });
        };
        let frame_image = image.clone();

        thread::sleep(Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1))));
        self.sequence += 1;
        Ok(Some(Frame::from_rgb_image(frame_image, self.sequence)))
    }

    fn close(&mut self) {
        self.image = None;
    }

    fn name(&self) -> &str {
        "still-image"
    }
}
