//! Built-in test-pattern camera.
//!
//! Produces a horizontal gradient with a bright vertical bar that moves one
//! step per frame, paced to the configured frame rate.

use crate::capture::device::CaptureDevice;
use crate::capture::frame::Frame;
use crate::error::{Result, VisionError};
use std::thread;
use std::time::{Duration, Instant};

/// Width of the moving bar in pixels.
const BAR_WIDTH: u32 = 8;

pub struct SyntheticDevice {
    fps: u32,
    shape: Option<(u32, u32)>,
    sequence: u64,
    next_due: Option<Instant>,
}

impl SyntheticDevice {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            shape: None,
            sequence: 0,
            next_due: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    fn render(width: u32, height: u32, sequence: u64) -> Frame {
        let bar_start = (sequence * 4 % u64::from(width)) as u32;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);

        for _y in 0..height {
            for x in 0..width {
                let shade = (x * 255 / width.max(1)) as u8;
                let on_bar = x >= bar_start && x < bar_start.saturating_add(BAR_WIDTH);
                if on_bar {
                    pixels.extend_from_slice(&[255, 255, 255]);
                } else {
                    pixels.extend_from_slice(&[shade, 64, 255 - shade]);
                }
            }
        }

        Frame::new(pixels, width, height, sequence)
    }
}

impl CaptureDevice for SyntheticDevice {
    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(VisionError::CaptureInit {
                message: format!("unsupported frame size {width}x{height}"),
            });
        }
        if self.fps == 0 {
            return Err(VisionError::CaptureInit {
                message: "frame rate must be greater than 0".to_string(),
            });
        }
        self.shape = Some((width, height));
        self.sequence = 0;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some((width, height)) = self.shape else {
            return Err(VisionError::Capture {
                message: "device is not open".to_string(),
            });
        };

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + self.frame_interval());

        self.sequence += 1;
        Ok(Some(Self::render(width, height, self.sequence)))
    }

    fn close(&mut self) {
        self.shape = None;
        self.next_due = None;
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
