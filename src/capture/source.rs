use crate::capture::frame::Frame;
use crate::capture::slot::{FrameGuard, LatestFrame};
use crate::error::{Result, VisionError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Trait for live frame sources.
///
/// Methods take `&self` because the inference worker reads the capturing flag
/// and the latest frame while the controller drives start/stop.
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync {
    /// Configure the device for `width`×`height` frames and begin capturing.
    ///
    /// Fails with `VisionError::CaptureInit` when no device is available or the
    /// format is unsupported. Starting an already capturing source is a no-op.
    async fn start(&self, width: u32, height: u32) -> Result<()>;

    /// Non-blocking capture state.
    fn is_capturing(&self) -> bool;

    /// Newest captured frame, or `None` if none has arrived yet.
    ///
    /// Never waits for a new frame: the same frame may be returned twice when
    /// the consumer is faster than the device.
    fn latest_frame(&self) -> Option<FrameGuard>;

    /// Release the device. Idempotent, and safe when `start` never succeeded.
    async fn stop(&self) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "frame-source"
    }

    /// Frames produced and frames overwritten unread, for diagnostics.
    fn frame_counters(&self) -> (u64, u64) {
        (0, 0)
    }
}

/// Mock frame source for testing
///
/// Serves a fixed frame (or nothing) from a latest-wins slot and counts how
/// often the pipeline touched it.
pub struct MockFrameSource {
    slot: LatestFrame,
    capturing: AtomicBool,
    start_error: Option<String>,
    starts: AtomicU32,
    stops: AtomicU32,
    acquisitions: AtomicU32,
    last_shape: parking_lot::Mutex<Option<(u32, u32)>>,
}

impl MockFrameSource {
    /// Create a mock source with no frame available.
    pub fn new() -> Self {
        Self {
            slot: LatestFrame::new(),
            capturing: AtomicBool::new(false),
            start_error: None,
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            acquisitions: AtomicU32::new(0),
            last_shape: parking_lot::Mutex::new(None),
        }
    }

    /// Configure the mock to serve this frame.
    pub fn with_frame(self, frame: Frame) -> Self {
        self.slot.publish(frame);
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Replace the frame served to readers.
    pub fn push_frame(&self, frame: Frame) {
        self.slot.publish(frame);
    }

    /// Simulate the device disappearing.
    pub fn simulate_fault(&self) {
        self.capturing.store(false, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of successful `latest_frame` calls.
    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Frame guards not yet released.
    pub fn outstanding_frames(&self) -> usize {
        self.slot.outstanding()
    }

    /// Shape requested by the last `start` call.
    pub fn requested_shape(&self) -> Option<(u32, u32)> {
        *self.last_shape.lock()
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FrameSource for MockFrameSource {
    async fn start(&self, width: u32, height: u32) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_shape.lock() = Some((width, height));
        if let Some(message) = &self.start_error {
            return Err(VisionError::CaptureInit {
                message: message.clone(),
            });
        }
        self.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn latest_frame(&self) -> Option<FrameGuard> {
        if !self.is_capturing() {
            return None;
        }
        let frame = self.slot.acquire()?;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn frame_counters(&self) -> (u64, u64) {
        (self.slot.published(), self.slot.dropped())
    }
}

/// Allow sharing one source between the controller and test code.
#[async_trait::async_trait]
impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    async fn start(&self, width: u32, height: u32) -> Result<()> {
        (**self).start(width, height).await
    }

    fn is_capturing(&self) -> bool {
        (**self).is_capturing()
    }

    fn latest_frame(&self) -> Option<FrameGuard> {
        (**self).latest_frame()
    }

    async fn stop(&self) -> Result<()> {
        (**self).stop().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn frame_counters(&self) -> (u64, u64) {
        (**self).frame_counters()
    }
}
