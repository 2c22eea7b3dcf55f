//! Frame source backed by a blocking capture device.
//!
//! A dedicated reader thread pulls frames from the device and publishes each
//! one into a latest-wins slot. The pipeline never waits on the device.

use crate::capture::frame::Frame;
use crate::capture::slot::{FrameGuard, LatestFrame};
use crate::capture::source::FrameSource;
use crate::defaults;
use crate::error::{Result, VisionError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Driver boundary for a capture device.
///
/// Implementations block in `read_frame` until a frame is ready or a short
/// timeout passes (returning `Ok(None)`), so the reader thread can notice stop
/// requests.
pub trait CaptureDevice: Send + 'static {
    /// Open the device for `width`×`height` RGB frames.
    fn open(&mut self, width: u32, height: u32) -> Result<()>;

    /// Read the next frame.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Called at most once per successful `open`.
    fn close(&mut self);

    /// Device name for logging.
    fn name(&self) -> &str;
}

/// `FrameSource` driving any `CaptureDevice` from a reader thread.
pub struct DeviceFrameSource {
    device: Arc<Mutex<Box<dyn CaptureDevice>>>,
    slot: Arc<LatestFrame>,
    capturing: Arc<AtomicBool>,
    opened: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceFrameSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            slot: Arc::new(LatestFrame::new()),
            capturing: Arc::new(AtomicBool::new(false)),
            opened: AtomicBool::new(false),
            reader: Mutex::new(None),
        }
    }

    /// Frame guards handed out and not yet released.
    pub fn outstanding_frames(&self) -> usize {
        self.slot.outstanding()
    }

    /// Join the reader and close the device if it is still open.
    ///
    /// Returns whether there was anything to release.
    async fn release(&self) -> Result<bool> {
        let reader = self.reader.lock().take();
        let was_open = self.opened.swap(false, Ordering::SeqCst);
        if reader.is_none() && !was_open {
            return Ok(false);
        }

        let device = self.device.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(handle) = reader
                && handle.join().is_err()
            {
                tracing::error!("capture reader thread panicked");
            }
            if was_open {
                device.lock().close();
            }
        })
        .await
        .map_err(|e| VisionError::Capture {
            message: format!("device close task failed: {e}"),
        })?;

        self.slot.clear();
        Ok(true)
    }

    fn spawn_reader(&self) -> Result<JoinHandle<()>> {
        let device = self.device.clone();
        let slot = self.slot.clone();
        let capturing = self.capturing.clone();

        thread::Builder::new()
            .name("capture-reader".to_string())
            .spawn(move || read_loop(device, slot, capturing))
            .map_err(|e| VisionError::CaptureInit {
                message: format!("failed to spawn capture thread: {e}"),
            })
    }
}

fn read_loop(
    device: Arc<Mutex<Box<dyn CaptureDevice>>>,
    slot: Arc<LatestFrame>,
    capturing: Arc<AtomicBool>,
) {
    let mut consecutive_errors: u32 = 0;

    while capturing.load(Ordering::SeqCst) {
        let result = device.lock().read_frame();
        match result {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                slot.publish(frame);
            }
            Ok(None) => {}
            Err(e) => {
                consecutive_errors += 1;
                tracing::debug!("capture read failed ({consecutive_errors} in a row): {e}");
                if consecutive_errors >= defaults::MAX_CONSECUTIVE_CAPTURE_ERRORS {
                    tracing::error!(
                        "capture failed {consecutive_errors} times in a row, giving up: {e}"
                    );
                    capturing.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for DeviceFrameSource {
    async fn start(&self, width: u32, height: u32) -> Result<()> {
        if self.capturing.load(Ordering::SeqCst) {
            return Ok(());
        }

        // A reader that gave up after repeated errors leaves the device open.
        let released = self
            .release()
            .await
            .map_err(|e| VisionError::CaptureInit {
                message: e.to_string(),
            })?;
        if released {
            tracing::debug!("closed device left open by a failed capture");
        }

        let device = self.device.clone();
        let name = tokio::task::spawn_blocking(move || {
            let mut device = device.lock();
            device.open(width, height)?;
            Ok::<_, VisionError>(device.name().to_string())
        })
        .await
        .map_err(|e| VisionError::CaptureInit {
            message: format!("device open task failed: {e}"),
        })??;
        self.opened.store(true, Ordering::SeqCst);

        self.capturing.store(true, Ordering::SeqCst);
        match self.spawn_reader() {
            Ok(handle) => {
                *self.reader.lock() = Some(handle);
                tracing::info!("capture started on '{name}' at {width}x{height}");
                Ok(())
            }
            Err(e) => {
                self.capturing.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn latest_frame(&self) -> Option<FrameGuard> {
        if !self.is_capturing() {
            return None;
        }
        self.slot.acquire()
    }

    async fn stop(&self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if !self.release().await? {
            return Ok(());
        }

        tracing::info!(
            "capture stopped ({} frames captured, {} dropped unread)",
            self.slot.published(),
            self.slot.dropped()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "device"
    }

    fn frame_counters(&self) -> (u64, u64) {
        (self.slot.published(), self.slot.dropped())
    }
}

impl Drop for DeviceFrameSource {
    fn drop(&mut self) {
        self.capturing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Device that emits numbered frames and counts lifecycle calls.
    struct CountingDevice {
        next: u64,
        fail_open: bool,
        fail_reads: bool,
        opens: Arc<AtomicU32>,
        closes: Arc<AtomicU32>,
        shape: (u32, u32),
    }

    impl CountingDevice {
        fn new(opens: Arc<AtomicU32>, closes: Arc<AtomicU32>) -> Self {
            Self {
                next: 0,
                fail_open: false,
                fail_reads: false,
                opens,
                closes,
                shape: (0, 0),
            }
        }
    }

    impl CaptureDevice for CountingDevice {
        fn open(&mut self, width: u32, height: u32) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(VisionError::CaptureInit {
                    message: "no such device".to_string(),
                });
            }
            self.shape = (width, height);
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            thread::sleep(Duration::from_millis(2));
            if self.fail_reads {
                return Err(VisionError::Capture {
                    message: "unplugged".to_string(),
                });
            }
            self.next += 1;
            Ok(Some(Frame::solid(self.shape.0, self.shape.1, [0, 0, 0], self.next)))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn counters() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        (Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)))
    }

    #[tokio::test]
    async fn test_start_then_frames_arrive() {
        let (opens, closes) = counters();
        let source = DeviceFrameSource::new(Box::new(CountingDevice::new(opens, closes)));

        source.start(8, 6).await.unwrap();
        assert!(source.is_capturing());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let frame = source.latest_frame().expect("frame should have arrived");
        assert_eq!((frame.width, frame.height), (8, 6));
        drop(frame);

        source.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_failure_is_capture_init() {
        let (opens, closes) = counters();
        let mut device = CountingDevice::new(opens, closes.clone());
        device.fail_open = true;
        let source = DeviceFrameSource::new(Box::new(device));

        let result = source.start(8, 6).await;
        assert!(matches!(result, Err(VisionError::CaptureInit { .. })));
        assert!(!source.is_capturing());

        source.stop().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_once() {
        let (opens, closes) = counters();
        let source = DeviceFrameSource::new(Box::new(CountingDevice::new(
            opens.clone(),
            closes.clone(),
        )));

        source.start(4, 4).await.unwrap();
        source.stop().await.unwrap();
        assert!(!source.is_capturing());
        source.stop().await.unwrap();
        assert!(!source.is_capturing());

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_ok() {
        let (opens, closes) = counters();
        let source = DeviceFrameSource::new(Box::new(CountingDevice::new(opens, closes)));
        assert!(source.stop().await.is_ok());
        assert!(!source.is_capturing());
    }

    #[tokio::test]
    async fn test_repeated_read_errors_end_capture() {
        let (opens, closes) = counters();
        let mut device = CountingDevice::new(opens, closes);
        device.fail_reads = true;
        let source = DeviceFrameSource::new(Box::new(device));

        source.start(4, 4).await.unwrap();
        // 10 failures × 2ms read time; give extra margin
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!source.is_capturing());
        assert!(source.latest_frame().is_none());
        source.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_after_read_errors_closes_before_reopening() {
        let (opens, closes) = counters();
        let mut device = CountingDevice::new(opens.clone(), closes.clone());
        device.fail_reads = true;
        let source = DeviceFrameSource::new(Box::new(device));

        source.start(4, 4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!source.is_capturing());
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        source.start(4, 4).await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        source.stop().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_consumer_drops_frames() {
        let (opens, closes) = counters();
        let source = DeviceFrameSource::new(Box::new(CountingDevice::new(opens, closes)));

        source.start(4, 4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let first = source.latest_frame().unwrap().sequence;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = source.latest_frame().unwrap().sequence;
        source.stop().await.unwrap();

        assert!(second > first + 1, "intermediate frames should be skipped");
        let (published, dropped) = source.frame_counters();
        assert!(published >= second);
        assert!(dropped > 0);
    }
}
