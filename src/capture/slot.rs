//! Single-slot "latest frame wins" cell.
//!
//! The capture thread overwrites the slot with every new frame; readers take
//! a cheap `Arc` clone of whatever is newest and never wait. Frames that are
//! overwritten before anyone reads them are counted as dropped.

use crate::capture::frame::Frame;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct Slot {
    frame: Arc<Frame>,
    read: bool,
}

/// Overwrite-on-publish frame cell with non-blocking reads.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Slot>>,
    published: AtomicU64,
    dropped: AtomicU64,
    outstanding: Arc<AtomicUsize>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: Frame) {
        let previous = self.slot.lock().replace(Slot {
            frame: Arc::new(frame),
            read: false,
        });
        self.published.fetch_add(1, Ordering::Relaxed);
        if matches!(previous, Some(Slot { read: false, .. })) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a scoped reference to the newest frame, if any has arrived.
    pub fn acquire(&self) -> Option<FrameGuard> {
        let mut slot = self.slot.lock();
        let current = slot.as_mut()?;
        current.read = true;
        Some(FrameGuard::new(current.frame.clone(), self.outstanding.clone()))
    }

    /// Forget the current frame.
    pub fn clear(&self) {
        self.slot.lock().take();
    }

    /// Frames published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames overwritten before any reader saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Guards currently held by readers.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Scoped access to an acquired frame. Released when dropped.
pub struct FrameGuard {
    frame: Arc<Frame>,
    outstanding: Arc<AtomicUsize>,
}

impl FrameGuard {
    fn new(frame: Arc<Frame>, outstanding: Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        Self { frame, outstanding }
    }
}

impl Deref for FrameGuard {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for FrameGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard")
            .field("sequence", &self.frame.sequence)
            .field("width", &self.frame.width)
            .field("height", &self.frame.height)
            .finish()
    }
}
