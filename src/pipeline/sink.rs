//! Status delivery from the worker to the presentation thread.
//!
//! The worker only ever calls [`StatusSink::post`]. The presentation side owns
//! a [`StatusReceiver`] and drains it on its own schedule.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::Duration;

/// Thread-safe target for status text.
pub trait StatusSink: Send + Sync {
    /// Hand a status line to the presentation layer. Must not block.
    fn post(&self, status: String);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Sending half of a status channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<String>,
}

impl StatusSink for ChannelSink {
    fn post(&self, status: String) {
        // A closed receiver means the presentation side is gone; nothing to do.
        let _ = self.tx.send(status);
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Receiving half of a status channel, owned by the presentation thread.
pub struct StatusReceiver {
    rx: Receiver<String>,
}

impl StatusReceiver {
    /// Drain everything queued and return the newest message, if any.
    ///
    /// Status text overwrites, so older queued lines are irrelevant.
    pub fn latest(&self) -> Option<String> {
        self.rx.try_iter().last()
    }

    /// Every queued message, oldest first, without waiting.
    pub fn try_iter(&self) -> impl Iterator<Item = String> + '_ {
        self.rx.try_iter()
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(status) => Some(status),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Create a connected sink/receiver pair.
pub fn status_channel() -> (ChannelSink, StatusReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ChannelSink { tx }, StatusReceiver { rx })
}

/// Sink that keeps every status line, for tests.
#[derive(Default)]
pub struct CollectorSink {
    collected: Mutex<Vec<String>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.collected.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.collected.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.lock().is_empty()
    }
}

impl StatusSink for CollectorSink {
    fn post(&self, status: String) {
        self.collected.lock().push(status);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
