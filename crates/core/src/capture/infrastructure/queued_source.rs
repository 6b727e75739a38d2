use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::constants::QUEUED_SOURCE_CAPACITY;
use crate::shared::image::Image;

/// Lossless frame source backed by a bounded channel.
///
/// `update` blocks while the queue is full instead of dropping frames, which
/// makes replays deterministic at the cost of live latency.
pub struct QueuedSource {
    tx: Sender<Image>,
    rx: Receiver<Image>,
}

impl QueuedSource {
    pub fn new() -> Self {
        Self::with_capacity(QUEUED_SOURCE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Frames submitted but not yet taken by a reader.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for QueuedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for QueuedSource {
    fn update(&self, image: Image) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(image);
    }

    fn wait(&self, timeout: Duration) -> Option<Image> {
        self.rx.recv_timeout(timeout).ok()
    }
}
