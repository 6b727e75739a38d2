use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::image::Image;

/// Single-slot frame mailbox.
///
/// A new frame always replaces an unread one, so the reader only ever sees
/// the most recent frame. Older unread frames are dropped and counted.
pub struct MailboxSource {
    slot: Mutex<Option<Image>>,
    ready: Condvar,
    dropped: AtomicU64,
}

impl MailboxSource {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Frames overwritten before anyone read them.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn has_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for MailboxSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MailboxSource {
    fn update(&self, image: Image) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stale) = slot.replace(image) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropping unread frame {}", stale.index());
        }
        self.ready.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<Image> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(image) = slot.take() {
                return Some(image);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_without_frame() {
        let source = MailboxSource::new();
        let start = Instant::now();
        assert!(source.wait(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_returns_pending_frame_immediately() {
        let source = MailboxSource::new();
        source.update(Image::blank(2, 2, 4));
        let image = source.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(image.index(), 4);
        assert!(!source.has_pending());
    }

    #[test]
    fn test_newer_frame_overwrites_unread_frame() {
        let source = MailboxSource::new();
        source.update(Image::blank(2, 2, 1));
        source.update(Image::blank(2, 2, 2));
        source.update(Image::blank(2, 2, 3));
        assert_eq!(source.wait(Duration::from_millis(10)).unwrap().index(), 3);
        assert_eq!(source.dropped_frames(), 2);
        assert!(source.wait(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_frame_is_consumed_once() {
        let source = MailboxSource::new();
        source.update(Image::blank(1, 1, 0));
        assert!(source.wait(Duration::from_millis(10)).is_some());
        assert!(source.wait(Duration::from_millis(10)).is_none());
        assert_eq!(source.dropped_frames(), 0);
    }

    #[test]
    fn test_blocked_reader_wakes_on_update() {
        let source = Arc::new(MailboxSource::new());
        let reader = {
            let source = source.clone();
            thread::spawn(move || source.wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        source.update(Image::blank(1, 1, 8));
        let image = reader.join().unwrap().unwrap();
        assert_eq!(image.index(), 8);
    }
}
