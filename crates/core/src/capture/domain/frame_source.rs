use std::time::Duration;

use crate::shared::image::Image;

/// Domain interface for a live frame feed.
///
/// A producer thread calls [`update`](FrameSource::update); the recognizer's
/// worker calls [`wait`](FrameSource::wait). Implementations synchronize
/// internally, so both sides share the source through an `Arc`.
pub trait FrameSource: Send + Sync {
    /// Submits a frame from the producer side.
    fn update(&self, image: Image);

    /// Blocks until a frame is available or `timeout` elapses.
    fn wait(&self, timeout: Duration) -> Option<Image>;
}
