use crate::identity::domain::encoding::FaceId;
use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

/// Optional debug sink handed to a recognizer at construction.
///
/// Called on the worker thread after each processed frame with the faces
/// resolved in it. Must return quickly: the interface lock is held.
pub trait FrameObserver: Send {
    fn observe(&mut self, image: &Image, faces: &[(FaceId, Rectangle)]);
}
