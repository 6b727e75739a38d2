use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

/// Domain interface for face detection.
///
/// Implementations may be stateful (e.g., replaying a recording), hence
/// `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &Image) -> Result<Vec<Rectangle>, Box<dyn std::error::Error>>;
}
