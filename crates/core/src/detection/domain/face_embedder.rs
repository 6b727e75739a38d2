use crate::identity::domain::encoding::Encoding;
use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

/// Domain interface for turning a detected face into a descriptor.
///
/// Paired with a detector: two faces of one person are expected to land
/// within a dissimilarity of about 0.36 of each other.
pub trait FaceEmbedder: Send {
    fn embed(
        &mut self,
        image: &Image,
        face: &Rectangle,
    ) -> Result<Encoding, Box<dyn std::error::Error>>;
}
