use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::image::Image;

/// Reads a directory of still images as a frame sequence.
///
/// Files are taken in name order and decoded lazily to packed RGB, so a
/// producer can pace them into a [`FrameSource`](crate::capture::domain::frame_source::FrameSource).
pub struct ImageSequence {
    paths: Vec<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(format!("No images found in {}", dir.display()).into());
        }
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Decodes frames in order; the n-th image gets index `first_index + n`.
    pub fn frames(
        &self,
        first_index: usize,
    ) -> impl Iterator<Item = Result<Image, Box<dyn std::error::Error>>> + '_ {
        self.paths
            .iter()
            .enumerate()
            .map(move |(i, path)| load_image(path, first_index + i))
    }
}

pub fn load_image(path: &Path, index: usize) -> Result<Image, Box<dyn std::error::Error>> {
    let rgb = image::open(path)
        .map_err(|e| format!("Failed to decode {}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Image::new(rgb.into_raw(), width, height, index))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32, r: u8) -> PathBuf {
        let path = dir.join(name);
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([r, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_frames_in_name_order_with_indices() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "b.png", 4, 3, 20);
        write_test_image(dir.path(), "a.png", 4, 3, 10);
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let seq = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(seq.len(), 2);

        let frames: Vec<Image> = seq.frames(5).map(|f| f.unwrap()).collect();
        assert_eq!(frames[0].index(), 5);
        assert_eq!(frames[1].index(), 6);
        assert_eq!(frames[0].data()[0], 10);
        assert_eq!(frames[1].data()[0], 20);
    }

    #[test]
    fn test_frame_is_packed_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), "f.png", 5, 2, 50);
        let image = load_image(&path, 0).unwrap();
        assert_eq!(image.width(), 5);
        assert_eq!(image.height(), 2);
        assert_eq!(image.data().len(), 5 * 2 * 3);
        assert_eq!(&image.data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequence::open(dir.path()).is_err());
    }

    #[test]
    fn test_undecodable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not really a png").unwrap();
        assert!(load_image(&path, 0).is_err());
    }
}
