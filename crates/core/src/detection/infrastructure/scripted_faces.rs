use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::identity::domain::encoding::Encoding;
use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to read face script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse face script {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no scripted face at {rect} in frame {index}")]
    MissingFace { index: usize, rect: Rectangle },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedFace {
    pub rect: Rectangle,
    pub encoding: Encoding,
}

/// A recorded session: for each frame index, the faces seen in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceScript {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Vec<ScriptedFace>>,
}

impl FaceScript {
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ScriptError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn faces(&self, index: usize) -> &[ScriptedFace] {
        self.frames.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Splits the script into a detector and an embedder that share it.
    pub fn into_collaborators(self) -> (ScriptedDetector, ScriptedEmbedder) {
        let script = Arc::new(self);
        (
            ScriptedDetector {
                script: script.clone(),
            },
            ScriptedEmbedder { script },
        )
    }
}

/// Replays recorded detections by frame index.
///
/// Keyed by [`Image::index`] rather than call order, so frames dropped by a
/// lossy source skip their recorded faces too. Frames past the end of the
/// script have no faces.
pub struct ScriptedDetector {
    script: Arc<FaceScript>,
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, image: &Image) -> Result<Vec<Rectangle>, Box<dyn std::error::Error>> {
        Ok(self
            .script
            .faces(image.index())
            .iter()
            .map(|f| f.rect)
            .collect())
    }
}

/// Returns the encoding recorded for a rectangle in the same frame.
pub struct ScriptedEmbedder {
    script: Arc<FaceScript>,
}

impl FaceEmbedder for ScriptedEmbedder {
    fn embed(
        &mut self,
        image: &Image,
        face: &Rectangle,
    ) -> Result<Encoding, Box<dyn std::error::Error>> {
        let index = image.index();
        self.script
            .faces(index)
            .iter()
            .find(|f| f.rect == *face)
            .map(|f| f.encoding.clone())
            .ok_or_else(|| ScriptError::MissingFace { index, rect: *face }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: i32, value: f64) -> ScriptedFace {
        ScriptedFace {
            rect: Rectangle::new(x, 10, x + 40, 50),
            encoding: Encoding::splat(value),
        }
    }

    fn script() -> FaceScript {
        FaceScript {
            width: 100,
            height: 80,
            frames: vec![vec![face(0, 0.1), face(50, 0.9)], vec![], vec![face(5, 0.1)]],
        }
    }

    fn image(index: usize) -> Image {
        Image::blank(100, 80, index)
    }

    #[test]
    fn test_detector_returns_rects_for_frame_index() {
        let (mut detector, _) = script().into_collaborators();
        let rects = detector.detect(&image(0)).unwrap();
        assert_eq!(rects, vec![face(0, 0.1).rect, face(50, 0.9).rect]);
        assert!(detector.detect(&image(1)).unwrap().is_empty());
        assert_eq!(detector.detect(&image(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_detector_is_keyed_by_index_not_call_order() {
        let (mut detector, _) = script().into_collaborators();
        assert_eq!(detector.detect(&image(2)).unwrap(), vec![face(5, 0.1).rect]);
        assert_eq!(detector.detect(&image(0)).unwrap().len(), 2);
    }

    #[test]
    fn test_frames_past_end_have_no_faces() {
        let (mut detector, _) = script().into_collaborators();
        assert!(detector.detect(&image(99)).unwrap().is_empty());
    }

    #[test]
    fn test_embedder_returns_recorded_encoding() {
        let (_, mut embedder) = script().into_collaborators();
        let enc = embedder.embed(&image(0), &face(50, 0.9).rect).unwrap();
        assert_eq!(enc, Encoding::splat(0.9));
    }

    #[test]
    fn test_embedder_unknown_rect_is_error() {
        let (_, mut embedder) = script().into_collaborators();
        let err = embedder.embed(&image(1), &face(0, 0.1).rect).unwrap_err();
        assert!(err.to_string().contains("frame 1"));
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        fs::write(&path, serde_json::to_string(&script()).unwrap()).unwrap();
        assert_eq!(FaceScript::load(&path).unwrap(), script());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        assert!(matches!(
            FaceScript::load(Path::new("/nonexistent/script.json")),
            Err(ScriptError::Read { .. })
        ));
    }
}
