use crate::identity::domain::encoding::FaceId;
use crate::recognition::domain::frame_observer::FrameObserver;
use crate::shared::image::Image;
use crate::shared::rectangle::Rectangle;

/// Logs every processed frame and the identities resolved in it.
#[derive(Default)]
pub struct LogFrameObserver {
    frames: usize,
}

impl LogFrameObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> usize {
        self.frames
    }
}

impl FrameObserver for LogFrameObserver {
    fn observe(&mut self, image: &Image, faces: &[(FaceId, Rectangle)]) {
        self.frames += 1;
        // Runs under the recognizer's interface lock; skip the pixel pass
        // unless someone is listening.
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", describe(image, faces));
        }
    }
}

fn describe(image: &Image, faces: &[(FaceId, Rectangle)]) -> String {
    let brightness = image.as_ndarray().mapv(f64::from).mean().unwrap_or(0.0);
    let summary: Vec<String> = faces
        .iter()
        .map(|(id, rect)| format!("{id}@{rect}"))
        .collect();
    format!(
        "Frame {} ({}x{}, mean {brightness:.1}): {} face(s) {}",
        image.index(),
        image.width(),
        image.height(),
        faces.len(),
        summary.join(" ")
    )
}
