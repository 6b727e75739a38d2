use ndarray::ArrayView3;

/// Bytes per pixel of every [`Image`]: packed RGB.
pub const CHANNELS: usize = 3;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Images are moved from the producer into the recognizer, never shared.
/// `index` is the producer's sequence number for the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Image {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    /// An all-black frame of the given size.
    pub fn blank(width: u32, height: u32, index: usize) -> Self {
        let len = (width as usize) * (height as usize) * CHANNELS;
        Self::new(vec![0u8; len], width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, CHANNELS),
            &self.data,
        )
        .expect("Image data length must match dimensions")
    }
}
