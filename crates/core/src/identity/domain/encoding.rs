use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::ENCODING_LEN;

/// Identity handle for a face.
///
/// Positive ids are assigned by the user, negative ids are minted by a cache
/// for faces nobody has named yet, and [`NO_FACE`] means "no match".
pub type FaceId = i32;

pub const NO_FACE: FaceId = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("encoding must have {expected} components, got {0}", expected = ENCODING_LEN)]
pub struct EncodingLengthError(pub usize);

/// Fixed-length face descriptor produced by an embedder.
///
/// Serializes as a plain array of numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Encoding {
    vector: [f64; ENCODING_LEN],
}

impl Encoding {
    pub fn new(vector: [f64; ENCODING_LEN]) -> Self {
        Self { vector }
    }

    pub fn zeros() -> Self {
        Self::new([0.0; ENCODING_LEN])
    }

    /// An encoding with every component set to `value`.
    pub fn splat(value: f64) -> Self {
        Self::new([value; ENCODING_LEN])
    }

    pub fn vector(&self) -> &[f64; ENCODING_LEN] {
        &self.vector
    }

    /// Squared Euclidean distance. No square root is taken, so compare it
    /// against a squared tolerance.
    pub fn dissimilarity(&self, other: &Encoding) -> f64 {
        self.vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Self::zeros()
    }
}

impl TryFrom<&[f64]> for Encoding {
    type Error = EncodingLengthError;

    fn try_from(values: &[f64]) -> Result<Self, Self::Error> {
        let vector: [f64; ENCODING_LEN] = values
            .try_into()
            .map_err(|_| EncodingLengthError(values.len()))?;
        Ok(Self::new(vector))
    }
}

impl TryFrom<Vec<f64>> for Encoding {
    type Error = EncodingLengthError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::try_from(values.as_slice())
    }
}

impl From<Encoding> for Vec<f64> {
    fn from(encoding: Encoding) -> Self {
        encoding.vector.to_vec()
    }
}
