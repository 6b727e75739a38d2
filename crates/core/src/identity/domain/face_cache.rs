use chrono::{DateTime, Utc};

use crate::identity::domain::cache_error::CacheError;
use crate::identity::domain::encoding::{Encoding, FaceId};
use crate::identity::domain::profile::Profile;

/// Domain interface for an identity store mapping face ids to encodings.
///
/// Callers serialize access (the recognizer holds it behind a mutex), hence
/// `&mut self` on mutations.
pub trait FaceCache: Send {
    /// Stores a user identity. `id` must be positive and unused.
    fn insert(&mut self, id: FaceId, encoding: Encoding) -> Result<(), CacheError>;

    /// Stores an unnamed face under the next negative id and returns that id.
    fn insert_unknown(&mut self, encoding: Encoding) -> Result<FaceId, CacheError>;

    fn remove(&mut self, id: FaceId) -> Result<(), CacheError>;

    /// Moves the encoding and profile of `old` to `new`. `new` must be
    /// positive; an existing entry under `new` is overwritten.
    fn rename(&mut self, old: FaceId, new: FaceId) -> Result<(), CacheError>;

    fn retrieve(&self, id: FaceId) -> Result<Encoding, CacheError>;

    /// First stored id (in insertion order) whose dissimilarity to `encoding`
    /// is strictly below `tolerance²`, or [`NO_FACE`](super::encoding::NO_FACE).
    ///
    /// First match, not best match: a closer entry stored later is ignored.
    fn query(&self, encoding: &Encoding, tolerance: f64) -> FaceId;

    /// All stored ids in scan order.
    fn ids(&self) -> Vec<FaceId>;

    /// Metadata of a stored id; empty if nothing was recorded yet.
    fn profile(&self, id: FaceId) -> Result<Profile, CacheError>;

    fn set_name(&mut self, id: FaceId, name: Option<String>) -> Result<(), CacheError>;

    /// Records that `id` was seen at `at`.
    fn mark_seen(&mut self, id: FaceId, at: DateTime<Utc>) -> Result<(), CacheError>;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rejects the sentinel and the range reserved for minted ids.
pub fn validate_user_id(id: FaceId) -> Result<(), CacheError> {
    if id <= 0 {
        return Err(CacheError::InvalidId(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(i32::MIN)]
    fn test_non_positive_ids_are_invalid(#[case] id: FaceId) {
        assert!(matches!(validate_user_id(id), Err(CacheError::InvalidId(x)) if x == id));
    }

    #[rstest]
    #[case(1)]
    #[case(i32::MAX)]
    fn test_positive_ids_are_valid(#[case] id: FaceId) {
        assert!(validate_user_id(id).is_ok());
    }
}
