use std::path::PathBuf;

use thiserror::Error;

use crate::identity::domain::encoding::FaceId;

#[derive(Error, Debug)]
pub enum CacheError {
    /// User-assigned ids must be positive.
    #[error("invalid face id {0}: user ids must be positive")]
    InvalidId(FaceId),
    #[error("face id {0} is already in use")]
    DuplicateId(FaceId),
    #[error("unknown face id {0}")]
    UnknownId(FaceId),
    #[error("no negative face ids left to assign")]
    Exhausted,
    #[error("I/O error on face store {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed face store {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
