use thiserror::Error;

use crate::identity::domain::cache_error::CacheError;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("continuous recognition is already running")]
    AlreadyRunning,
    #[error("continuous recognition is not running")]
    NotRunning,
    #[error("recognition worker panicked")]
    WorkerPanicked,
    #[error("failed to spawn recognition worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("no face cache is set")]
    NoCache,
    #[error(transparent)]
    Cache(#[from] CacheError),
}
