/// Number of components in a face descriptor.
pub const ENCODING_LEN: usize = 128;

/// Match tolerance; squared, it bounds the dissimilarity of one identity.
pub const DEFAULT_TOLERANCE: f64 = 0.6;

/// Consecutive unmatched frames a track survives before it disappears.
pub const TRACK_TTL: u32 = 15;

/// How long the worker blocks on the source per iteration. Also bounds
/// cancellation latency.
pub const SOURCE_WAIT_TIMEOUT_MS: u64 = 100;

/// Capacity of the lossless frame queue.
pub const QUEUED_SOURCE_CAPACITY: usize = 8;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const STORE_DIR_NAME: &str = "facewatch";
pub const STORE_FILE_NAME: &str = "faces.json";
