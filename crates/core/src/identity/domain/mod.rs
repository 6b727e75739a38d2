pub mod cache_error;
pub mod encoding;
pub mod face_cache;
pub mod profile;
