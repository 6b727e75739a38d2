pub mod json_face_cache;
pub mod memory_face_cache;
