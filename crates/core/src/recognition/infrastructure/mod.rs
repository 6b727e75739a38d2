pub mod log_frame_observer;
pub mod recognizer;
