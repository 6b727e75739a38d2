pub mod face_event;
pub mod frame_observer;
pub mod recognizer_error;
pub mod track;
