pub mod image_sequence;
pub mod mailbox_source;
pub mod queued_source;
