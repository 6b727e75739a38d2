pub mod scripted_faces;
