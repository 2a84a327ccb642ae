pub mod camera_client;
pub mod face_anti_spoofing;
pub mod face_detection_client;
pub mod face_id_client;
pub mod gallery_store;
