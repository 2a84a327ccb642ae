use std::time::SystemTime;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::error::errors::ExtractError;
use crate::helper::face_helper::eye_aspect_ratio;
use crate::modules::face_id_client::Embedding;
use crate::utils::coordinate::Point2D;
use crate::utils::image::Frame;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Face is a single detection returned by the recognition engine.
#[derive(Debug, Clone)]
pub struct Face {
    pub bounding_box: BoundingBox,
    pub landmarks: Vec<Point2D>,
    pub confidence: f64,
    pub descriptor: Array1<f32>,
}

/// FaceExtractor is the boundary to the external recognition engine.
///
/// Calls are blocking and may be CPU heavy; the pipeline runs them on the
/// blocking thread pool.
pub trait FaceExtractor: Send + Sync {
    /// detect_single_face finds exactly one face in the encoded frame.
    ///
    /// # Arguments
    /// * `frame_data` - raw frame bytes as produced by the frame source
    ///
    /// # Returns
    /// * `Result<Face, ExtractError>` - `NoFace` or `MultipleFaces` when the frame
    ///   does not hold exactly one face
    fn detect_single_face(&self, frame_data: &[u8]) -> Result<Face, ExtractError>;

    /// embedding_of wraps the face descriptor with a capture label.
    fn embedding_of(&self, face: &Face, label: &str) -> Embedding {
        Embedding::new(face.descriptor.clone(), face.confidence, label)
    }
}

/// Observation is what one worker learns from one frame.
#[derive(Debug, Clone)]
pub struct Observation {
    pub face_found: bool,
    /// Empty unless `face_found` is set.
    pub embedding: Embedding,
    pub landmarks: Vec<Point2D>,
    pub eye_aspect_ratio: f64,
    pub is_ir: bool,
    pub timestamp: SystemTime,
}

impl Observation {
    pub fn with_face(embedding: Embedding, landmarks: Vec<Point2D>, is_ir: bool, timestamp: SystemTime) -> Self {
        let ear = eye_aspect_ratio(&landmarks);
        Observation {
            face_found: true,
            embedding,
            landmarks,
            eye_aspect_ratio: ear,
            is_ir,
            timestamp,
        }
    }

    pub fn without_face(is_ir: bool, timestamp: SystemTime) -> Self {
        Observation {
            face_found: false,
            embedding: Embedding::empty(),
            landmarks: Vec::new(),
            eye_aspect_ratio: 0.0,
            is_ir,
            timestamp,
        }
    }

    /// has_embedding tells whether this observation may be used as a biometric signal.
    pub fn has_embedding(&self) -> bool {
        self.face_found && !self.embedding.is_empty()
    }
}

/// observe_frame runs the extractor over one frame.
///
/// Extraction failures never propagate; they produce a face-less observation
/// and the error is handed back so the caller can count multi-face frames.
///
/// # Arguments
/// * `extractor` - recognition engine
/// * `frame` - captured frame
///
/// # Returns
/// * `(Observation, Option<ExtractError>)`
pub fn observe_frame(extractor: &dyn FaceExtractor, frame: &Frame) -> (Observation, Option<ExtractError>) {
    match extractor.detect_single_face(&frame.data) {
        Ok(face) => {
            let embedding = extractor.embedding_of(&face, "auth");
            let observation = Observation::with_face(embedding, face.landmarks, frame.is_ir, frame.timestamp);
            (observation, None)
        }
        Err(err) => (Observation::without_face(frame.is_ir, frame.timestamp), Some(err)),
    }
}
