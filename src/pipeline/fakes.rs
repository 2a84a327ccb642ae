//! Hardware-free collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ndarray::Array1;
use crate::error::errors::{CameraError, ExtractError, StorageError};
use crate::modules::camera_client::FrameSource;
use crate::modules::face_detection_client::{BoundingBox, Face, FaceExtractor};
use crate::modules::face_id_client::{Embedding, EMBEDDING_DIM};
use crate::modules::gallery_store::{GalleryStore, MemoryGalleryStore, UserFaceData};
use crate::pipeline::clock::ManualClock;
use crate::utils::coordinate::Point2D;
use crate::utils::image::{DeviceInfo, Frame, PixelFormat};

/// First embedding component of live frames, cycling with the frame index.
/// Adjacent distances alternate 0.1 and 0.2.
pub const LIVE_PATTERN: [f32; 4] = [0.0, 0.1, 0.3, 0.2];

const BACKGROUND: f32 = 0.05;

pub fn embedding_with(v0: f32) -> Embedding {
    let mut vector = Array1::<f32>::from_elem(EMBEDDING_DIM, BACKGROUND);
    vector[0] = v0;
    Embedding::new(vector, 0.95, "front")
}

/// enrolled_embedding sits close to the average of a live burst.
pub fn enrolled_embedding() -> Embedding {
    embedding_with(0.15)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CameraCounts {
    pub calls: usize,
    pub reads: usize,
    pub streaming_started: usize,
    pub streaming_stopped: usize,
    pub illuminator_enabled: usize,
    pub illuminator_disabled: usize,
    /// Reads that completed after streaming had been stopped.
    pub late_reads: usize,
}

/// FakeCamera hands out frames whose payload is the frame number.
#[derive(Debug, Default)]
pub struct FakeCamera {
    next_frame: AtomicUsize,
    calls: AtomicUsize,
    reads: AtomicUsize,
    streaming_started: AtomicUsize,
    streaming_stopped: AtomicUsize,
    illuminator_enabled: AtomicUsize,
    illuminator_disabled: AtomicUsize,
    late_reads: AtomicUsize,
    fail_reads: bool,
    no_streaming: bool,
    illuminator: bool,
    ir_sensor: bool,
    clock: Option<(Arc<ManualClock>, Duration)>,
    read_delay: Option<Duration>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn without_streaming(mut self) -> Self {
        self.no_streaming = true;
        self
    }

    pub fn with_illuminator(mut self) -> Self {
        self.illuminator = true;
        self
    }

    pub fn with_ir_sensor(mut self) -> Self {
        self.ir_sensor = true;
        self
    }

    /// with_clock advances the clock by `per_read` on every read.
    pub fn with_clock(mut self, clock: Arc<ManualClock>, per_read: Duration) -> Self {
        self.clock = Some((clock, per_read));
        self
    }

    /// with_read_delay blocks every read for `delay` of real time.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn counts(&self) -> CameraCounts {
        CameraCounts {
            calls: self.calls.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::SeqCst),
            streaming_started: self.streaming_started.load(Ordering::SeqCst),
            streaming_stopped: self.streaming_stopped.load(Ordering::SeqCst),
            illuminator_enabled: self.illuminator_enabled.load(Ordering::SeqCst),
            illuminator_disabled: self.illuminator_disabled.load(Ordering::SeqCst),
            late_reads: self.late_reads.load(Ordering::SeqCst),
        }
    }

    fn touch(&self, counter: &AtomicUsize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn next(&self) -> Result<Frame, CameraError> {
        self.touch(&self.reads);
        if let Some((clock, per_read)) = &self.clock {
            clock.advance(*per_read);
        }
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        if self.streaming_stopped.load(Ordering::SeqCst) > 0 {
            self.late_reads.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_reads {
            return Err(CameraError::NoFrame);
        }
        let idx = self.next_frame.fetch_add(1, Ordering::SeqCst) as u32;
        Ok(Frame::new(idx.to_le_bytes().to_vec(), 640, 480, PixelFormat::Rgb))
    }
}

impl FrameSource for FakeCamera {
    fn start_streaming(&self) -> Result<(), CameraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.no_streaming {
            return Err(CameraError::Device("streaming not supported".to_string()));
        }
        self.streaming_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_streaming(&self) -> Result<(), CameraError> {
        self.touch(&self.streaming_stopped);
        Ok(())
    }

    fn read_frame(&self) -> Result<Frame, CameraError> {
        if self.no_streaming {
            return Err(CameraError::NotOpen);
        }
        self.next()
    }

    fn capture(&self) -> Result<Frame, CameraError> {
        self.next()
    }

    fn has_infrared_illuminator(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.illuminator
    }

    fn enable_illuminator(&self) -> Result<(), CameraError> {
        self.touch(&self.illuminator_enabled);
        Ok(())
    }

    fn disable_illuminator(&self) -> Result<(), CameraError> {
        self.touch(&self.illuminator_disabled);
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeviceInfo {
            path: "/dev/video0".to_string(),
            name: "Fake Camera".to_string(),
            driver: "fake".to_string(),
            is_ir: self.ir_sensor,
            has_emitter: self.illuminator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Moving head and plausible embedding jitter.
    Live,
    /// The same printed face in every frame.
    Spoof,
    /// Embedding carries the frame number.
    Indexed,
    NoFace,
    MultipleFaces,
}

#[derive(Debug)]
pub struct FakeExtractor {
    behavior: Behavior,
    slow_even_frames: bool,
}

impl FakeExtractor {
    pub fn new(behavior: Behavior) -> Self {
        FakeExtractor {
            behavior,
            slow_even_frames: false,
        }
    }

    /// with_slow_even_frames delays even frames so workers finish out of order.
    pub fn with_slow_even_frames(mut self) -> Self {
        self.slow_even_frames = true;
        self
    }
}

fn frame_index(data: &[u8]) -> Result<usize, ExtractError> {
    let bytes: [u8; 4] = data
        .get(..4)
        .and_then(|head| head.try_into().ok())
        .ok_or_else(|| ExtractError::Engine("short frame".to_string()))?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn face_landmarks(nose_x: f64) -> Vec<Point2D> {
    vec![
        Point2D::new(130.0, 100.0),
        Point2D::new(110.0, 100.0),
        Point2D::new(90.0, 100.0),
        Point2D::new(70.0, 100.0),
        Point2D::new(nose_x, 130.0),
    ]
}

impl FaceExtractor for FakeExtractor {
    fn detect_single_face(&self, frame_data: &[u8]) -> Result<Face, ExtractError> {
        let idx = frame_index(frame_data)?;
        if self.slow_even_frames && idx % 2 == 0 {
            std::thread::sleep(Duration::from_millis(15));
        }

        let (v0, nose_x) = match self.behavior {
            Behavior::Live => (LIVE_PATTERN[idx % 4], 100.0 + 2.0 * ((idx % 3) as f64 - 1.0)),
            Behavior::Spoof => (0.1, 100.0),
            Behavior::Indexed => (idx as f32, 100.0),
            Behavior::NoFace => return Err(ExtractError::NoFace),
            Behavior::MultipleFaces => return Err(ExtractError::MultipleFaces),
        };

        Ok(Face {
            bounding_box: BoundingBox { left: 50, top: 60, right: 150, bottom: 180 },
            landmarks: face_landmarks(nose_x),
            confidence: 0.95,
            descriptor: embedding_with(v0).vector,
        })
    }
}

/// CountingStore wraps the in-memory store and counts pipeline calls.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryGalleryStore,
    pub loads: AtomicUsize,
    pub last_used_updates: AtomicUsize,
}

impl CountingStore {
    pub fn with_user(username: &str, embeddings: Vec<Embedding>) -> Self {
        let store = CountingStore::default();
        // a fresh store cannot already hold the user
        let _ = store.inner.create_user(username, embeddings, HashMap::new());
        store
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn last_used_updates(&self) -> usize {
        self.last_used_updates.load(Ordering::SeqCst)
    }
}

impl GalleryStore for CountingStore {
    fn user_exists(&self, username: &str) -> bool {
        self.inner.user_exists(username)
    }

    fn load_user(&self, username: &str) -> Result<UserFaceData, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_user(username)
    }

    fn create_user(
        &self,
        username: &str,
        embeddings: Vec<Embedding>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.inner.create_user(username, embeddings, metadata)
    }

    fn add_embedding(&self, username: &str, embedding: Embedding) -> Result<(), StorageError> {
        self.inner.add_embedding(username, embedding)
    }

    fn update_last_used(&self, username: &str) -> Result<(), StorageError> {
        self.last_used_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_last_used(username)
    }

    fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        self.inner.delete_user(username)
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_users()
    }
}
