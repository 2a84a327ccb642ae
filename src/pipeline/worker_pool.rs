use std::sync::Arc;
use log::{debug, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use crate::config::config::AccelerationConfig;
use crate::error::errors::{CaptureError, ExtractError};
use crate::modules::camera_client::{read_next, FrameSource, ReadMode};
use crate::modules::face_detection_client::{observe_frame, FaceExtractor, Observation};
use crate::pipeline::clock::Deadline;
use crate::pipeline::session::CaptureSession;
use crate::utils::image::Frame;

/// A batch with fewer successfully read frames than this is not analysed.
pub const MIN_CAPTURED_FRAMES: usize = 5;

/// CaptureBatch is one attempt's observations in capture order.
#[derive(Debug, Clone, Default)]
pub struct CaptureBatch {
    pub observations: Vec<Observation>,
    pub frames_failed: usize,
    pub multiple_faces: usize,
}

impl CaptureBatch {
    pub fn has_face(&self) -> bool {
        self.observations.iter().any(Observation::has_embedding)
    }
}

#[derive(Debug, Default)]
struct CaptureStats {
    captured: usize,
    failed: usize,
}

struct Extracted {
    seq: usize,
    observation: Observation,
    error: Option<ExtractError>,
}

/// ExtractionPool reads a burst of frames and extracts observations from them
/// on a fixed number of workers.
///
/// One blocking capture task feeds a bounded frame queue; the workers share
/// that queue and push into a bounded result queue which the caller drains.
#[derive(Clone)]
pub struct ExtractionPool {
    extractor: Arc<dyn FaceExtractor>,
    workers: usize,
    queue_capacity: usize,
}

impl ExtractionPool {
    pub fn new(extractor: Arc<dyn FaceExtractor>, acceleration: &AccelerationConfig) -> Self {
        debug!(
            "extraction pool: {} workers, queue depth {}, backend {:?}",
            acceleration.worker_count(),
            acceleration.queue_capacity(),
            acceleration.backend
        );
        ExtractionPool {
            extractor,
            workers: acceleration.worker_count(),
            queue_capacity: acceleration.queue_capacity(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// capture_batch reads up to `count` frames and returns their observations.
    ///
    /// Reading stops early once the deadline expires. Dropping the returned
    /// future aborts the workers; the capture task stops at its next read and
    /// holds its session handle until then, so the device is not cleaned up or
    /// released under a read that is still in flight.
    ///
    /// # Arguments
    /// * `session` - open capture session
    /// * `count` - frames to read
    /// * `deadline` - call deadline
    ///
    /// # Returns
    /// * `Result<CaptureBatch, CaptureError>` - `InsufficientFrames` when fewer
    ///   than `MIN_CAPTURED_FRAMES` frames were read
    pub async fn capture_batch(
        &self,
        session: Arc<CaptureSession>,
        count: usize,
        deadline: Deadline,
    ) -> Result<CaptureBatch, CaptureError> {
        let (frame_tx, frame_rx) = mpsc::channel::<(usize, Frame)>(self.queue_capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<Extracted>(self.queue_capacity);

        let capture = tokio::task::spawn_blocking(move || {
            let source = session.source();
            capture_frames(source.as_ref(), session.mode(), session.is_ir(), count, &deadline, &frame_tx)
        });

        let frame_rx = Arc::new(Mutex::new(frame_rx));
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(extraction_worker(id, self.extractor.clone(), frame_rx.clone(), result_tx.clone()));
        }
        drop(result_tx);

        let mut extracted = Vec::with_capacity(count);
        while let Some(item) = result_rx.recv().await {
            extracted.push(item);
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|err| CaptureError::Task(err.to_string()))??;
        }
        let stats = capture.await.map_err(|err| CaptureError::Task(err.to_string()))?;

        debug!(
            "capture batch: {} read, {} failed, {} extracted",
            stats.captured,
            stats.failed,
            extracted.len()
        );
        if stats.captured < MIN_CAPTURED_FRAMES {
            return Err(CaptureError::InsufficientFrames { captured: stats.captured });
        }

        extracted.sort_by_key(|item| item.seq);
        let multiple_faces = extracted
            .iter()
            .filter(|item| item.error == Some(ExtractError::MultipleFaces))
            .count();

        Ok(CaptureBatch {
            observations: extracted.into_iter().map(|item| item.observation).collect(),
            frames_failed: stats.failed,
            multiple_faces,
        })
    }
}

/// capture_frames runs on the blocking pool and numbers frames in read order.
fn capture_frames(
    source: &dyn FrameSource,
    mode: ReadMode,
    is_ir: bool,
    count: usize,
    deadline: &Deadline,
    queue: &mpsc::Sender<(usize, Frame)>,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    for i in 0..count {
        if deadline.is_expired() {
            debug!("deadline reached after {i} reads");
            break;
        }
        match read_next(source, mode, is_ir) {
            Ok(frame) => {
                if queue.blocking_send((stats.captured, frame)).is_err() {
                    break;
                }
                stats.captured += 1;
            }
            Err(err) => {
                warn!("failed to capture frame {i}: {err}");
                stats.failed += 1;
            }
        }
    }
    stats
}

async fn extraction_worker(
    id: usize,
    extractor: Arc<dyn FaceExtractor>,
    frames: Arc<Mutex<mpsc::Receiver<(usize, Frame)>>>,
    results: mpsc::Sender<Extracted>,
) -> Result<(), CaptureError> {
    loop {
        let next = frames.lock().await.recv().await;
        let Some((seq, frame)) = next else {
            break;
        };

        let extractor = extractor.clone();
        let (observation, error) = tokio::task::spawn_blocking(move || observe_frame(extractor.as_ref(), &frame))
            .await
            .map_err(|err| CaptureError::Task(err.to_string()))?;
        if let Some(err) = &error {
            debug!("worker {id}: frame {seq}: {err}");
        }

        if results.send(Extracted { seq, observation, error }).await.is_err() {
            break;
        }
    }
    Ok(())
}
