use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use crate::config::config::{AuthConfig, RecognitionConfig};
use crate::config::settings::Settings;
use crate::error::errors::{AuthError, CameraError, CaptureError, ErrorCode};
use crate::modules::camera_client::FrameSource;
use crate::modules::face_anti_spoofing::LivenessEngine;
use crate::modules::face_detection_client::{FaceExtractor, Observation};
use crate::modules::face_id_client::{average_embedding, Embedding, EmbeddingMatcher};
use crate::modules::gallery_store::GalleryStore;
use crate::pipeline::clock::{Clock, Deadline, SystemClock};
use crate::pipeline::result::AuthResult;
use crate::pipeline::session::CaptureSession;
use crate::pipeline::worker_pool::{CaptureBatch, ExtractionPool};

/// VerificationPipeline authenticates a user by face: it captures a burst of
/// frames, checks liveness and only then matches against the enrolled gallery.
pub struct VerificationPipeline {
    source: Arc<dyn FrameSource>,
    store: Arc<dyn GalleryStore>,
    pool: ExtractionPool,
    liveness: LivenessEngine,
    matcher: EmbeddingMatcher,
    auth: AuthConfig,
    clock: Arc<dyn Clock>,
    device: Arc<Mutex<()>>,
}

impl VerificationPipeline {
    /// new wires the pipeline to its collaborators.
    ///
    /// # Arguments
    /// * `source` - camera
    /// * `extractor` - recognition engine
    /// * `store` - enrolled galleries
    /// * `settings` - liveness, auth, recognition and acceleration settings
    ///
    /// # Returns
    /// * `VerificationPipeline`
    pub fn new(
        source: Arc<dyn FrameSource>,
        extractor: Arc<dyn FaceExtractor>,
        store: Arc<dyn GalleryStore>,
        settings: &Settings,
    ) -> Self {
        VerificationPipeline {
            source,
            store,
            pool: ExtractionPool::new(extractor, &settings.acceleration),
            liveness: LivenessEngine::new(settings.liveness.clone()),
            matcher: matcher_from(&settings.recognition),
            auth: settings.auth.clone(),
            clock: Arc::new(SystemClock),
            device: Arc::new(Mutex::new(())),
        }
    }

    /// with_clock replaces the time source deadlines are measured against.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_timeout(&mut self, seconds: u64) {
        self.auth.timeout = seconds;
    }

    pub fn set_max_attempts(&mut self, attempts: u32) {
        self.auth.max_attempts = attempts;
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    /// authenticate runs the full verification for a first login.
    ///
    /// Attempts share one deadline. A liveness failure that looks like a spoof
    /// ends the call at once; transient failures move on to the next attempt.
    ///
    /// # Arguments
    /// * `username` - user to verify
    ///
    /// # Returns
    /// * `AuthResult`
    pub async fn authenticate(&self, username: &str) -> AuthResult {
        let started = self.clock.now();
        let result = AuthResult::new(username);
        info!("starting authentication for user: {username}");

        let gallery = match self.load_gallery(username).await {
            Ok(gallery) => gallery,
            Err((err, reason)) => return self.finish(result.failed(err, reason), started),
        };

        let Ok(device) = self.device.clone().try_lock_owned() else {
            warn!("camera busy, rejecting authentication for {username}");
            return self.finish(result.failed(AuthError::camera(), &CameraError::Busy.to_string()), started);
        };
        let session = Arc::new(CaptureSession::open(self.source.clone(), device));
        let deadline = Deadline::after(self.clock.clone(), Duration::from_secs(self.auth.timeout));

        let result = self.attempt_loop(result, &session, &gallery, &deadline).await;
        // a read abandoned at the deadline holds its own handle until it returns
        drop(session);
        self.finish(result, started)
    }

    async fn attempt_loop(
        &self,
        mut result: AuthResult,
        session: &Arc<CaptureSession>,
        gallery: &[Embedding],
        deadline: &Deadline,
    ) -> AuthResult {
        let max_attempts = self.auth.max_attempts;
        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            debug!("authentication attempt {attempt}/{max_attempts}");

            if deadline.is_expired() {
                return result.failed(AuthError::timeout(), "authentication timed out");
            }

            let batch = match self.capture(session, self.auth.capture_frames, deadline).await {
                Ok(batch) => batch,
                Err(err) => {
                    if deadline.is_expired() || err == CaptureError::DeadlineExceeded {
                        return result.failed(AuthError::timeout(), "authentication timed out");
                    }
                    warn!("frame capture failed on attempt {attempt}: {err}");
                    continue;
                }
            };

            let verdict = self.liveness.detect(&batch.observations);
            if !verdict.is_live {
                result = result.failed(AuthError::liveness(verdict.requires_retry), &verdict.reason);
                if !verdict.requires_retry {
                    error!(
                        "SECURITY ALERT: liveness check failed - potential spoofing attempt detected: {}",
                        verdict.reason
                    );
                    return result;
                }
                warn!("liveness check failed (retrying): {}", verdict.reason);
                continue;
            }

            let Some(probe) = probe_embedding(&batch.observations) else {
                warn!("no face embeddings found on attempt {attempt}");
                continue;
            };

            let best = self.matcher.find_best_match(&probe, gallery);
            if best.matched {
                info!(
                    "authentication successful for {} (match index: {:?}, distance: {:.4})",
                    result.username, best.index, best.distance
                );
                self.touch_last_used(&result.username).await;
                return AuthResult {
                    success: true,
                    confidence: 1.0 - best.distance,
                    error: None,
                    reason: String::new(),
                    ..result
                };
            }
            debug!(
                "face not matched (distance: {:.4}, threshold: {:.4})",
                best.distance,
                self.matcher.tolerance()
            );
        }

        result.failed(AuthError::not_recognized(), "face not recognized after maximum attempts")
    }

    /// authenticate_quick is the single-attempt path for re-authentication
    /// inside an already trusted session.
    ///
    /// # Arguments
    /// * `username` - user to verify
    ///
    /// # Returns
    /// * `AuthResult`
    pub async fn authenticate_quick(&self, username: &str) -> AuthResult {
        let started = self.clock.now();
        let mut result = AuthResult::new(username);
        result.attempts = 1;

        let gallery = match self.load_gallery(username).await {
            Ok(gallery) => gallery,
            Err((err, reason)) => return self.finish(result.failed(err, reason), started),
        };

        let Ok(device) = self.device.clone().try_lock_owned() else {
            return self.finish(result.failed(AuthError::camera(), &CameraError::Busy.to_string()), started);
        };
        let session = Arc::new(CaptureSession::open(self.source.clone(), device));
        let deadline = Deadline::after(self.clock.clone(), Duration::from_secs(self.auth.quick_timeout));

        let result = self.quick_attempt(result, &session, &gallery, &deadline).await;
        drop(session);
        self.finish(result, started)
    }

    async fn quick_attempt(
        &self,
        result: AuthResult,
        session: &Arc<CaptureSession>,
        gallery: &[Embedding],
        deadline: &Deadline,
    ) -> AuthResult {
        let batch = match self.capture(session, self.auth.quick_capture_frames, deadline).await {
            Ok(batch) => batch,
            Err(err) if deadline.is_expired() || err == CaptureError::DeadlineExceeded => {
                return result.failed(AuthError::timeout(), "authentication timed out");
            }
            Err(err) => {
                warn!("quick capture failed: {err}");
                return result.failed(AuthError::camera(), "failed to capture frames");
            }
        };

        if !batch.has_face() {
            return if batch.multiple_faces > 0 {
                result.failed(AuthError::new(ErrorCode::MultipleFaces, true), "multiple faces detected")
            } else {
                result.failed(AuthError::new(ErrorCode::NoFace, true), "no face detected")
            };
        }

        let (is_live, score) = self.liveness.quick_check(&batch.observations);
        if !is_live {
            let reason = format!("quick liveness check failed (score: {score:.2})");
            return result.failed(AuthError::liveness(true), &reason);
        }

        let Some(probe) = probe_embedding(&batch.observations) else {
            return result.failed(AuthError::new(ErrorCode::NoFace, true), "no face detected");
        };

        let best = self.matcher.find_best_match(&probe, gallery);
        if best.matched {
            debug!(
                "quick auth successful for {} (index: {:?}, distance: {:.4})",
                result.username, best.index, best.distance
            );
            return AuthResult {
                success: true,
                confidence: 1.0 - best.distance,
                ..result
            };
        }

        result.failed(AuthError::not_recognized(), "face not recognized")
    }

    /// capture reads one batch, bounded by what is left of the deadline.
    async fn capture(
        &self,
        session: &Arc<CaptureSession>,
        count: usize,
        deadline: &Deadline,
    ) -> Result<CaptureBatch, CaptureError> {
        let remaining = deadline.remaining();
        let batch = self.pool.capture_batch(session.clone(), count, deadline.clone());
        tokio::time::timeout(remaining, batch)
            .await
            .map_err(|_| CaptureError::DeadlineExceeded)?
    }

    /// load_gallery fetches the enrolled embeddings without touching the camera.
    async fn load_gallery(&self, username: &str) -> Result<Vec<Embedding>, (AuthError, &'static str)> {
        let store = self.store.clone();
        let name = username.to_string();
        let loaded = tokio::task::spawn_blocking(move || {
            if !store.user_exists(&name) {
                return Ok(None);
            }
            store.load_user(&name).map(Some)
        })
        .await;

        match loaded {
            Ok(Ok(Some(user))) => Ok(user.embeddings),
            Ok(Ok(None)) => {
                warn!("user not enrolled: {username}");
                Err((AuthError::not_enrolled(), "user not enrolled"))
            }
            Ok(Err(err)) => {
                warn!("failed to load user data for {username}: {err}");
                Err((AuthError::not_enrolled(), "failed to load user data"))
            }
            Err(err) => {
                warn!("failed to load user data for {username}: {err}");
                Err((AuthError::not_enrolled(), "failed to load user data"))
            }
        }
    }

    async fn touch_last_used(&self, username: &str) {
        let store = self.store.clone();
        let name = username.to_string();
        match tokio::task::spawn_blocking(move || store.update_last_used(&name)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("failed to update last used timestamp: {err}"),
            Err(err) => warn!("failed to update last used timestamp: {err}"),
        }
    }

    fn finish(&self, mut result: AuthResult, started: std::time::Instant) -> AuthResult {
        result.duration = self.clock.now().saturating_duration_since(started);
        result
    }
}

fn matcher_from(recognition: &RecognitionConfig) -> EmbeddingMatcher {
    EmbeddingMatcher::new(recognition.tolerance)
}

/// probe_embedding averages the embeddings of every observation that found a face.
fn probe_embedding(observations: &[Observation]) -> Option<Embedding> {
    let faces: Vec<Embedding> = observations
        .iter()
        .filter(|obs| obs.has_embedding())
        .map(|obs| obs.embedding.clone())
        .collect();
    if faces.is_empty() {
        return None;
    }
    Some(average_embedding(&faces))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use crate::config::config::AccelerationConfig;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::fakes::{embedding_with, enrolled_embedding, Behavior, CountingStore, FakeCamera, FakeExtractor};
    use super::*;

    fn settings() -> Settings {
        Settings {
            acceleration: AccelerationConfig::cpu(3),
            ..Default::default()
        }
    }

    fn pipeline(camera: &Arc<FakeCamera>, behavior: Behavior, store: &Arc<CountingStore>) -> VerificationPipeline {
        VerificationPipeline::new(
            camera.clone(),
            Arc::new(FakeExtractor::new(behavior)),
            store.clone(),
            &settings(),
        )
    }

    fn alice() -> Arc<CountingStore> {
        Arc::new(CountingStore::with_user("alice", vec![enrolled_embedding()]))
    }

    #[tokio::test]
    async fn test_not_enrolled_never_touches_camera() {
        let camera = Arc::new(FakeCamera::new());
        let store = Arc::new(CountingStore::default());
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate("alice").await;
        assert!(!result.success);
        assert_eq!(result.code(), Some(ErrorCode::NotEnrolled));
        assert!(!result.is_retryable());
        assert_eq!(result.reason, "user not enrolled");
        assert_eq!(camera.counts().calls, 0);
        assert_eq!(store.loads(), 0);
    }

    #[tokio::test]
    async fn test_successful_authentication() {
        let camera = Arc::new(FakeCamera::new().with_illuminator());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate("alice").await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error, None);
        assert!(result.confidence > 0.9 && result.confidence <= 1.0);
        assert_eq!(store.last_used_updates(), 1);

        let counts = camera.counts();
        assert_eq!(counts.reads, 30);
        assert_eq!(counts.streaming_started, 1);
        assert_eq!(counts.streaming_stopped, 1);
        assert_eq!(counts.illuminator_enabled, 1);
        assert_eq!(counts.illuminator_disabled, 1);
    }

    #[tokio::test]
    async fn test_one_shot_fallback_still_authenticates() {
        let camera = Arc::new(FakeCamera::new().without_streaming());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate("alice").await;
        assert!(result.success, "{result:?}");
        assert_eq!(camera.counts().reads, 30);
        assert_eq!(camera.counts().streaming_stopped, 0);
    }

    #[tokio::test]
    async fn test_spoof_stops_after_first_attempt() {
        let camera = Arc::new(FakeCamera::new().with_illuminator());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Spoof, &store);

        let result = pipeline.authenticate("alice").await;
        assert!(!result.success);
        assert_eq!(result.code(), Some(ErrorCode::LivenessFailed));
        assert!(!result.is_retryable());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.reason, "face lacks 3D depth/movement (possible 2D photo)");
        assert_eq!(camera.counts().reads, 30);
        assert_eq!(camera.counts().illuminator_disabled, 1);
        assert_eq!(store.last_used_updates(), 0);
    }

    #[tokio::test]
    async fn test_capture_failures_end_in_not_recognized() {
        let camera = Arc::new(FakeCamera::new().failing_reads());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::NotRecognized));
        assert!(!result.is_retryable());
        assert_eq!(result.attempts, 3);
        assert_eq!(camera.counts().reads, 90);
        assert_eq!(camera.counts().streaming_stopped, 1);
    }

    #[tokio::test]
    async fn test_capture_failures_end_in_timeout_when_deadline_passes() {
        let clock = Arc::new(ManualClock::new());
        let camera = Arc::new(
            FakeCamera::new()
                .failing_reads()
                .with_clock(clock.clone(), Duration::from_secs(1)),
        );
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store).with_clock(clock);

        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::Timeout));
        assert_eq!(result.reason, "authentication timed out");
        assert_eq!(result.attempts, 1);
        assert_eq!(camera.counts().reads, 10);
        assert_eq!(result.duration, Duration::from_secs(10));
        assert_eq!(camera.counts().streaming_stopped, 1);
    }

    #[tokio::test]
    async fn test_deadline_is_shared_across_attempts() {
        let clock = Arc::new(ManualClock::new());
        let camera = Arc::new(FakeCamera::new().with_clock(clock.clone(), Duration::from_millis(200)));
        let store = Arc::new(CountingStore::with_user("alice", vec![embedding_with(5.0)]));
        let pipeline = pipeline(&camera, Behavior::Live, &store).with_clock(clock);

        // first attempt uses 6s, the second is cut short at 10s, the third never starts
        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::Timeout));
        assert_eq!(result.attempts, 3);
        assert_eq!(camera.counts().reads, 50);
        assert_eq!(store.last_used_updates(), 0);
    }

    #[tokio::test]
    async fn test_unknown_face_exhausts_attempts() {
        let camera = Arc::new(FakeCamera::new());
        let store = Arc::new(CountingStore::with_user("alice", vec![embedding_with(5.0)]));
        let mut pipeline = pipeline(&camera, Behavior::Live, &store);
        pipeline.set_max_attempts(2);

        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::NotRecognized));
        assert_eq!(result.reason, "face not recognized after maximum attempts");
        assert_eq!(result.attempts, 2);
        assert_eq!(camera.counts().reads, 60);
        assert_eq!(store.last_used_updates(), 0);
    }

    #[tokio::test]
    async fn test_second_call_is_rejected_while_camera_busy() {
        let camera = Arc::new(FakeCamera::new());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let held = pipeline.device.clone().try_lock_owned().unwrap();
        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::CameraError));
        assert!(result.is_retryable());
        assert_eq!(result.reason, "camera busy");
        assert_eq!(camera.counts().calls, 0);

        drop(held);
        assert!(pipeline.authenticate("alice").await.success);
    }

    #[tokio::test]
    async fn test_device_held_until_abandoned_read_returns() {
        let camera = Arc::new(
            FakeCamera::new()
                .with_illuminator()
                .with_read_delay(Duration::from_millis(1500)),
        );
        let store = alice();
        let mut pipeline = pipeline(&camera, Behavior::Live, &store);
        pipeline.set_timeout(1);

        let result = pipeline.authenticate("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::Timeout));
        assert!(pipeline.device.try_lock().is_err());
        assert_eq!(camera.counts().streaming_stopped, 0);
        assert_eq!(camera.counts().illuminator_disabled, 0);

        let busy = pipeline.authenticate_quick("alice").await;
        assert_eq!(busy.code(), Some(ErrorCode::CameraError));
        assert_eq!(busy.reason, "camera busy");

        let mut released = false;
        for _ in 0..150 {
            if pipeline.device.try_lock().is_ok() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(released);
        let counts = camera.counts();
        assert_eq!(counts.reads, 1);
        assert_eq!(counts.late_reads, 0);
        assert_eq!(counts.streaming_stopped, 1);
        assert_eq!(counts.illuminator_disabled, 1);
    }

    #[tokio::test]
    async fn test_setters() {
        let camera = Arc::new(FakeCamera::new());
        let store = alice();
        let mut pipeline = pipeline(&camera, Behavior::Live, &store);
        pipeline.set_timeout(20);
        pipeline.set_max_attempts(5);
        assert_eq!(pipeline.auth_config().timeout, 20);
        assert_eq!(pipeline.auth_config().max_attempts, 5);
    }

    #[tokio::test]
    async fn test_quick_authentication() {
        let camera = Arc::new(FakeCamera::new().with_illuminator());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate_quick("alice").await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.attempts, 1);
        assert_eq!(camera.counts().reads, 10);
        assert_eq!(camera.counts().illuminator_disabled, 1);
        assert_eq!(store.last_used_updates(), 0);
    }

    #[tokio::test]
    async fn test_quick_spoof_is_retryable() {
        let camera = Arc::new(FakeCamera::new());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Spoof, &store);

        let result = pipeline.authenticate_quick("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::LivenessFailed));
        assert!(result.is_retryable());
        assert_eq!(result.reason, "quick liveness check failed (score: 0.30)");
    }

    #[tokio::test]
    async fn test_quick_without_faces() {
        let store = alice();

        let camera = Arc::new(FakeCamera::new());
        let result = pipeline(&camera, Behavior::NoFace, &store).authenticate_quick("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::NoFace));
        assert!(result.is_retryable());

        let camera = Arc::new(FakeCamera::new());
        let result = pipeline(&camera, Behavior::MultipleFaces, &store).authenticate_quick("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::MultipleFaces));
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_quick_capture_failure_is_camera_error() {
        let camera = Arc::new(FakeCamera::new().failing_reads());
        let store = alice();
        let pipeline = pipeline(&camera, Behavior::Live, &store);

        let result = pipeline.authenticate_quick("alice").await;
        assert_eq!(result.code(), Some(ErrorCode::CameraError));
        assert!(result.is_retryable());
        assert_eq!(result.reason, "failed to capture frames");
    }

    #[tokio::test]
    async fn test_quick_not_enrolled() {
        let camera = Arc::new(FakeCamera::new());
        let store = Arc::new(CountingStore::default());
        let result = pipeline(&camera, Behavior::Live, &store).authenticate_quick("bob").await;
        assert_eq!(result.code(), Some(ErrorCode::NotEnrolled));
        assert_eq!(camera.counts().calls, 0);
    }
}
