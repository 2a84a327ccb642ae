use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use log::{debug, info};
use ndarray::Array1;
use serde::Serialize;
use crate::config::config::LivenessConfig;
use crate::helper::face_helper::{blink_slope_threshold, head_pose, mean_eye_width};
use crate::modules::face_detection_client::Observation;
use crate::modules::face_id_client::average_vector;
use crate::utils::utils::{mean, mean_and_variance, variance};

pub const CHECK_3D_GEOMETRY: &str = "3d_geometry";
pub const CHECK_CONSISTENCY: &str = "consistency";
pub const CHECK_MOVEMENT: &str = "movement";
pub const CHECK_FACE_PRESENT: &str = "face_present";
pub const CHECK_BLINK: &str = "blink";

pub const REASON_INSUFFICIENT_FRAMES: &str = "insufficient frames";

const WEIGHT_GEOMETRY: f64 = 0.3;
const WEIGHT_CONSISTENCY: f64 = 0.3;
const WEIGHT_MOVEMENT: f64 = 0.2;
const WEIGHT_PRESENCE: f64 = 0.2;

const QUICK_WEIGHT_CONSISTENCY: f64 = 0.4;
const QUICK_WEIGHT_MOVEMENT: f64 = 0.3;
const QUICK_WEIGHT_PRESENCE: f64 = 0.3;
const QUICK_MIN_SCORE: f64 = 0.6;

const MIN_FRAMES: usize = 3;
const MIN_GEOMETRY_FRAMES: usize = 5;
const MIN_EAR_SAMPLES: usize = 5;

/// Failure reasons in reporting priority. Only presence failures are transient.
const FAILURE_REASONS: [(&str, &str, bool); 4] = [
    (CHECK_3D_GEOMETRY, "face lacks 3D depth/movement (possible 2D photo)", false),
    (CHECK_CONSISTENCY, "inconsistent face data (possible photo attack)", false),
    (CHECK_MOVEMENT, "no movement detected (possible static image)", false),
    (CHECK_FACE_PRESENT, "face not consistently visible", true),
];

/// LivenessResult is the verdict for one attempt's observation batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LivenessResult {
    pub is_live: bool,
    pub score: f64,
    pub checks: HashMap<String, bool>,
    pub reason: String,
    pub requires_retry: bool,
    pub duration: Duration,
}

impl LivenessResult {
    fn insufficient_frames(duration: Duration) -> Self {
        LivenessResult {
            reason: REASON_INSUFFICIENT_FRAMES.to_string(),
            requires_retry: true,
            duration,
            ..Default::default()
        }
    }

    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeAction {
    TurnLeft,
    TurnRight,
    LookUp,
    LookDown,
    Blink,
    Other(String),
}

impl ChallengeAction {
    pub fn is_head_movement(&self) -> bool {
        matches!(
            self,
            ChallengeAction::TurnLeft | ChallengeAction::TurnRight | ChallengeAction::LookUp | ChallengeAction::LookDown
        )
    }
}

impl FromStr for ChallengeAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "turn_left" => ChallengeAction::TurnLeft,
            "turn_right" => ChallengeAction::TurnRight,
            "look_up" => ChallengeAction::LookUp,
            "look_down" => ChallengeAction::LookDown,
            "blink" => ChallengeAction::Blink,
            other => ChallengeAction::Other(other.to_string()),
        })
    }
}

impl fmt::Display for ChallengeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeAction::TurnLeft => f.write_str("turn_left"),
            ChallengeAction::TurnRight => f.write_str("turn_right"),
            ChallengeAction::LookUp => f.write_str("look_up"),
            ChallengeAction::LookDown => f.write_str("look_down"),
            ChallengeAction::Blink => f.write_str("blink"),
            ChallengeAction::Other(name) => f.write_str(name),
        }
    }
}

/// Challenge is a prompted action, with the expected head angle in degrees
/// for head movements.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub action: ChallengeAction,
    pub angle: Option<f64>,
}

impl Challenge {
    pub fn new(action: ChallengeAction) -> Self {
        Challenge { action, angle: None }
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = Some(angle);
        self
    }
}

/// embedding_distance is the euclidean distance used between adjacent frames.
/// Mismatched lengths count as a full unit of change.
fn embedding_distance(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = (*x - *y) as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

fn adjacent_distances(embeddings: &[&Array1<f32>]) -> Vec<f64> {
    embeddings.windows(2).map(|pair| embedding_distance(pair[0], pair[1])).collect()
}

/// face_embeddings returns the embeddings of observations that found a face, in order.
fn face_embeddings(observations: &[Observation]) -> Vec<&Array1<f32>> {
    observations
        .iter()
        .filter(|obs| obs.has_embedding())
        .map(|obs| &obs.embedding.vector)
        .collect()
}

/// LivenessEngine scores whether an observation batch comes from a live subject.
#[derive(Debug, Clone, Default)]
pub struct LivenessEngine {
    config: LivenessConfig,
}

impl LivenessEngine {
    pub fn new(config: LivenessConfig) -> Self {
        LivenessEngine { config }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// detect runs every enabled check over one attempt's observations and
    /// combines them into a weighted score.
    ///
    /// # Arguments
    /// * `observations` - observations in capture order
    ///
    /// # Returns
    /// * `LivenessResult`
    pub fn detect(&self, observations: &[Observation]) -> LivenessResult {
        let start = Instant::now();

        if observations.len() < MIN_FRAMES {
            return LivenessResult::insufficient_frames(start.elapsed());
        }

        debug!("running liveness detection on {} frames", observations.len());

        let mut result = LivenessResult::default();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut record = |result: &mut LivenessResult, name: &str, passed: bool, weight: f64| {
            result.checks.insert(name.to_string(), passed);
            if passed {
                weighted_sum += weight;
            }
            total_weight += weight;
            debug!("{name} check: {passed}");
        };

        if self.config.require_3d {
            let passed = self.detect_3d_geometry(observations);
            record(&mut result, CHECK_3D_GEOMETRY, passed, WEIGHT_GEOMETRY);
        }
        if self.config.require_consistency {
            let passed = self.check_consistency(&face_embeddings(observations));
            record(&mut result, CHECK_CONSISTENCY, passed, WEIGHT_CONSISTENCY);
        }
        if self.config.require_movement {
            let passed = self.detect_movement(observations);
            record(&mut result, CHECK_MOVEMENT, passed, WEIGHT_MOVEMENT);
        }
        if self.config.require_presence {
            let passed = self.check_face_presence(observations);
            record(&mut result, CHECK_FACE_PRESENT, passed, WEIGHT_PRESENCE);
        }

        // reported only, never weighted
        if self.config.require_blink {
            let blinked = self.detect_blink(observations);
            result.checks.insert(CHECK_BLINK.to_string(), blinked);
        }

        if total_weight > 0.0 {
            result.score = weighted_sum / total_weight;
        }
        result.is_live = result.score >= self.config.min_score;

        if !result.is_live {
            let failed = FAILURE_REASONS
                .iter()
                .find(|(name, _, _)| result.check(name) == Some(false));
            match failed {
                Some((_, reason, retry)) => {
                    result.reason = reason.to_string();
                    result.requires_retry = *retry;
                }
                None => result.reason = "liveness score below threshold".to_string(),
            }
        }

        result.duration = start.elapsed();
        info!(
            "liveness detection complete: live={}, score={:.2}, duration={:?}",
            result.is_live, result.score, result.duration
        );
        result
    }

    /// detect_3d_geometry looks for perspective change of the nose against the eyes.
    ///
    /// A printed photo keeps yaw and pitch ratios fixed between frames, a live
    /// head does not.
    ///
    /// # Arguments
    /// * `observations` - at least five observations with 5-point landmarks
    ///
    /// # Returns
    /// * `bool` - true when the summed yaw and pitch variance exceeds the depth threshold
    pub fn detect_3d_geometry(&self, observations: &[Observation]) -> bool {
        if observations.len() < MIN_GEOMETRY_FRAMES {
            return false;
        }

        let (yaws, pitches): (Vec<f64>, Vec<f64>) = observations
            .iter()
            .filter_map(|obs| head_pose(&obs.landmarks))
            .map(|pose| (pose.yaw, pose.pitch))
            .unzip();

        if yaws.len() < MIN_GEOMETRY_FRAMES {
            debug!("3d geometry check: insufficient values ({})", yaws.len());
            return false;
        }

        let yaw_var = variance(&yaws);
        let pitch_var = variance(&pitches);
        let total = yaw_var + pitch_var;
        let is_3d = total > self.config.depth_threshold;

        debug!(
            "3d geometry check: yaw_var={:.6}, pitch_var={:.6}, total={:.6}, is_3d={} (threshold={:.6})",
            yaw_var, pitch_var, total, is_3d, self.config.depth_threshold
        );
        is_3d
    }

    /// detect_blink checks the eye aspect ratio sequence for a blink.
    ///
    /// Either a large overall EAR drop reaching a closed eye, or a single steep
    /// per-frame drop scaled by eye width, counts. With fewer than five EAR
    /// samples it falls back to a bounded embedding spike.
    pub fn detect_blink(&self, observations: &[Observation]) -> bool {
        if observations.len() < MIN_EAR_SAMPLES {
            return false;
        }

        let mut ears = Vec::with_capacity(observations.len());
        let mut widths = Vec::with_capacity(observations.len());
        for obs in observations.iter().filter(|obs| obs.eye_aspect_ratio > 0.0) {
            ears.push(obs.eye_aspect_ratio);
            if let Some(width) = mean_eye_width(&obs.landmarks) {
                widths.push(width);
            }
        }

        if ears.len() < MIN_EAR_SAMPLES {
            return self.detect_blink_from_embeddings(observations);
        }

        let max_ear = ears.iter().copied().fold(f64::MIN, f64::max);
        let min_ear = ears.iter().copied().fold(f64::MAX, f64::min);
        let drop = max_ear - min_ear;
        let drop_blink = drop > self.config.blink_threshold && min_ear < self.config.closed_eye_ear;

        let avg_width = mean(&widths);
        let slope_threshold = blink_slope_threshold(avg_width);
        let slope_blink = ears
            .windows(2)
            .any(|pair| pair[1] - pair[0] <= slope_threshold || pair[1] < self.config.ear_floor);

        debug!(
            "blink detection: drop={}, slope={} (max_ear={:.3}, min_ear={:.3}, width={:.1}, slope_threshold={:.4})",
            drop_blink, slope_blink, max_ear, min_ear, avg_width, slope_threshold
        );
        drop_blink || slope_blink
    }

    fn detect_blink_from_embeddings(&self, observations: &[Observation]) -> bool {
        let embeddings = face_embeddings(observations);
        if embeddings.len() < MIN_FRAMES {
            return false;
        }
        let max_diff = adjacent_distances(&embeddings).into_iter().fold(0.0, f64::max);
        max_diff > self.config.blink_spike_min && max_diff < self.config.blink_spike_max
    }

    /// check_consistency verifies that adjacent embeddings change by a steady,
    /// moderate amount.
    ///
    /// # Arguments
    /// * `embeddings` - face embeddings in capture order
    ///
    /// # Returns
    /// * `bool`
    pub fn check_consistency(&self, embeddings: &[&Array1<f32>]) -> bool {
        if embeddings.len() < MIN_FRAMES {
            return false;
        }

        let (mean_dist, var_dist) = mean_and_variance(&adjacent_distances(embeddings));
        debug!("consistency check: mean={:.4}, variance={:.6}", mean_dist, var_dist);

        // relaxed by 10x: high fps streams produce near-identical frames
        if var_dist < self.config.consistency_min_variance / 10.0 {
            debug!("consistency failed: variance too low (static image)");
            return false;
        }
        if var_dist > self.config.consistency_threshold {
            debug!("consistency failed: variance too high");
            return false;
        }
        if mean_dist > self.config.max_mean_distance {
            debug!("consistency failed: mean distance too high");
            return false;
        }
        true
    }

    /// detect_movement requires the mean adjacent embedding distance to be
    /// present but bounded.
    pub fn detect_movement(&self, observations: &[Observation]) -> bool {
        if observations.len() < MIN_FRAMES {
            return false;
        }
        let embeddings = face_embeddings(observations);
        if embeddings.len() < MIN_FRAMES {
            return false;
        }

        let avg_movement = mean(&adjacent_distances(&embeddings));
        debug!(
            "movement detection: avg={:.4}, range=({:.4}, {:.4})",
            avg_movement, self.config.movement_threshold, self.config.max_movement
        );
        avg_movement > self.config.movement_threshold && avg_movement < self.config.max_movement
    }

    pub fn check_face_presence(&self, observations: &[Observation]) -> bool {
        if observations.is_empty() {
            return false;
        }
        let found = observations.iter().filter(|obs| obs.face_found).count();
        let ratio = found as f64 / observations.len() as f64;
        debug!("face presence: {}/{} frames ({:.1}%)", found, observations.len(), ratio * 100.0);
        ratio >= self.config.min_face_presence
    }

    /// perform_challenge verifies the response to a prompted action.
    ///
    /// # Arguments
    /// * `challenge` - the prompted action
    /// * `before` - observations captured before the prompt
    /// * `after` - observations captured after the prompt
    ///
    /// # Returns
    /// * `bool`
    pub fn perform_challenge(&self, challenge: &Challenge, before: &[Observation], after: &[Observation]) -> bool {
        if before.is_empty() || after.is_empty() {
            return false;
        }

        let (avg_before, avg_after) = match (
            average_vector(face_embeddings(before)),
            average_vector(face_embeddings(after)),
        ) {
            (Some(b), Some(a)) => (b, a),
            _ => return false,
        };

        let change = embedding_distance(&avg_before, &avg_after);
        debug!(
            "challenge response: action={}, angle={:?}, change={:.4}",
            challenge.action, challenge.angle, change
        );

        match &challenge.action {
            action if action.is_head_movement() => {
                change > self.config.challenge_min_change && change < self.config.challenge_max_change
            }
            ChallengeAction::Blink => self.detect_blink(after),
            _ => change > self.config.challenge_default_change,
        }
    }

    /// quick_check is the reduced check used for re-authentication: no geometry,
    /// no blink, and a lower bar.
    ///
    /// # Returns
    /// * `(bool, f64)` - verdict and score
    pub fn quick_check(&self, observations: &[Observation]) -> (bool, f64) {
        if observations.len() < 2 {
            return (false, 0.0);
        }
        let embeddings = face_embeddings(observations);
        if embeddings.len() < 2 {
            return (false, 0.0);
        }

        let mut score = 0.0;
        if self.check_consistency(&embeddings) {
            score += QUICK_WEIGHT_CONSISTENCY;
        }
        if self.detect_movement(observations) {
            score += QUICK_WEIGHT_MOVEMENT;
        }
        if self.check_face_presence(observations) {
            score += QUICK_WEIGHT_PRESENCE;
        }
        (score >= QUICK_MIN_SCORE, score)
    }
}
