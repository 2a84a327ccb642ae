use std::num::NonZeroUsize;
use serde::{Deserialize, Serialize};

/// Level is the liveness security level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Basic,
    #[default]
    Standard,
    Strict,
    Paranoid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LivenessConfig {
    pub level: Level,
    pub require_3d: bool,
    pub require_consistency: bool,
    pub require_movement: bool,
    pub require_presence: bool,
    pub require_blink: bool,
    pub min_score: f64,
    pub movement_threshold: f64,
    pub max_movement: f64,
    pub depth_threshold: f64,
    pub consistency_threshold: f64,
    pub consistency_min_variance: f64,
    pub max_mean_distance: f64,
    pub blink_threshold: f64,
    pub closed_eye_ear: f64,
    pub ear_floor: f64,
    pub blink_spike_min: f64,
    pub blink_spike_max: f64,
    pub min_face_presence: f64,
    pub challenge_min_change: f64,
    pub challenge_max_change: f64,
    pub challenge_default_change: f64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        LivenessConfig {
            level: Level::Standard,
            require_3d: true,
            require_consistency: true,
            require_movement: true,
            require_presence: true,
            require_blink: false,
            min_score: 0.65,
            movement_threshold: 0.08,
            max_movement: 0.6,
            depth_threshold: 0.00005,
            consistency_threshold: 0.1,
            consistency_min_variance: 0.001,
            max_mean_distance: 0.6,
            blink_threshold: 0.2,
            closed_eye_ear: 0.25,
            ear_floor: 0.2,
            blink_spike_min: 0.05,
            blink_spike_max: 0.3,
            min_face_presence: 0.7,
            challenge_min_change: 0.1,
            challenge_max_change: 0.5,
            challenge_default_change: 0.05,
        }
    }
}

impl LivenessConfig {
    /// from_level returns the preset for a security level.
    pub fn from_level(level: Level) -> Self {
        let mut cfg = LivenessConfig {
            level,
            ..Default::default()
        };
        cfg.min_score = match level {
            Level::Basic => 0.5,
            Level::Standard => 0.65,
            Level::Strict => 0.8,
            Level::Paranoid => 0.9,
        };
        cfg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub timeout: u64,
    pub max_attempts: u32,
    pub capture_frames: usize,
    pub quick_timeout: u64,
    pub quick_capture_frames: usize,
    pub fallback_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            timeout: 10,
            max_attempts: 3,
            capture_frames: 30,
            quick_timeout: 3,
            quick_capture_frames: 10,
            fallback_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub tolerance: f64,
    pub confidence_threshold: f64,
    pub model_path: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        RecognitionConfig {
            tolerance: 0.4,
            confidence_threshold: 0.6,
            model_path: "~/.local/share/faceauth/models".to_string(),
        }
    }
}

/// Backend names the inference accelerator the extractor should run on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Rocm,
    OpenVino,
}

/// AccelerationConfig is built once and handed to the extraction side of the
/// pipeline; nothing reads backend choice from process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccelerationConfig {
    pub backend: Backend,
    pub workers: Option<usize>,
    pub queue_depth: Option<usize>,
}

impl AccelerationConfig {
    pub fn cpu(workers: usize) -> Self {
        AccelerationConfig {
            backend: Backend::Cpu,
            workers: Some(workers),
            queue_depth: None,
        }
    }

    /// worker_count resolves the extraction pool size, never below one.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1))
            .max(1)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_depth.unwrap_or(2 * self.worker_count()).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub prefer_ir: bool,
    pub ir_emitter_enabled: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            prefer_ir: true,
            ir_emitter_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: "~/.local/share/faceauth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_presets() {
        assert_eq!(LivenessConfig::from_level(Level::Basic).min_score, 0.5);
        assert_eq!(LivenessConfig::from_level(Level::Standard).min_score, 0.65);
        assert_eq!(LivenessConfig::from_level(Level::Paranoid).min_score, 0.9);
        assert_eq!(LivenessConfig::from_level(Level::Strict).level, Level::Strict);
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        assert_eq!(AccelerationConfig::cpu(0).worker_count(), 1);
        assert_eq!(AccelerationConfig::cpu(4).queue_capacity(), 8);
        assert!(AccelerationConfig::default().worker_count() >= 1);
    }

    #[test]
    fn test_partial_liveness_config_keeps_defaults() {
        let cfg: LivenessConfig = serde_json::from_str(r#"{"level":"strict","min_score":0.8}"#).unwrap();
        assert_eq!(cfg.level, Level::Strict);
        assert_eq!(cfg.depth_threshold, 0.00005);
    }
}
