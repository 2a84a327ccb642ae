use std::env;
use std::path::Path;
use anyhow::{bail, Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use crate::config::config::{
    AccelerationConfig, AuthConfig, CameraConfig, LivenessConfig, LoggerConfig, RecognitionConfig, StorageConfig,
};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraConfig,
    pub recognition: RecognitionConfig,
    pub liveness: LivenessConfig,
    pub auth: AuthConfig,
    pub acceleration: AccelerationConfig,
    pub storage: StorageConfig,
    pub logger: LoggerConfig,
}

impl Settings {
    /// load reads the settings file, an optional `local` override next to it
    /// and `FACEAUTH__SECTION__KEY` environment overrides.
    ///
    /// # Arguments
    /// * `path` - path of the TOML settings file
    ///
    /// # Returns
    /// * `Result<Settings>` - validated settings with `~/` paths expanded
    pub fn load(path: &str) -> Result<Self> {
        let local = Path::new(path).with_file_name("local");

        let builder = Config::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(File::with_name(&local.to_string_lossy()).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("FACEAUTH").separator("__"));

        let mut settings: Settings = builder
            .build()
            .with_context(|| format!("failed to read settings from {path}"))?
            .try_deserialize()
            .context("failed to decode settings")?;

        settings.expand_paths();
        settings.validate()?;
        Ok(settings)
    }

    /// validate checks value ranges the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!("invalid camera resolution: {}x{}", self.camera.width, self.camera.height);
        }
        if self.camera.fps == 0 {
            bail!("invalid camera FPS: {}", self.camera.fps);
        }
        if !(0.0..=1.0).contains(&self.recognition.confidence_threshold) {
            bail!("confidence_threshold must be between 0 and 1, got {}", self.recognition.confidence_threshold);
        }
        if !(0.0..=1.0).contains(&self.recognition.tolerance) {
            bail!("tolerance must be between 0 and 1, got {}", self.recognition.tolerance);
        }
        if !(0.0..=1.0).contains(&self.liveness.min_score) {
            bail!("min_score must be between 0 and 1, got {}", self.liveness.min_score);
        }
        if self.auth.timeout == 0 || self.auth.quick_timeout == 0 {
            bail!("timeout must be positive");
        }
        if self.auth.max_attempts == 0 {
            bail!("max_attempts must be positive");
        }
        if !VALID_LOG_LEVELS.contains(&self.logger.level.as_str()) {
            bail!("invalid log level: {} (must be one of {:?})", self.logger.level, VALID_LOG_LEVELS);
        }
        Ok(())
    }

    pub fn expand_paths(&mut self) {
        self.camera.device = expand_path(&self.camera.device);
        self.recognition.model_path = expand_path(&self.recognition.model_path);
        self.storage.data_dir = expand_path(&self.storage.data_dir);
    }
}

/// expand_path replaces a leading `~/` with the user's home directory.
pub fn expand_path(path: &str) -> String {
    match (path.strip_prefix("~/"), env::var("HOME")) {
        (Some(rest), Ok(home)) => Path::new(&home).join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}
