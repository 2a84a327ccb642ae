use std::fmt;
use serde::Serialize;

/// ErrorCode is the stable classification surfaced to the PAM layer or CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotEnrolled,
    NoFace,
    MultipleFaces,
    LivenessFailed,
    NotRecognized,
    CameraError,
    Timeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotEnrolled => "NOT_ENROLLED",
            ErrorCode::NoFace => "NO_FACE",
            ErrorCode::MultipleFaces => "MULTIPLE_FACES",
            ErrorCode::LivenessFailed => "LIVENESS_FAILED",
            ErrorCode::NotRecognized => "NOT_RECOGNIZED",
            ErrorCode::CameraError => "CAMERA_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }

    /// user_message returns the text shown to the person in front of the camera.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::NotEnrolled => "No face data enrolled for this user",
            ErrorCode::NoFace => "Please position your face in front of the camera",
            ErrorCode::MultipleFaces => "Multiple faces detected. Please ensure only you are in frame",
            ErrorCode::LivenessFailed => "Liveness check failed. Please blink and try again",
            ErrorCode::NotRecognized => "Face not recognized. Falling back to password...",
            ErrorCode::CameraError => "Camera error. Please check your camera connection",
            ErrorCode::Timeout => "Face recognition timed out. Please enter your password",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AuthError is the structured error attached to a failed authentication.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct AuthError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl AuthError {
    pub fn new(code: ErrorCode, retryable: bool) -> Self {
        AuthError {
            code,
            message: code.user_message().to_string(),
            retryable,
        }
    }

    pub fn not_enrolled() -> Self {
        AuthError::new(ErrorCode::NotEnrolled, false)
    }

    pub fn not_recognized() -> Self {
        AuthError::new(ErrorCode::NotRecognized, false)
    }

    pub fn timeout() -> Self {
        AuthError::new(ErrorCode::Timeout, false)
    }

    pub fn camera() -> Self {
        AuthError::new(ErrorCode::CameraError, true)
    }

    pub fn liveness(retryable: bool) -> Self {
        AuthError::new(ErrorCode::LivenessFailed, retryable)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera not open")]
    NotOpen,
    #[error("failed to capture frame")]
    NoFrame,
    #[error("camera busy")]
    Busy,
    #[error("no infrared illuminator available")]
    NoIlluminator,
    #[error("camera device error: {0}")]
    Device(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFace,
    #[error("multiple faces detected")]
    MultipleFaces,
    #[error("recognition engine error: {0}")]
    Engine(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("user already enrolled: {0}")]
    UserExists(String),
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("failed to access storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode user data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// CaptureError covers the ways a frame batch can fail inside one attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("insufficient frames captured: {captured}")]
    InsufficientFrames { captured: usize },
    #[error("capture deadline exceeded")]
    DeadlineExceeded,
    #[error("capture task failed: {0}")]
    Task(String),
}
