use std::time::Duration;
use serde::Serialize;
use crate::error::errors::{AuthError, ErrorCode};

/// AuthResult is the terminal outcome of one authentication call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthResult {
    pub success: bool,
    pub username: String,
    pub attempts: u32,
    pub reason: String,
    pub confidence: f64,
    pub duration: Duration,
    pub error: Option<AuthError>,
}

impl AuthResult {
    pub fn new(username: &str) -> Self {
        AuthResult {
            username: username.to_string(),
            ..Default::default()
        }
    }

    /// failed records the error and reason of an unsuccessful call.
    pub fn failed(mut self, error: AuthError, reason: &str) -> Self {
        self.success = false;
        self.error = Some(error);
        self.reason = reason.to_string();
        self
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|err| err.code)
    }

    /// is_retryable tells the caller whether prompting again may help.
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|err| err.retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result() {
        let result = AuthResult::new("alice").failed(AuthError::camera(), "camera busy");
        assert!(!result.success);
        assert_eq!(result.username, "alice");
        assert_eq!(result.code(), Some(ErrorCode::CameraError));
        assert_eq!(result.reason, "camera busy");
        assert!(result.is_retryable());
    }

    #[test]
    fn test_success_is_not_retryable() {
        let result = AuthResult {
            success: true,
            ..AuthResult::new("alice")
        };
        assert_eq!(result.code(), None);
        assert!(!result.is_retryable());
    }
}
