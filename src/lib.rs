pub mod config;
pub mod error;
pub mod helper;
pub mod logger;
pub mod modules;
pub mod pipeline;
pub mod utils;

pub use crate::error::errors::{AuthError, ErrorCode};
pub use crate::modules::face_anti_spoofing::{LivenessEngine, LivenessResult};
pub use crate::pipeline::pipeline::VerificationPipeline;
pub use crate::pipeline::result::AuthResult;
