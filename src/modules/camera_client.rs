use crate::error::errors::CameraError;
use crate::utils::image::{DeviceInfo, Frame};

/// FrameSource is the boundary to the camera driver.
///
/// All methods take `&self`; implementations keep their own interior state so a
/// source can be shared between the capture task and the session guard.
/// Calls may block on the device.
pub trait FrameSource: Send + Sync {
    /// start_streaming switches the device to continuous capture.
    fn start_streaming(&self) -> Result<(), CameraError>;

    fn stop_streaming(&self) -> Result<(), CameraError>;

    /// read_frame returns the next frame of the running stream.
    fn read_frame(&self) -> Result<Frame, CameraError>;

    /// capture grabs a single frame without a running stream.
    fn capture(&self) -> Result<Frame, CameraError>;

    fn has_infrared_illuminator(&self) -> bool {
        false
    }

    fn enable_illuminator(&self) -> Result<(), CameraError> {
        Err(CameraError::NoIlluminator)
    }

    fn disable_illuminator(&self) -> Result<(), CameraError> {
        Err(CameraError::NoIlluminator)
    }

    fn device_info(&self) -> DeviceInfo;
}

/// ReadMode tells how frames are pulled from a source during one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Streaming,
    OneShot,
}

/// read_next pulls one frame using the given mode and stamps the device's IR flag on it.
///
/// # Arguments
/// * `source` - frame source
/// * `mode` - streaming or one-shot capture
///
/// # Returns
/// * `Result<Frame, CameraError>`
pub fn read_next(source: &dyn FrameSource, mode: ReadMode, is_ir: bool) -> Result<Frame, CameraError> {
    let frame = match mode {
        ReadMode::Streaming => source.read_frame()?,
        ReadMode::OneShot => source.capture()?,
    };
    if frame.is_empty() {
        return Err(CameraError::NoFrame);
    }
    Ok(if is_ir { frame.with_ir(true) } else { frame })
}
