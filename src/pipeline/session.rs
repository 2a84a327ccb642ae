use std::sync::Arc;
use log::{debug, warn};
use tokio::sync::OwnedMutexGuard;
use crate::modules::camera_client::{FrameSource, ReadMode};
use crate::utils::image::DeviceInfo;

/// CaptureSession owns the device for one authentication call.
///
/// Opening it switches on the illuminator and streaming where available;
/// dropping it switches both off again and then releases the device. The
/// session is shared with capture tasks, so cleanup waits for the last one.
pub struct CaptureSession {
    source: Arc<dyn FrameSource>,
    mode: ReadMode,
    illuminator_on: bool,
    is_ir: bool,
    _device: OwnedMutexGuard<()>,
}

impl CaptureSession {
    /// open prepares the device for capture.
    ///
    /// # Arguments
    /// * `source` - frame source to drive
    /// * `device` - exclusive hold on the device
    ///
    /// # Returns
    /// * `CaptureSession`
    pub fn open(source: Arc<dyn FrameSource>, device: OwnedMutexGuard<()>) -> Self {
        let info = source.device_info();
        let is_ir = info.is_ir || DeviceInfo::looks_infrared(&info.name);

        let mut illuminator_on = false;
        if source.has_infrared_illuminator() {
            match source.enable_illuminator() {
                Ok(()) => illuminator_on = true,
                Err(err) => warn!("failed to enable IR emitter: {err}"),
            }
        }

        let mode = match source.start_streaming() {
            Ok(()) => ReadMode::Streaming,
            Err(err) => {
                warn!("failed to start streaming, falling back to single capture: {err}");
                ReadMode::OneShot
            }
        };
        debug!("capture session open: mode={mode:?}, ir={is_ir}, illuminator={illuminator_on}");

        CaptureSession {
            source,
            mode,
            illuminator_on,
            is_ir,
            _device: device,
        }
    }

    pub fn source(&self) -> Arc<dyn FrameSource> {
        self.source.clone()
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn is_ir(&self) -> bool {
        self.is_ir
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.mode == ReadMode::Streaming {
            if let Err(err) = self.source.stop_streaming() {
                warn!("failed to stop streaming: {err}");
            }
        }
        if self.illuminator_on {
            if let Err(err) = self.source.disable_illuminator() {
                warn!("failed to disable IR emitter: {err}");
            }
        }
        debug!("capture session closed");
    }
}
