use std::time::SystemTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PixelFormat {
    Jpeg,
    Rgb,
    Gray,
}

/// Frame is a single captured image as handed out by a frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp: SystemTime,
    pub is_ir: bool,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Frame {
            data,
            width,
            height,
            format,
            timestamp: SystemTime::now(),
            is_ir: false,
        }
    }

    /// with_ir marks the frame as captured by an infrared sensor.
    pub fn with_ir(mut self, is_ir: bool) -> Self {
        self.is_ir = is_ir;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// DeviceInfo describes the camera behind a frame source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub is_ir: bool,
    pub has_emitter: bool,
}

impl DeviceInfo {
    /// looks_infrared applies the device name heuristic used for IR sensors.
    pub fn looks_infrared(name: &str) -> bool {
        let name = name.to_lowercase();
        name.contains("ir") || name.contains("infrared") || name.contains("depth")
    }
}
