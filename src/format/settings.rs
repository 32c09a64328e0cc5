//! Capture settings reported to the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel layout tags understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// The tag the engine expects from a planar capturer.
    Nv21,
    /// Three-plane YUV 4:2:0 with explicit pixel and row strides.
    Yuv420_888,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Nv21 => f.write_str("NV21"),
            PixelFormat::Yuv420_888 => f.write_str("YUV_420_888"),
        }
    }
}

/// Settings snapshot returned by `getCaptureSettings`.
///
/// `width` and `height` describe the last frame observed since the most
/// recent bind, or zero when none has arrived yet. `format` is always
/// [`PixelFormat::Nv21`]: frames are delivered as three planes with
/// strides, which the engine accepts under that tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Expected pipeline delay in milliseconds.
    pub expected_delay: u32,
}

impl CaptureSettings {
    pub fn new(fps: u32, width: u32, height: u32) -> Self {
        Self {
            fps,
            width,
            height,
            format: PixelFormat::Nv21,
            expected_delay: 0,
        }
    }
}
