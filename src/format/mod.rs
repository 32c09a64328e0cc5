//! Capture format tables and pixel layout handling.
//!
//! Static lookups from the engine's resolution and frame-rate
//! enumerations to concrete values, the settings record the engine
//! queries, and helpers that normalize and validate planar YUV layouts.

mod convert;
mod settings;
mod tables;

pub use convert::{chroma_dimensions, rgb_to_i420, I420Planes, PlaneLayout};
pub use settings::{CaptureSettings, PixelFormat};
pub use tables::{FpsRange, FrameRate, Resolution, Size};

use thiserror::Error;

/// Errors raised while parsing format names or checking layouts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown resolution: {0}")]
    UnknownResolution(String),
    #[error("unknown frame rate: {0}")]
    UnknownFrameRate(String),
    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(u32),
    #[error("invalid {plane} plane stride: {reason}")]
    InvalidStride {
        plane: &'static str,
        reason: &'static str,
    },
    #[error("{plane} plane holds {len} bytes, layout requires {required}")]
    PlaneTooSmall {
        plane: &'static str,
        len: usize,
        required: usize,
    },
}
