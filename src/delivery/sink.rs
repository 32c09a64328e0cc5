//! Per-frame handoff to the video engine.

use crate::capture::{Plane, Rotation};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a sink that could not accept a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("frame rejected by consumer: {0}")]
    Rejected(String),
    #[error("consumer is closed")]
    Closed,
}

/// A borrowed planar YUV 4:2:0 frame.
///
/// Plane data is only valid for the duration of one
/// [`FrameSink::deliver`] call. Sinks that need the pixels later must
/// copy them.
#[derive(Debug, Clone, Copy)]
pub struct PlanarFrame<'a> {
    pub y: Plane<'a>,
    pub u: Plane<'a>,
    pub v: Plane<'a>,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    /// Horizontally flip for display. Set for front-lens captures.
    pub mirrored: bool,
    /// Sensor timestamp in nanoseconds.
    pub timestamp_ns: i64,
}

impl PlanarFrame<'_> {
    #[inline]
    pub fn rotation_degrees(&self) -> u32 {
        self.rotation.degrees()
    }

    /// `(pixel_stride, row_stride)` for the Y, U and V planes.
    pub fn strides(&self) -> [(u32, u32); 3] {
        [
            (self.y.pixel_stride, self.y.row_stride),
            (self.u.pixel_stride, self.u.row_stride),
            (self.v.pixel_stride, self.v.row_stride),
        ]
    }

    /// Everything about the frame except its pixels.
    pub fn metadata(&self) -> FrameMetadata {
        FrameMetadata {
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            mirrored: self.mirrored,
            timestamp_ns: self.timestamp_ns,
            strides: self.strides(),
        }
    }
}

/// Owned metadata of a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub mirrored: bool,
    pub timestamp_ns: i64,
    pub strides: [(u32, u32); 3],
}

/// The engine's frame input.
///
/// Called once per frame on the capture worker thread, one frame at a
/// time and in production order. The call may block; while it does, the
/// camera backend queues or drops frames on its side.
///
/// Read-only queries on the capturer (`camera_index`,
/// `is_capture_started`, `state`, `lens`) never block and are safe from
/// inside `deliver`. Control calls such as stop or lens switching are not:
/// unbinding waits for the running delivery to return.
pub trait FrameSink: Send + Sync + 'static {
    fn deliver(&self, frame: &PlanarFrame<'_>) -> Result<(), DeliveryError>;
}

impl<S: FrameSink + ?Sized> FrameSink for Arc<S> {
    fn deliver(&self, frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
        (**self).deliver(frame)
    }
}
