//! Camera frame handles and planar views.

use super::CameraError;
use crate::format::{chroma_dimensions, FormatError, I420Planes};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A borrowed image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between horizontally adjacent samples.
    pub pixel_stride: u32,
    /// Bytes between vertically adjacent samples.
    pub row_stride: u32,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], pixel_stride: u32, row_stride: u32) -> Self {
        Self {
            data,
            pixel_stride,
            row_stride,
        }
    }
}

/// Clockwise rotation needed to display a frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = FormatError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(FormatError::UnsupportedRotation(other)),
        }
    }
}

/// A frame owned by the camera backend.
///
/// The plane memory belongs to the backend and is recycled as soon as
/// [`close`](ImageProxy::close) is called, so views returned by
/// [`planes`](ImageProxy::planes) must not outlive the handle.
pub trait ImageProxy: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn rotation(&self) -> Rotation;
    fn timestamp_ns(&self) -> i64;
    /// Y, U and V planes, in that order.
    fn planes(&self) -> [Plane<'_>; 3];
    /// Returns the frame's buffer to the backend.
    fn close(self: Box<Self>) -> Result<(), CameraError>;
}

/// Counts frame releases and can be told to make them fail.
#[derive(Debug, Default)]
pub struct ReleaseTracker {
    released: AtomicU64,
    failed: AtomicU64,
    fail_releases: AtomicBool,
}

impl ReleaseTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of successful releases.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    /// Number of releases that reported an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Total release attempts.
    pub fn attempts(&self) -> u64 {
        self.released() + self.failed()
    }

    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::Release);
    }

    fn release(&self) -> Result<(), CameraError> {
        if self.fail_releases.load(Ordering::Acquire) {
            self.failed.fetch_add(1, Ordering::AcqRel);
            return Err(CameraError::ReleaseFailed("buffer already recycled".into()));
        }
        self.released.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Heap-backed plane.
#[derive(Debug, Clone)]
pub struct OwnedPlane {
    pub data: Vec<u8>,
    pub pixel_stride: u32,
    pub row_stride: u32,
}

impl OwnedPlane {
    pub fn packed(data: Vec<u8>, row_stride: u32) -> Self {
        Self {
            data,
            pixel_stride: 1,
            row_stride,
        }
    }

    fn view(&self) -> Plane<'_> {
        Plane::new(&self.data, self.pixel_stride, self.row_stride)
    }
}

/// An [`ImageProxy`] whose planes live on the heap.
///
/// Used by software frame sources. Releasing it drops the buffers and
/// reports to an optional [`ReleaseTracker`].
#[derive(Debug)]
pub struct OwnedImage {
    planes: [OwnedPlane; 3],
    width: u32,
    height: u32,
    rotation: Rotation,
    timestamp_ns: i64,
    tracker: Option<Arc<ReleaseTracker>>,
}

impl OwnedImage {
    pub fn new(planes: [OwnedPlane; 3], width: u32, height: u32) -> Self {
        Self {
            planes,
            width,
            height,
            rotation: Rotation::Deg0,
            timestamp_ns: 0,
            tracker: None,
        }
    }

    /// Wraps tightly packed I420 planes.
    pub fn from_i420(i420: I420Planes) -> Self {
        let (chroma_width, _) = chroma_dimensions(i420.width, i420.height);
        Self::new(
            [
                OwnedPlane::packed(i420.y, i420.width),
                OwnedPlane::packed(i420.u, chroma_width),
                OwnedPlane::packed(i420.v, chroma_width),
            ],
            i420.width,
            i420.height,
        )
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ReleaseTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

impl ImageProxy for OwnedImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    fn planes(&self) -> [Plane<'_>; 3] {
        [
            self.planes[0].view(),
            self.planes[1].view(),
            self.planes[2].view(),
        ]
    }

    fn close(self: Box<Self>) -> Result<(), CameraError> {
        match &self.tracker {
            Some(tracker) => tracker.release(),
            None => Ok(()),
        }
    }
}
