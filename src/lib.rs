//! Camera Capture Bridge Library
//!
//! Feeds camera frames to a video-call engine that accepts frames from a
//! custom capturer. The engine drives the capturer's lifecycle; the
//! capturer binds an analysis use case to a camera, receives planar YUV
//! frames on a dedicated worker and hands each one to the engine without
//! copying.
//!
//! # Architecture
//!
//! ```text
//! camera provider → image analysis → frame analyzer → frame sink
//!        ↑                                  ↓
//!   capture controller (lifecycle)    release to camera
//! ```
//!
//! # Guarantees
//!
//! - **Released exactly once**: every frame goes back to the camera,
//!   whether delivery succeeds, fails or panics
//! - **Ordered delivery**: frames reach the sink one at a time, in
//!   arrival order
//! - **Quiet after stop**: once `stop_capture` returns no further frame
//!   reaches the sink
//!
//! # Example
//!
//! ```no_run
//! use capture_bridge::{
//!     capture::{CaptureController, MockCameraProvider, VideoCapturer},
//!     delivery::RecordingSink,
//!     format::{FrameRate, Resolution},
//! };
//! use std::sync::Arc;
//!
//! let provider = MockCameraProvider::streaming(MockCameraProvider::standard_sizes());
//! let (sink, frames) = RecordingSink::new();
//! let capturer = CaptureController::new(
//!     provider,
//!     Arc::new(sink),
//!     Resolution::High,
//!     FrameRate::Fps30,
//! );
//!
//! capturer.init().unwrap();
//! capturer.start_capture().unwrap();
//!
//! let first = frames.recv().unwrap();
//! println!("{}x{} rotated {:?}", first.width, first.height, first.rotation);
//!
//! let settings = capturer.capture_settings();
//! assert_eq!(settings.fps, 30);
//!
//! capturer.stop_capture().unwrap();
//! capturer.destroy();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod delivery;
pub mod format;
pub mod metrics;

// Re-export commonly used types at crate root
pub use capture::{
    CameraProvider, CaptureConfig, CaptureController, CaptureError, CaptureEvent, CaptureState,
    CaptureSwitch, Lens, MockCameraProvider, VideoCapturer,
};
pub use delivery::{FrameSink, PlanarFrame, RenderStyle, StyleKey, StyleValue};
pub use format::{CaptureSettings, FrameRate, PixelFormat, Resolution};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
