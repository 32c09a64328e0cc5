//! Camera capture and frame handoff.
//!
//! A [`CaptureController`] binds an [`ImageAnalysis`] use case to a
//! [`CameraProvider`]. The provider pushes frames into the use case; each
//! frame is analyzed on a dedicated worker by a [`FrameAnalyzer`], which
//! hands a borrowed planar view to the engine's sink and then releases
//! the frame back to the provider.

mod analyzer;
mod camera;
mod config;
mod controller;
mod executor;
mod frame;
mod mock;
mod session;
#[cfg(feature = "camera")]
mod webcam;

pub use analyzer::{AnalyzeError, Analyzer, AnalyzerStats, FrameAnalyzer, FrameGuard};
pub use camera::{select_resolution, CameraError, CameraProvider, FallbackRule, Lens, UseCaseConfig};
pub use config::{CaptureConfig, ConfigError, FileConfig, OutputConfig};
pub use controller::{
    status_code, CaptureController, CaptureError, CaptureEvent, CaptureState, CaptureStats,
    CaptureSwitch, VideoCapturer,
};
pub use executor::{ExecutorError, ExecutorHandle, SerialExecutor};
pub use frame::{ImageProxy, OwnedImage, OwnedPlane, Plane, ReleaseTracker, Rotation};
pub use mock::{BindRecord, FrameMode, MockCameraProvider};
pub use session::ImageAnalysis;
#[cfg(feature = "camera")]
pub use webcam::{DeviceMap, NokhwaCameraProvider};
