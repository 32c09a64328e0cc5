//! Prometheus metrics exporter for capture monitoring.
//!
//! # Metrics Exposed
//!
//! ## Session Metrics
//! - `capture_bridge_capture_started` - Whether a camera session is bound
//! - `capture_bridge_target_fps` - Configured frame rate
//! - `capture_bridge_frame_width` / `capture_bridge_frame_height` - Last frame size
//!
//! ## Frame Metrics
//! - `capture_bridge_frames_delivered_total` - Frames handed to the engine
//! - `capture_bridge_delivery_failures_total` - Frames the engine refused
//! - `capture_bridge_frames_rejected_total` - Frames with an invalid plane layout
//! - `capture_bridge_release_failures_total` - Frames that failed to release
//!
//! ## Bind Metrics
//! - `capture_bridge_binds_total` - Successful camera binds
//! - `capture_bridge_bind_failures_total` - Failed camera binds
//!
//! # Example
//!
//! ```no_run
//! use capture_bridge::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     capture_started: true,
//!     target_fps: 30,
//!     frame_width: 1280,
//!     frame_height: 720,
//!     frames_delivered: 900,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
