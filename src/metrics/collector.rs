//! Metrics collection and registry.

use crate::capture::CaptureStats;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of capture state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether a camera use case is currently bound.
    pub capture_started: bool,
    /// Configured frames per second.
    pub target_fps: u32,
    /// Width of the last delivered frame.
    pub frame_width: u32,
    /// Height of the last delivered frame.
    pub frame_height: u32,
    /// Frames handed to the engine.
    pub frames_delivered: u64,
    /// Frames the engine refused.
    pub delivery_failures: u64,
    /// Frames dropped for an invalid plane layout.
    pub frames_rejected: u64,
    /// Frames whose release back to the camera failed.
    pub release_failures: u64,
    /// Successful camera binds.
    pub binds: u64,
    /// Failed camera binds.
    pub bind_failures: u64,
}

impl From<CaptureStats> for MetricsSnapshot {
    fn from(stats: CaptureStats) -> Self {
        Self {
            capture_started: stats.capture_started,
            target_fps: stats.target_fps,
            frame_width: stats.frame_width,
            frame_height: stats.frame_height,
            frames_delivered: stats.frames_delivered,
            delivery_failures: stats.delivery_failures,
            frames_rejected: stats.frames_rejected,
            release_failures: stats.release_failures,
            binds: stats.binds,
            bind_failures: stats.bind_failures,
        }
    }
}

/// Prometheus metrics registry for capture monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    capture_started: IntGauge,
    target_fps: IntGauge,
    frame_width: IntGauge,
    frame_height: IntGauge,

    // Frame metrics
    frames_delivered: IntCounter,
    delivery_failures: IntCounter,
    frames_rejected: IntCounter,
    release_failures: IntCounter,

    // Bind metrics
    binds: IntCounter,
    bind_failures: IntCounter,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Raises a counter to `target`. Counters never go down.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let capture_started = gauge(
            &registry,
            "capture_bridge_capture_started",
            "Whether a camera session is bound (1=bound, 0=not bound)",
        )?;
        let target_fps = gauge(
            &registry,
            "capture_bridge_target_fps",
            "Configured capture frame rate",
        )?;
        let frame_width = gauge(
            &registry,
            "capture_bridge_frame_width",
            "Width of the last delivered frame in pixels",
        )?;
        let frame_height = gauge(
            &registry,
            "capture_bridge_frame_height",
            "Height of the last delivered frame in pixels",
        )?;

        let frames_delivered = counter(
            &registry,
            "capture_bridge_frames_delivered_total",
            "Total frames delivered to the engine",
        )?;
        let delivery_failures = counter(
            &registry,
            "capture_bridge_delivery_failures_total",
            "Total frames rejected by the engine",
        )?;
        let frames_rejected = counter(
            &registry,
            "capture_bridge_frames_rejected_total",
            "Total frames dropped for an invalid plane layout",
        )?;
        let release_failures = counter(
            &registry,
            "capture_bridge_release_failures_total",
            "Total frames that failed to release back to the camera",
        )?;

        let binds = counter(
            &registry,
            "capture_bridge_binds_total",
            "Total successful camera binds",
        )?;
        let bind_failures = counter(
            &registry,
            "capture_bridge_bind_failures_total",
            "Total failed camera binds",
        )?;

        Ok(Self {
            registry,
            capture_started,
            target_fps,
            frame_width,
            frame_height,
            frames_delivered,
            delivery_failures,
            frames_rejected,
            release_failures,
            binds,
            bind_failures,
        })
    }

    /// Updates all metrics from a snapshot of capture state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.capture_started.set(i64::from(snapshot.capture_started));
        self.target_fps.set(i64::from(snapshot.target_fps));
        self.frame_width.set(i64::from(snapshot.frame_width));
        self.frame_height.set(i64::from(snapshot.frame_height));

        advance(&self.frames_delivered, snapshot.frames_delivered);
        advance(&self.delivery_failures, snapshot.delivery_failures);
        advance(&self.frames_rejected, snapshot.frames_rejected);
        advance(&self.release_failures, snapshot.release_failures);
        advance(&self.binds, snapshot.binds);
        advance(&self.bind_failures, snapshot.bind_failures);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            capture_started: true,
            target_fps: 30,
            frame_width: 1280,
            frame_height: 720,
            frames_delivered: 42,
            binds: 2,
            ..Default::default()
        };
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("capture_bridge_capture_started 1"));
        assert!(output.contains("capture_bridge_frame_width 1280"));
        assert!(output.contains("capture_bridge_frames_delivered_total 42"));
        assert!(output.contains("capture_bridge_binds_total 2"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames_delivered: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_delivered: 4,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("capture_bridge_frames_delivered_total 10"));
        assert!(output.contains("capture_bridge_capture_started 0"));
    }

    #[test]
    fn test_snapshot_from_stats() {
        let stats = CaptureStats {
            capture_started: true,
            release_failures: 3,
            ..Default::default()
        };
        let snapshot = MetricsSnapshot::from(stats);
        assert!(snapshot.capture_started);
        assert_eq!(snapshot.release_failures, 3);
    }
}
