//! Per-frame analysis: validate, deliver, release.

use super::{CameraError, ImageProxy, Lens};
use crate::delivery::{DeliveryError, FrameSink, PlanarFrame};
use crate::format::{chroma_dimensions, FormatError, PlaneLayout, Size};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why a frame was not delivered.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid frame layout: {0}")]
    Layout(#[from] FormatError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Receives frames from a bound use case on the capture worker.
pub trait Analyzer: Send + Sync + 'static {
    /// Handles one frame. The caller releases the frame afterwards.
    fn analyze(&self, image: &dyn ImageProxy, lens: Lens);

    /// Called when returning a frame to the backend fails.
    fn release_failed(&self, error: CameraError) {
        tracing::warn!(error = %error, "Failed to release frame");
    }
}

/// Owns a frame until it is dropped, then returns it to the backend.
///
/// Release happens on every exit path, including unwinding out of a
/// panicking sink.
pub struct FrameGuard {
    image: Option<Box<dyn ImageProxy>>,
    analyzer: Arc<dyn Analyzer>,
}

impl FrameGuard {
    pub fn new(image: Box<dyn ImageProxy>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            image: Some(image),
            analyzer,
        }
    }

    pub fn image(&self) -> Option<&dyn ImageProxy> {
        self.image.as_deref()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(image) = self.image.take() {
            if let Err(e) = image.close() {
                self.analyzer.release_failed(e);
            }
        }
    }
}

/// Frame counters kept by the analyzer.
#[derive(Debug, Default)]
pub struct AnalyzerStats {
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    rejected: AtomicU64,
    release_failures: AtomicU64,
}

impl AnalyzerStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Frames dropped because their planes did not match their layout.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Relaxed)
    }
}

/// Turns camera frames into [`PlanarFrame`] views for a [`FrameSink`].
///
/// Plane data is borrowed, never copied. The only state that outlives a
/// frame is the size of the most recent one, kept for settings queries.
pub struct FrameAnalyzer<S> {
    sink: S,
    last_frame: Mutex<Option<Size>>,
    stats: AnalyzerStats,
}

impl<S: FrameSink> FrameAnalyzer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last_frame: Mutex::new(None),
            stats: AnalyzerStats::default(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &AnalyzerStats {
        &self.stats
    }

    /// Size of the last frame seen since the snapshot was cleared.
    pub fn last_frame(&self) -> Option<Size> {
        *self.last_frame.lock()
    }

    pub fn clear_last_frame(&self) {
        *self.last_frame.lock() = None;
    }

    /// Validates a frame and hands it to the sink.
    pub fn process(&self, image: &dyn ImageProxy, mirrored: bool) -> Result<(), AnalyzeError> {
        let frame = planar_view(image, mirrored).inspect_err(|_| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        })?;

        *self.last_frame.lock() = Some(Size::new(frame.width, frame.height));

        match self.sink.deliver(&frame) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    width = frame.width,
                    height = frame.height,
                    rotation = frame.rotation_degrees(),
                    mirrored,
                    timestamp_ns = frame.timestamp_ns,
                    "Frame delivered"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.delivery_failures.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }
}

impl<S: FrameSink> Analyzer for FrameAnalyzer<S> {
    fn analyze(&self, image: &dyn ImageProxy, lens: Lens) {
        match self.process(image, lens.is_front()) {
            Ok(()) => {}
            Err(AnalyzeError::Layout(e)) => {
                tracing::warn!(error = %e, "Dropping frame with invalid layout");
            }
            Err(AnalyzeError::Delivery(e)) => {
                tracing::warn!(error = %e, "Frame delivery failed");
            }
        }
    }

    fn release_failed(&self, error: CameraError) {
        self.stats.release_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(error = %error, "Failed to release frame");
    }
}

/// Builds the planar view of a frame after checking its planes.
fn planar_view(image: &dyn ImageProxy, mirrored: bool) -> Result<PlanarFrame<'_>, FormatError> {
    let (width, height) = (image.width(), image.height());
    let (chroma_width, chroma_height) = chroma_dimensions(width, height);
    let [y, u, v] = image.planes();

    let luma = PlaneLayout {
        width,
        height,
        pixel_stride: y.pixel_stride,
        row_stride: y.row_stride,
    };
    luma.validate("y", y.data.len())?;

    for (name, plane) in [("u", &u), ("v", &v)] {
        PlaneLayout {
            width: chroma_width,
            height: chroma_height,
            pixel_stride: plane.pixel_stride,
            row_stride: plane.row_stride,
        }
        .validate(name, plane.data.len())?;
    }

    Ok(PlanarFrame {
        y,
        u,
        v,
        width,
        height,
        rotation: image.rotation(),
        mirrored,
        timestamp_ns: image.timestamp_ns(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{OwnedImage, OwnedPlane, ReleaseTracker, Rotation};
    use crate::delivery::RecordingSink;
    use crate::format::I420Planes;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn gray(width: u32, height: u32) -> OwnedImage {
        let (cw, ch) = chroma_dimensions(width, height);
        OwnedImage::from_i420(I420Planes {
            y: vec![16; (width * height) as usize],
            u: vec![128; (cw * ch) as usize],
            v: vec![128; (cw * ch) as usize],
            width,
            height,
        })
    }

    struct PanickingSink;

    impl FrameSink for PanickingSink {
        fn deliver(&self, _frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
            panic!("engine crashed");
        }
    }

    struct RejectingSink;

    impl FrameSink for RejectingSink {
        fn deliver(&self, _frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
            Err(DeliveryError::Rejected("busy".into()))
        }
    }

    #[test]
    fn test_delivers_metadata() {
        let (sink, rx) = RecordingSink::new();
        let analyzer = FrameAnalyzer::new(sink);
        let image = gray(8, 6).with_rotation(Rotation::Deg270).with_timestamp(99);

        analyzer.analyze(&image, Lens::Front);

        let meta = rx.try_recv().unwrap();
        assert_eq!((meta.width, meta.height), (8, 6));
        assert_eq!(meta.rotation, Rotation::Deg270);
        assert!(meta.mirrored);
        assert_eq!(meta.timestamp_ns, 99);
        assert_eq!(meta.strides, [(1, 8), (1, 4), (1, 4)]);
        assert_eq!(analyzer.stats().delivered(), 1);
        assert_eq!(analyzer.last_frame(), Some(Size::new(8, 6)));
    }

    #[test]
    fn test_back_lens_not_mirrored() {
        let (sink, rx) = RecordingSink::new();
        let analyzer = FrameAnalyzer::new(sink);
        analyzer.analyze(&gray(4, 4), Lens::Back);
        assert!(!rx.try_recv().unwrap().mirrored);
    }

    #[test]
    fn test_rejects_short_plane() {
        let (sink, _rx) = RecordingSink::new();
        let analyzer = FrameAnalyzer::new(sink);
        let image = OwnedImage::new(
            [
                OwnedPlane::packed(vec![0; 10], 4),
                OwnedPlane::packed(vec![0; 4], 2),
                OwnedPlane::packed(vec![0; 4], 2),
            ],
            4,
            4,
        );

        let result = analyzer.process(&image, false);
        assert!(matches!(
            result,
            Err(AnalyzeError::Layout(FormatError::PlaneTooSmall { plane: "y", .. }))
        ));
        assert_eq!(analyzer.stats().rejected(), 1);
        assert!(analyzer.sink().is_empty());
        assert_eq!(analyzer.last_frame(), None);
    }

    #[test]
    fn test_semi_planar_chroma_accepted() {
        // Interleaved VU buffer viewed as two planes with pixel stride 2.
        let (sink, _rx) = RecordingSink::new();
        let analyzer = FrameAnalyzer::new(sink);
        let image = OwnedImage::new(
            [
                OwnedPlane::packed(vec![0; 16], 4),
                OwnedPlane {
                    data: vec![0; 7],
                    pixel_stride: 2,
                    row_stride: 4,
                },
                OwnedPlane {
                    data: vec![0; 7],
                    pixel_stride: 2,
                    row_stride: 4,
                },
            ],
            4,
            4,
        );
        assert!(analyzer.process(&image, true).is_ok());
    }

    #[test]
    fn test_delivery_error_counted() {
        let analyzer = FrameAnalyzer::new(RejectingSink);
        analyzer.analyze(&gray(2, 2), Lens::Front);
        assert_eq!(analyzer.stats().delivery_failures(), 1);
        assert_eq!(analyzer.stats().delivered(), 0);
    }

    #[test]
    fn test_guard_releases_when_sink_panics() {
        let tracker = ReleaseTracker::new();
        let analyzer: Arc<dyn Analyzer> = Arc::new(FrameAnalyzer::new(PanickingSink));
        let guard = FrameGuard::new(
            Box::new(gray(2, 2).with_tracker(tracker.clone())),
            Arc::clone(&analyzer),
        );

        let result = catch_unwind(AssertUnwindSafe(move || {
            let guard = guard;
            if let Some(image) = guard.image() {
                analyzer.analyze(image, Lens::Front);
            }
        }));

        assert!(result.is_err());
        assert_eq!(tracker.released(), 1);
    }

    #[test]
    fn test_release_failure_counted() {
        let tracker = ReleaseTracker::new();
        tracker.set_fail_releases(true);
        let (sink, _rx) = RecordingSink::new();
        let analyzer = Arc::new(FrameAnalyzer::new(sink));

        drop(FrameGuard::new(
            Box::new(gray(2, 2).with_tracker(tracker.clone())),
            analyzer.clone(),
        ));

        assert_eq!(tracker.failed(), 1);
        assert_eq!(analyzer.stats().release_failures(), 1);
    }
}
