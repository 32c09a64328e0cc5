//! The image analysis use case bound to a camera.

use super::{Analyzer, ExecutorHandle, FrameGuard, ImageProxy, Lens, UseCaseConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One bound analysis session.
///
/// Backends push frames with [`submit`](ImageAnalysis::submit); each
/// frame is analyzed on the capture executor and released afterwards.
/// After [`close`](ImageAnalysis::close) returns, no frame of this
/// session reaches the analyzer: frames still queued are released
/// without being analyzed.
pub struct ImageAnalysis {
    lens: Lens,
    config: UseCaseConfig,
    executor: ExecutorHandle,
    analyzer: Arc<dyn Analyzer>,
    closed: Arc<AtomicBool>,
    // Held for the whole analyze step.
    gate: Arc<Mutex<()>>,
}

impl ImageAnalysis {
    pub fn new(
        lens: Lens,
        config: UseCaseConfig,
        executor: ExecutorHandle,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            lens,
            config,
            executor,
            analyzer,
            closed: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn lens(&self) -> Lens {
        self.lens
    }

    pub fn config(&self) -> &UseCaseConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queues a frame for analysis without waiting for it.
    ///
    /// Returns `false` if the session is closed or the executor is gone;
    /// the frame has been released in that case.
    pub fn submit(&self, image: Box<dyn ImageProxy>) -> bool {
        let guard = FrameGuard::new(image, Arc::clone(&self.analyzer));
        if self.is_closed() {
            tracing::trace!(lens = %self.lens, "Frame submitted to closed session");
            return false;
        }

        let closed = Arc::clone(&self.closed);
        let gate = Arc::clone(&self.gate);
        let analyzer = Arc::clone(&self.analyzer);
        let lens = self.lens;

        let queued = self.executor.execute(move || {
            let _gate = gate.lock();
            if !closed.load(Ordering::Acquire) {
                if let Some(image) = guard.image() {
                    analyzer.analyze(image, lens);
                }
            }
            // Release before the gate opens so close() covers it.
            drop(guard);
        });

        match queued {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Frame dropped");
                false
            }
        }
    }

    /// Stops analysis for this session.
    ///
    /// Blocks until an analyze step already running has returned. Must
    /// not be called from inside a frame sink.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.gate.lock());
        tracing::debug!(lens = %self.lens, "Analysis session closed");
    }
}

impl Drop for ImageAnalysis {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameAnalyzer, OwnedImage, ReleaseTracker, SerialExecutor};
    use crate::delivery::{DeliveryError, FrameSink, PlanarFrame, RecordingSink};
    use crate::format::{rgb_to_i420, FrameRate, Resolution};
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    fn image(tracker: &Arc<ReleaseTracker>, timestamp_ns: i64) -> Box<dyn ImageProxy> {
        let planes = rgb_to_i420(&[0u8; 4 * 4 * 3], 4, 4).unwrap();
        Box::new(
            OwnedImage::from_i420(planes)
                .with_timestamp(timestamp_ns)
                .with_tracker(Arc::clone(tracker)),
        )
    }

    fn config() -> UseCaseConfig {
        UseCaseConfig::new(Resolution::Low, FrameRate::Fps30)
    }

    /// Blocks every delivery until the test lets it through.
    struct BlockingSink {
        entered: Mutex<Sender<i64>>,
        proceed: Mutex<Receiver<()>>,
    }

    impl FrameSink for BlockingSink {
        fn deliver(&self, frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
            let _ = self.entered.lock().send(frame.timestamp_ns);
            let _ = self.proceed.lock().recv();
            Ok(())
        }
    }

    #[test]
    fn test_submit_analyzes_and_releases() {
        let executor = SerialExecutor::spawn("session-test").unwrap();
        let (sink, rx) = RecordingSink::new();
        let analyzer = Arc::new(FrameAnalyzer::new(sink));
        let session = ImageAnalysis::new(Lens::Back, config(), executor.handle(), analyzer);
        let tracker = ReleaseTracker::new();

        assert!(session.submit(image(&tracker, 1)));
        let meta = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(meta.timestamp_ns, 1);
        assert!(!meta.mirrored);

        executor.shutdown();
        assert_eq!(tracker.released(), 1);
    }

    #[test]
    fn test_closed_session_releases_without_analysis() {
        let executor = SerialExecutor::spawn("session-closed").unwrap();
        let (sink, rx) = RecordingSink::new();
        let session = ImageAnalysis::new(
            Lens::Front,
            config(),
            executor.handle(),
            Arc::new(FrameAnalyzer::new(sink)),
        );
        let tracker = ReleaseTracker::new();

        session.close();
        assert!(!session.submit(image(&tracker, 1)));
        assert_eq!(tracker.released(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_waits_for_in_flight_frame_and_drops_queued() {
        let executor = SerialExecutor::spawn("session-in-flight").unwrap();
        let (entered_tx, entered_rx) = channel();
        let (proceed_tx, proceed_rx) = channel();
        let sink = BlockingSink {
            entered: Mutex::new(entered_tx),
            proceed: Mutex::new(proceed_rx),
        };
        let analyzer = Arc::new(FrameAnalyzer::new(sink));
        let session = Arc::new(ImageAnalysis::new(
            Lens::Front,
            config(),
            executor.handle(),
            analyzer.clone(),
        ));
        let tracker = ReleaseTracker::new();

        assert!(session.submit(image(&tracker, 1)));
        assert!(session.submit(image(&tracker, 2)));
        assert_eq!(entered_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        let closer = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.close())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!closer.is_finished());

        proceed_tx.send(()).unwrap();
        closer.join().unwrap();

        executor.shutdown();
        assert_eq!(analyzer.stats().delivered(), 1);
        assert!(entered_rx.try_recv().is_err());
        assert_eq!(tracker.released(), 2);
    }
}
