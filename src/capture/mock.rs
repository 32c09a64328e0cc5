//! Synthetic camera provider.
//!
//! Produces colour-bar frames for tests, benchmarks and the demo binary
//! without camera hardware. Frames either stream from a producer thread
//! at the bound fps, or are pushed one at a time by the caller.

use super::{CameraError, CameraProvider, ImageAnalysis, Lens, OwnedImage, ReleaseTracker, Rotation};
use crate::format::{rgb_to_i420, FpsRange, I420Planes, PixelFormat, Resolution, Size};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const BAR_COLORS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// How frames reach the bound use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// A producer thread emits frames at the bound fps.
    Streaming { frame_limit: Option<u64> },
    /// Frames are emitted only by [`MockCameraProvider::push_frame`].
    Manual,
}

/// A bind accepted by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRecord {
    pub lens: Lens,
    pub size: Size,
    pub fps_range: FpsRange,
}

struct ActiveStream {
    use_case: Arc<ImageAnalysis>,
    template: Arc<I420Planes>,
    sequence: Arc<AtomicU64>,
    producer: Option<Producer>,
}

struct Producer {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// A camera provider backed by generated frames.
pub struct MockCameraProvider {
    supported: Vec<Size>,
    mode: FrameMode,
    rotation: Rotation,
    tracker: Arc<ReleaseTracker>,
    ready_delay: Duration,
    ready_error: Mutex<Option<String>>,
    bind_error: Mutex<Option<String>>,
    active: Mutex<Option<ActiveStream>>,
    history: Mutex<Vec<BindRecord>>,
    unbinds: AtomicU64,
}

impl MockCameraProvider {
    /// Streams frames continuously.
    pub fn streaming(supported: Vec<Size>) -> Self {
        Self::with_mode(supported, FrameMode::Streaming { frame_limit: None })
    }

    /// Emits frames only when pushed.
    pub fn manual(supported: Vec<Size>) -> Self {
        Self::with_mode(supported, FrameMode::Manual)
    }

    pub fn with_mode(supported: Vec<Size>, mode: FrameMode) -> Self {
        Self {
            supported,
            mode,
            rotation: Rotation::Deg0,
            tracker: ReleaseTracker::new(),
            ready_delay: Duration::ZERO,
            ready_error: Mutex::new(None),
            bind_error: Mutex::new(None),
            active: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            unbinds: AtomicU64::new(0),
        }
    }

    /// Sizes for every engine resolution.
    pub fn standard_sizes() -> Vec<Size> {
        Resolution::ALL.iter().map(|r| r.size()).collect()
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Delays provider readiness, like a slow camera service.
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Tracker that every produced frame reports its release to.
    pub fn tracker(&self) -> &Arc<ReleaseTracker> {
        &self.tracker
    }

    /// Makes every readiness wait fail until cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.ready_error.lock() = reason.map(str::to_owned);
    }

    /// Makes the next bind fail.
    pub fn fail_next_bind(&self, reason: &str) {
        *self.bind_error.lock() = Some(reason.to_owned());
    }

    pub fn is_bound(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn bind_history(&self) -> Vec<BindRecord> {
        self.history.lock().clone()
    }

    pub fn unbind_count(&self) -> u64 {
        self.unbinds.load(Ordering::Relaxed)
    }

    /// Emits one frame into the bound use case.
    ///
    /// Returns `false` if nothing is bound or the frame was not queued.
    pub fn push_frame(&self) -> bool {
        let active = self.active.lock();
        let Some(stream) = active.as_ref() else {
            return false;
        };
        let sequence = stream.sequence.fetch_add(1, Ordering::AcqRel);
        let fps = stream.use_case.config().fps_range.max;
        let image = synthetic_frame(&stream.template, sequence, fps, self.rotation, &self.tracker);
        stream.use_case.submit(Box::new(image))
    }

    fn spawn_producer(
        &self,
        use_case: Arc<ImageAnalysis>,
        template: Arc<I420Planes>,
        sequence: Arc<AtomicU64>,
        frame_limit: Option<u64>,
    ) -> Result<Producer, CameraError> {
        let (stop, stopped) = channel::<()>();
        let fps = use_case.config().fps_range.max.max(1);
        let interval = Duration::from_secs(1) / fps;
        let rotation = self.rotation;
        let tracker = Arc::clone(&self.tracker);

        let thread = thread::Builder::new()
            .name("mock-camera".into())
            .spawn(move || loop {
                let n = sequence.fetch_add(1, Ordering::AcqRel);
                if frame_limit.is_some_and(|limit| n >= limit) {
                    break;
                }
                let image = synthetic_frame(&template, n, fps, rotation, &tracker);
                use_case.submit(Box::new(image));

                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            })
            .map_err(|e| CameraError::Device(e.to_string()))?;

        Ok(Producer { stop, thread })
    }
}

impl CameraProvider for MockCameraProvider {
    fn wait_ready(&self) -> Result<(), CameraError> {
        if !self.ready_delay.is_zero() {
            thread::sleep(self.ready_delay);
        }
        match self.ready_error.lock().as_ref() {
            Some(reason) => Err(CameraError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn bind(&self, use_case: Arc<ImageAnalysis>) -> Result<(), CameraError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(CameraError::AlreadyBound);
        }
        if let Some(reason) = self.bind_error.lock().take() {
            return Err(CameraError::BindFailed(reason));
        }

        let config = *use_case.config();
        if config.output_format != PixelFormat::Yuv420_888 {
            return Err(CameraError::UnsupportedFormat(config.output_format));
        }
        let size = config.select_size(&self.supported)?;
        let template = Arc::new(color_bars(size)?);
        let sequence = Arc::new(AtomicU64::new(0));

        let producer = match self.mode {
            FrameMode::Streaming { frame_limit } => Some(self.spawn_producer(
                Arc::clone(&use_case),
                Arc::clone(&template),
                Arc::clone(&sequence),
                frame_limit,
            )?),
            FrameMode::Manual => None,
        };

        self.history.lock().push(BindRecord {
            lens: use_case.lens(),
            size,
            fps_range: config.fps_range,
        });
        tracing::info!(lens = %use_case.lens(), %size, fps = %config.fps_range, "Mock camera bound");

        *active = Some(ActiveStream {
            use_case,
            template,
            sequence,
            producer,
        });
        Ok(())
    }

    fn unbind_all(&self) {
        let Some(stream) = self.active.lock().take() else {
            return;
        };

        if let Some(producer) = stream.producer {
            drop(producer.stop);
            if producer.thread.join().is_err() {
                tracing::error!("Mock camera producer panicked");
            }
        }
        stream.use_case.close();
        self.unbinds.fetch_add(1, Ordering::Relaxed);
        tracing::info!(lens = %stream.use_case.lens(), "Mock camera unbound");
    }
}

impl Drop for MockCameraProvider {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

/// Vertical colour bars converted to I420.
fn color_bars(size: Size) -> Result<I420Planes, CameraError> {
    let (w, h) = (size.width as usize, size.height as usize);
    let bar_width = (w / BAR_COLORS.len()).max(1);
    let mut rgb = Vec::with_capacity(w * h * 3);
    for _ in 0..h {
        for col in 0..w {
            let bar = (col / bar_width).min(BAR_COLORS.len() - 1);
            rgb.extend_from_slice(&BAR_COLORS[bar]);
        }
    }
    rgb_to_i420(&rgb, size.width, size.height).map_err(|e| CameraError::Device(e.to_string()))
}

fn synthetic_frame(
    template: &I420Planes,
    sequence: u64,
    fps: u32,
    rotation: Rotation,
    tracker: &Arc<ReleaseTracker>,
) -> OwnedImage {
    let frame_ns = 1_000_000_000 / i64::from(fps.max(1));
    let mut planes = template.clone();
    // Mark the frame so consecutive frames differ.
    if let Some(first) = planes.y.first_mut() {
        *first = (sequence % 256) as u8;
    }
    OwnedImage::from_i420(planes)
        .with_rotation(rotation)
        .with_timestamp(sequence as i64 * frame_ns)
        .with_tracker(Arc::clone(tracker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameAnalyzer, SerialExecutor, UseCaseConfig};
    use crate::delivery::RecordingSink;
    use crate::format::FrameRate;

    fn use_case(
        executor: &SerialExecutor,
        lens: Lens,
        resolution: Resolution,
    ) -> (Arc<ImageAnalysis>, std::sync::mpsc::Receiver<crate::delivery::FrameMetadata>) {
        let (sink, rx) = RecordingSink::new();
        let analysis = ImageAnalysis::new(
            lens,
            UseCaseConfig::new(resolution, FrameRate::Fps30),
            executor.handle(),
            Arc::new(FrameAnalyzer::new(sink)),
        );
        (Arc::new(analysis), rx)
    }

    #[test]
    fn test_streaming_respects_frame_limit() {
        let executor = SerialExecutor::spawn("mock-limit").unwrap();
        let provider = MockCameraProvider::with_mode(
            vec![Size::new(352, 288)],
            FrameMode::Streaming { frame_limit: Some(3) },
        );
        let (analysis, rx) = use_case(&executor, Lens::Front, Resolution::Low);

        provider.bind(analysis).unwrap();
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        provider.unbind_all();
        executor.shutdown();
        assert_eq!(provider.tracker().released(), 3);
    }

    #[test]
    fn test_second_bind_rejected() {
        let executor = SerialExecutor::spawn("mock-twice").unwrap();
        let provider = MockCameraProvider::manual(MockCameraProvider::standard_sizes());
        let (first, _rx1) = use_case(&executor, Lens::Front, Resolution::Low);
        let (second, _rx2) = use_case(&executor, Lens::Back, Resolution::Low);

        provider.bind(first).unwrap();
        assert!(matches!(provider.bind(second), Err(CameraError::AlreadyBound)));
    }

    #[test]
    fn test_closest_higher_size_bound() {
        let executor = SerialExecutor::spawn("mock-size").unwrap();
        let provider = MockCameraProvider::manual(vec![Size::new(320, 240), Size::new(800, 600)]);
        let (analysis, rx) = use_case(&executor, Lens::Back, Resolution::Medium);

        provider.bind(analysis).unwrap();
        assert!(provider.push_frame());
        let meta = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((meta.width, meta.height), (800, 600));
        assert_eq!(provider.bind_history()[0].size, Size::new(800, 600));
    }

    #[test]
    fn test_unbind_nothing_is_noop() {
        let provider = MockCameraProvider::manual(MockCameraProvider::standard_sizes());
        provider.unbind_all();
        assert_eq!(provider.unbind_count(), 0);
        assert!(!provider.push_frame());
    }

    #[test]
    fn test_color_bars_dimensions() {
        let planes = color_bars(Size::new(16, 8)).unwrap();
        assert_eq!(planes.y.len(), 128);
        assert_eq!(planes.u.len(), 32);
        // White bar on the left, black on the right.
        assert!(planes.y[0] > 250);
        assert_eq!(planes.y[15], 0);
    }
}
