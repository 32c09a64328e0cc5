//! Camera Capture Bridge CLI
//!
//! Drives a capturer the way a video-call engine would: init, start,
//! optional lens cycling, stop and destroy. Frames come from the
//! synthetic provider unless a webcam is requested.

use capture_bridge::{
    capture::{
        status_code, CameraProvider, CaptureConfig, CaptureController, CaptureEvent,
        CaptureSwitch, FileConfig, Lens, MockCameraProvider, OutputConfig, VideoCapturer,
    },
    delivery::{DeliveryError, FrameMetadata, FrameSink, PlanarFrame, RenderStyle, StyleKey, StyleSettings},
    format::{FrameRate, Resolution},
    metrics::MetricsSnapshot,
};
use clap::Parser;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const LOG_EVERY: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "capture-bridge", version, about = "Feed camera frames to a video engine")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture resolution (LOW, MEDIUM, HIGH, HIGH_1080P)
    #[arg(short, long)]
    resolution: Option<Resolution>,

    /// Frame rate (FPS_1, FPS_7, FPS_15, FPS_30)
    #[arg(short, long)]
    fps: Option<FrameRate>,

    /// Starting lens (0 = front, 1 = back)
    #[arg(short, long)]
    lens: Option<i32>,

    /// Stop after delivering this many frames
    #[arg(short = 'n', long)]
    frames: Option<u32>,

    /// Run until interrupted
    #[arg(long)]
    continuous: bool,

    /// Cycle the camera after this many frames (0 disables)
    #[arg(long)]
    cycle_every: Option<u32>,

    /// Prometheus exporter port (0 disables)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Capture from a local webcam instead of synthetic frames
    #[cfg(feature = "camera")]
    #[arg(long)]
    device: bool,
}

/// Stands in for the engine: logs frames and forwards their metadata.
struct LoggingSink {
    count: AtomicU64,
    frames: Mutex<Sender<FrameMetadata>>,
}

impl LoggingSink {
    fn new() -> (Self, Receiver<FrameMetadata>) {
        let (tx, rx) = channel();
        let sink = Self {
            count: AtomicU64::new(0),
            frames: Mutex::new(tx),
        };
        (sink, rx)
    }
}

impl FrameSink for LoggingSink {
    fn deliver(&self, frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count == 1 || count % LOG_EVERY == 0 {
            info!(
                at = %chrono::Local::now().format("%H:%M:%S%.3f"),
                frame = count,
                width = frame.width,
                height = frame.height,
                rotation = frame.rotation_degrees(),
                mirrored = frame.mirrored,
                "Frame delivered"
            );
        }
        self.frames
            .lock()
            .send(frame.metadata())
            .map_err(|_| DeliveryError::Closed)
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut file_config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Err(e) = apply_overrides(&args, &mut file_config) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    info!("Capture Bridge v{}", capture_bridge::VERSION);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!("Failed to install interrupt handler: {}", e);
        }
    }

    let FileConfig { capture, output } = file_config;

    if let Some(code) = run_webcam(&args, &capture, &output, &stop) {
        std::process::exit(code);
    }

    info!("This is a demonstration using synthetic camera input");
    let provider = MockCameraProvider::streaming(MockCameraProvider::standard_sizes())
        .with_rotation(capture.sensor_rotation());
    std::process::exit(run(provider, &capture, &output, &stop));
}

fn apply_overrides(args: &Args, config: &mut FileConfig) -> Result<(), String> {
    if let Some(resolution) = args.resolution {
        config.capture.resolution = resolution;
    }
    if let Some(fps) = args.fps {
        config.capture.frame_rate = fps;
    }
    if let Some(id) = args.lens {
        config.capture.lens = Lens::from_id(id).ok_or_else(|| format!("unknown lens id: {}", id))?;
    }
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    if args.continuous {
        config.output.continuous = true;
    }
    if let Some(cycle_every) = args.cycle_every {
        config.output.cycle_every = cycle_every;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }
    Ok(())
}

#[cfg(feature = "camera")]
fn run_webcam(
    args: &Args,
    capture: &CaptureConfig,
    output: &OutputConfig,
    stop: &AtomicBool,
) -> Option<i32> {
    use capture_bridge::capture::{DeviceMap, NokhwaCameraProvider};

    if !args.device {
        return None;
    }
    info!("Capturing from local webcam");
    let provider = NokhwaCameraProvider::new(DeviceMap {
        front: capture.front_device,
        back: capture.back_device,
    });
    Some(run(provider, capture, output, stop))
}

#[cfg(not(feature = "camera"))]
fn run_webcam(
    _args: &Args,
    _capture: &CaptureConfig,
    _output: &OutputConfig,
    _stop: &AtomicBool,
) -> Option<i32> {
    None
}

/// Runs one capture session and returns the process exit code.
fn run<P: CameraProvider>(
    provider: P,
    capture: &CaptureConfig,
    output: &OutputConfig,
    stop: &AtomicBool,
) -> i32 {
    let styles = StyleSettings::new();
    styles.set_style(StyleKey::VideoScale, output.video_scale);
    info!(scale = %styles.style(StyleKey::VideoScale), "Local view style");

    let (sink, frames) = LoggingSink::new();
    let capturer = CaptureController::new(provider, sink, capture.resolution, capture.frame_rate)
        .with_lens(capture.lens);
    let events = capturer.subscribe();
    let metrics = Metrics::start(output.metrics_port);

    let started = capturer.init().and_then(|()| capturer.start_capture());
    if let Err(e) = &started {
        error!(status = status_code(&started), "Failed to start capture: {}", e);
        capturer.destroy();
        return 1;
    }

    let mut delivered: u64 = 0;
    let mut exit_code = 0;
    while !stop.load(Ordering::SeqCst) {
        let received = match frames.recv_timeout(POLL_INTERVAL) {
            Ok(_) => {
                delivered += 1;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(code) = drain_events(&events, &metrics) {
            exit_code = code;
            break;
        }
        metrics.update(MetricsSnapshot::from(capturer.stats()));

        let cycle_every = u64::from(output.cycle_every);
        if received && cycle_every > 0 && delivered % cycle_every == 0 {
            match capturer.cycle_camera() {
                Ok(()) => info!(index = capturer.camera_index(), "Camera cycled"),
                Err(e) => warn!("Camera cycle failed: {}", e),
            }
        }

        if !output.continuous && delivered >= u64::from(output.frame_count) {
            break;
        }
    }

    let settings = capturer.capture_settings();
    info!(
        fps = settings.fps,
        width = settings.width,
        height = settings.height,
        format = ?settings.format,
        "Final capture settings"
    );

    if let Err(e) = capturer.stop_capture() {
        warn!("Stop failed: {}", e);
    }
    let stats = capturer.stats();
    capturer.destroy();

    info!(
        "Delivered {} frames ({} delivery failures, {} rejected, {} release failures, {} binds)",
        stats.frames_delivered,
        stats.delivery_failures,
        stats.frames_rejected,
        stats.release_failures,
        stats.binds
    );
    exit_code
}

/// Logs pending bind notifications. Returns an exit code on bind failure.
fn drain_events(events: &Receiver<CaptureEvent>, metrics: &Metrics) -> Option<i32> {
    while let Ok(event) = events.try_recv() {
        metrics.record_event(&event);
        match event {
            CaptureEvent::Bound { lens } => info!(%lens, "Camera bound"),
            CaptureEvent::Unbound { lens } => info!(%lens, "Camera unbound"),
            CaptureEvent::BindFailed { lens, reason } => {
                error!(%lens, "Camera bind failed: {}", reason);
                return Some(1);
            }
        }
    }
    None
}

#[cfg(feature = "metrics")]
struct Metrics {
    runtime: Option<tokio::runtime::Runtime>,
    state: Option<Arc<tokio::sync::RwLock<capture_bridge::metrics::MetricsState>>>,
}

#[cfg(feature = "metrics")]
impl Metrics {
    fn start(port: u16) -> Self {
        use capture_bridge::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

        let disabled = Self {
            runtime: None,
            state: None,
        };
        if port == 0 {
            return disabled;
        }
        let registry = match MetricsRegistry::new() {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                return disabled;
            }
        };
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                return disabled;
            }
        };

        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();
        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server failed: {}", e);
            }
        });
        Self {
            runtime: Some(runtime),
            state: Some(state),
        }
    }

    fn update(&self, snapshot: MetricsSnapshot) {
        if let (Some(_), Some(state)) = (&self.runtime, &self.state) {
            state.blocking_write().update(&snapshot);
        }
    }

    fn record_event(&self, event: &CaptureEvent) {
        if let (Some(_), Some(state)) = (&self.runtime, &self.state) {
            state.blocking_write().record_event(event);
        }
    }
}

#[cfg(not(feature = "metrics"))]
struct Metrics;

#[cfg(not(feature = "metrics"))]
impl Metrics {
    fn start(port: u16) -> Self {
        if port != 0 {
            tracing::debug!(port, "Built without the metrics feature; exporter disabled");
        }
        Metrics
    }

    fn update(&self, snapshot: MetricsSnapshot) {
        tracing::trace!(
            delivered = snapshot.frames_delivered,
            started = snapshot.capture_started,
            "Capture stats"
        );
    }

    fn record_event(&self, event: &CaptureEvent) {
        tracing::trace!(?event, "Capture event");
    }
}
