//! Capture lifecycle and the engine-facing control surface.
//!
//! The controller owns two executors: the capture worker, where every
//! frame is analyzed, and the binder, which stands in for the platform
//! context that resolves the camera provider and performs binds. All
//! control operations are serialized by one lock. Frame delivery never
//! takes that lock, and neither do the read-only queries, which read
//! atomic mirrors of the state and lens.

use super::{
    Analyzer, CameraProvider, ExecutorError, FrameAnalyzer, ImageAnalysis, Lens, SerialExecutor,
    UseCaseConfig,
};
use crate::delivery::FrameSink;
use crate::format::{CaptureSettings, FrameRate, Resolution};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use thiserror::Error;

const CAPTURE_THREAD: &str = "capture-analyzer";
const BINDER_THREAD: &str = "capture-binder";

/// Lifecycle state of a capturer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CaptureState {
    Uninitialized,
    Initialized,
    Capturing,
    Stopped,
    Destroyed,
}

impl CaptureState {
    const ALL: [CaptureState; 5] = [
        CaptureState::Uninitialized,
        CaptureState::Initialized,
        CaptureState::Capturing,
        CaptureState::Stopped,
        CaptureState::Destroyed,
    ];

    fn from_repr(value: u8) -> CaptureState {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .unwrap_or(CaptureState::Destroyed)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Uninitialized => "uninitialized",
            CaptureState::Initialized => "initialized",
            CaptureState::Capturing => "capturing",
            CaptureState::Stopped => "stopped",
            CaptureState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Errors returned by the control surface.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: CaptureState,
    },
    #[error("unknown lens identifier: {0}")]
    UnknownLens(i32),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl CaptureError {
    /// Integer status for engines that expect one. Success is 0.
    pub fn status_code(&self) -> i32 {
        match self {
            CaptureError::InvalidState { .. } => -1,
            CaptureError::UnknownLens(_) => -2,
            CaptureError::Executor(_) => -3,
        }
    }
}

/// Maps a control result onto the engine's integer status.
pub fn status_code(result: &Result<(), CaptureError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.status_code(),
    }
}

/// Out-of-band notifications about camera binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Bound { lens: Lens },
    BindFailed { lens: Lens, reason: String },
    Unbound { lens: Lens },
}

/// Lifecycle methods the engine drives.
pub trait VideoCapturer {
    fn init(&self) -> Result<(), CaptureError>;
    /// Requests capture. Binding completes asynchronously.
    fn start_capture(&self) -> Result<(), CaptureError>;
    fn stop_capture(&self) -> Result<(), CaptureError>;
    fn destroy(&self);
    fn is_capture_started(&self) -> bool;
    fn capture_settings(&self) -> CaptureSettings;
    fn on_pause(&self);
    fn on_resume(&self);
}

/// Lens switching methods the engine drives.
pub trait CaptureSwitch {
    fn cycle_camera(&self) -> Result<(), CaptureError>;
    fn swap_camera(&self, lens_id: i32) -> Result<(), CaptureError>;
    fn camera_index(&self) -> i32;
}

/// Point-in-time counters for metrics export.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub capture_started: bool,
    pub target_fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frames_delivered: u64,
    pub delivery_failures: u64,
    pub frames_rejected: u64,
    pub release_failures: u64,
    pub binds: u64,
    pub bind_failures: u64,
}

struct Control {
    state: CaptureState,
    lens: Lens,
    // Bumped whenever a pending bind must not run.
    generation: u64,
    capture: Option<SerialExecutor>,
    binder: Option<SerialExecutor>,
    bound: Option<Arc<ImageAnalysis>>,
}

struct Shared<P, S> {
    provider: P,
    analyzer: Arc<FrameAnalyzer<S>>,
    config: UseCaseConfig,
    frame_rate: FrameRate,
    control: Mutex<Control>,
    // Lock-free mirrors of `Control::state` and `Control::lens`. Sinks may
    // read them from inside `deliver` while a control call waits for that
    // delivery to finish.
    state: AtomicU8,
    lens_id: AtomicI32,
    started: AtomicBool,
    binds: AtomicU64,
    bind_failures: AtomicU64,
    subscribers: Mutex<Vec<Sender<CaptureEvent>>>,
}

/// Drives a camera provider on behalf of a video engine.
///
/// Resolution and frame rate are fixed at construction. The lens starts
/// at the front camera unless [`with_lens`](CaptureController::with_lens)
/// says otherwise.
pub struct CaptureController<P, S> {
    shared: Arc<Shared<P, S>>,
}

impl<P: CameraProvider, S: FrameSink> CaptureController<P, S> {
    pub fn new(provider: P, sink: S, resolution: Resolution, frame_rate: FrameRate) -> Self {
        let shared = Shared {
            provider,
            analyzer: Arc::new(FrameAnalyzer::new(sink)),
            config: UseCaseConfig::new(resolution, frame_rate),
            frame_rate,
            control: Mutex::new(Control {
                state: CaptureState::Uninitialized,
                lens: Lens::Front,
                generation: 0,
                capture: None,
                binder: None,
                bound: None,
            }),
            state: AtomicU8::new(CaptureState::Uninitialized as u8),
            lens_id: AtomicI32::new(Lens::Front.id()),
            started: AtomicBool::new(false),
            binds: AtomicU64::new(0),
            bind_failures: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Sets the lens used by the first start.
    pub fn with_lens(self, lens: Lens) -> Self {
        let mut control = self.shared.control.lock();
        self.shared.set_lens(&mut control, lens);
        drop(control);
        self
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&self) -> CaptureState {
        CaptureState::from_repr(self.shared.state.load(Ordering::Acquire))
    }

    /// Current lens selection. Never blocks.
    pub fn lens(&self) -> Lens {
        Lens::from_id(self.shared.lens_id.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn provider(&self) -> &P {
        &self.shared.provider
    }

    pub fn sink(&self) -> &S {
        self.shared.analyzer.sink()
    }

    pub fn use_case_config(&self) -> &UseCaseConfig {
        &self.shared.config
    }

    /// Receives every [`CaptureEvent`] emitted from now on.
    pub fn subscribe(&self) -> Receiver<CaptureEvent> {
        let (tx, rx) = channel();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn stats(&self) -> CaptureStats {
        let analyzer = self.shared.analyzer.stats();
        let frame = self.shared.analyzer.last_frame().unwrap_or_default();
        CaptureStats {
            capture_started: self.shared.started.load(Ordering::Acquire),
            target_fps: self.shared.frame_rate.fps(),
            frame_width: frame.width,
            frame_height: frame.height,
            frames_delivered: analyzer.delivered(),
            delivery_failures: analyzer.delivery_failures(),
            frames_rejected: analyzer.rejected(),
            release_failures: analyzer.release_failures(),
            binds: self.shared.binds.load(Ordering::Relaxed),
            bind_failures: self.shared.bind_failures.load(Ordering::Relaxed),
        }
    }

    fn switch_lens(&self, control: &mut Control, lens: Lens) -> Result<(), CaptureError> {
        let previous = control.lens;
        self.shared.set_lens(control, lens);
        tracing::info!(from = %previous, to = %lens, "Camera lens switched");

        if control.state == CaptureState::Capturing {
            self.shared.unbind(control);
            Shared::request_bind(&self.shared, control)?;
        }
        Ok(())
    }
}

impl<P, S> Shared<P, S> {
    fn set_state(&self, control: &mut Control, state: CaptureState) {
        control.state = state;
        self.state.store(state as u8, Ordering::Release);
    }

    fn set_lens(&self, control: &mut Control, lens: Lens) {
        control.lens = lens;
        self.lens_id.store(lens.id(), Ordering::Release);
    }
}

impl<P: CameraProvider, S: FrameSink> Shared<P, S> {
    /// Queues a bind of the current lens on the binder executor.
    fn request_bind(this: &Arc<Self>, control: &mut Control) -> Result<(), CaptureError> {
        let binder = control.binder.as_ref().ok_or(CaptureError::InvalidState {
            operation: "bind camera",
            state: control.state,
        })?;
        control.generation += 1;
        let generation = control.generation;
        let lens = control.lens;
        let shared = Arc::clone(this);
        binder.execute(move || shared.bind(generation, lens))?;
        Ok(())
    }

    fn bind(&self, generation: u64, lens: Lens) {
        // Waiting for the provider happens outside the control lock.
        let ready = self.provider.wait_ready();

        let mut control = self.control.lock();
        if control.generation != generation || control.state != CaptureState::Capturing {
            tracing::debug!(generation, "Discarding superseded bind request");
            return;
        }

        if let Err(e) = ready {
            self.bind_failed(&mut control, lens, e.to_string());
            return;
        }
        let Some(capture) = control.capture.as_ref() else {
            return;
        };

        let analyzer: Arc<dyn Analyzer> = self.analyzer.clone();
        let use_case = Arc::new(ImageAnalysis::new(
            lens,
            self.config,
            capture.handle(),
            analyzer,
        ));

        self.unbind(&mut control);
        match self.provider.bind(Arc::clone(&use_case)) {
            Ok(()) => {
                control.bound = Some(use_case);
                self.started.store(true, Ordering::Release);
                self.binds.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    %lens,
                    target = %self.config.target_size,
                    fps = %self.config.fps_range,
                    "Camera use case bound"
                );
                self.notify(CaptureEvent::Bound { lens });
            }
            Err(e) => {
                use_case.close();
                self.bind_failed(&mut control, lens, e.to_string());
            }
        }
    }

    fn bind_failed(&self, control: &mut Control, lens: Lens, reason: String) {
        tracing::error!(%lens, error = %reason, "Use case binding failed");
        self.bind_failures.fetch_add(1, Ordering::Relaxed);
        self.set_state(control, CaptureState::Stopped);
        self.notify(CaptureEvent::BindFailed { lens, reason });
    }

    /// Detaches the camera. Returns once no further frame can be delivered.
    fn unbind(&self, control: &mut Control) {
        self.provider.unbind_all();
        if let Some(use_case) = control.bound.take() {
            use_case.close();
            self.notify(CaptureEvent::Unbound {
                lens: use_case.lens(),
            });
        }
        self.started.store(false, Ordering::Release);
        self.analyzer.clear_last_frame();
    }

    fn notify(&self, event: CaptureEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn reject(operation: &'static str, state: CaptureState) -> CaptureError {
    CaptureError::InvalidState { operation, state }
}

impl<P: CameraProvider, S: FrameSink> VideoCapturer for CaptureController<P, S> {
    fn init(&self) -> Result<(), CaptureError> {
        let mut control = self.shared.control.lock();
        if control.state != CaptureState::Uninitialized {
            return Err(reject("initialize", control.state));
        }

        control.capture = Some(SerialExecutor::spawn(CAPTURE_THREAD)?);
        control.binder = Some(SerialExecutor::spawn(BINDER_THREAD)?);
        self.shared.set_state(&mut control, CaptureState::Initialized);
        tracing::info!(
            resolution = %self.shared.config.target_size,
            fps = self.shared.frame_rate.fps(),
            "Capturer initialized"
        );
        Ok(())
    }

    fn start_capture(&self) -> Result<(), CaptureError> {
        let mut control = self.shared.control.lock();
        match control.state {
            CaptureState::Initialized | CaptureState::Stopped => {}
            state => return Err(reject("start capture", state)),
        }

        Shared::request_bind(&self.shared, &mut control)?;
        self.shared.set_state(&mut control, CaptureState::Capturing);
        tracing::info!(lens = %control.lens, "Capture start requested");
        Ok(())
    }

    fn stop_capture(&self) -> Result<(), CaptureError> {
        let mut control = self.shared.control.lock();
        match control.state {
            CaptureState::Uninitialized | CaptureState::Destroyed => {
                return Err(reject("stop capture", control.state));
            }
            _ => {}
        }

        control.generation += 1;
        self.shared.unbind(&mut control);
        self.shared.set_state(&mut control, CaptureState::Stopped);
        tracing::info!("Capture stopped");
        Ok(())
    }

    fn destroy(&self) {
        let (capture, binder) = {
            let mut control = self.shared.control.lock();
            if control.state == CaptureState::Destroyed {
                return;
            }
            control.generation += 1;
            if control.bound.is_some() || control.state == CaptureState::Capturing {
                tracing::warn!("Destroying capturer with an active session");
                self.shared.unbind(&mut control);
            }
            self.shared.set_state(&mut control, CaptureState::Destroyed);
            (control.capture.take(), control.binder.take())
        };

        // A pending bind may be waiting for the control lock; it sees the
        // new generation and returns, so joining cannot deadlock.
        if let Some(binder) = binder {
            binder.shutdown();
        }
        if let Some(capture) = capture {
            capture.shutdown();
        }
        tracing::info!("Capturer destroyed");
    }

    fn is_capture_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    fn capture_settings(&self) -> CaptureSettings {
        let frame = self.shared.analyzer.last_frame().unwrap_or_default();
        CaptureSettings::new(self.shared.frame_rate.fps(), frame.width, frame.height)
    }

    fn on_pause(&self) {
        // The engine stops capture itself when it unpublishes video.
        tracing::trace!("on_pause");
    }

    fn on_resume(&self) {
        tracing::trace!("on_resume");
    }
}

impl<P: CameraProvider, S: FrameSink> CaptureSwitch for CaptureController<P, S> {
    fn cycle_camera(&self) -> Result<(), CaptureError> {
        let mut control = self.shared.control.lock();
        match control.state {
            CaptureState::Uninitialized | CaptureState::Destroyed => {
                return Err(reject("cycle camera", control.state));
            }
            _ => {}
        }
        let next = control.lens.toggled();
        self.switch_lens(&mut control, next)
    }

    fn swap_camera(&self, lens_id: i32) -> Result<(), CaptureError> {
        let lens = Lens::from_id(lens_id).ok_or(CaptureError::UnknownLens(lens_id))?;
        let mut control = self.shared.control.lock();
        match control.state {
            CaptureState::Uninitialized | CaptureState::Destroyed => {
                return Err(reject("swap camera", control.state));
            }
            _ => {}
        }
        if control.lens == lens {
            return Ok(());
        }
        self.switch_lens(&mut control, lens)
    }

    fn camera_index(&self) -> i32 {
        self.shared.lens_id.load(Ordering::Acquire)
    }
}

impl<P, S> Drop for CaptureController<P, S> {
    fn drop(&mut self) {
        // Pending binds hold their own reference to the shared state;
        // invalidate them so they never bind after the owner is gone.
        let mut control = self.shared.control.lock();
        control.generation += 1;
        self.shared.set_state(&mut control, CaptureState::Destroyed);
    }
}
