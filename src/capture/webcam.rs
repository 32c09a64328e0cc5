//! Webcam provider built on the `nokhwa` crate.
//!
//! The device is opened on its own producer thread; frames are decoded
//! to RGB, normalized to I420 and submitted to the bound use case.

use super::{CameraError, CameraProvider, ImageAnalysis, Lens, OwnedImage, UseCaseConfig};
use crate::format::{rgb_to_i420, PixelFormat, Size};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Consecutive read failures between repeated warnings.
const FAILURE_LOG_EVERY: u32 = 30;

/// Device indices used for each lens.
#[derive(Debug, Clone, Copy)]
pub struct DeviceMap {
    pub front: u32,
    pub back: u32,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self { front: 0, back: 1 }
    }
}

impl DeviceMap {
    fn index(&self, lens: Lens) -> CameraIndex {
        match lens {
            Lens::Front => CameraIndex::Index(self.front),
            Lens::Back => CameraIndex::Index(self.back),
        }
    }
}

struct Stream {
    lens: Lens,
    use_case: Arc<ImageAnalysis>,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Camera provider for local webcams.
pub struct NokhwaCameraProvider {
    devices: DeviceMap,
    active: Mutex<Option<Stream>>,
}

impl NokhwaCameraProvider {
    pub fn new(devices: DeviceMap) -> Self {
        Self {
            devices,
            active: Mutex::new(None),
        }
    }
}

impl CameraProvider for NokhwaCameraProvider {
    fn bind(&self, use_case: Arc<ImageAnalysis>) -> Result<(), CameraError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(CameraError::AlreadyBound);
        }
        let config = *use_case.config();
        if config.output_format != PixelFormat::Yuv420_888 {
            return Err(CameraError::UnsupportedFormat(config.output_format));
        }

        let lens = use_case.lens();
        let index = self.devices.index(lens);
        let (stop, stopped) = channel();
        let (opened_tx, opened_rx) = sync_channel(1);
        let producer_use_case = Arc::clone(&use_case);

        let thread = thread::Builder::new()
            .name(format!("nokhwa-{lens}"))
            .spawn(move || {
                let mut camera = match open_camera(index, &config) {
                    Ok(camera) => {
                        let _ = opened_tx.send(Ok(()));
                        camera
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                stream_frames(&mut camera, &producer_use_case, &stopped);
                if let Err(e) = camera.stop_stream() {
                    tracing::warn!(error = %e, "Failed to stop camera stream");
                }
            })
            .map_err(|e| CameraError::Device(e.to_string()))?;

        match opened_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CameraError::Device("camera thread exited during open".into()));
            }
        }

        tracing::info!(%lens, "Webcam bound");
        *active = Some(Stream {
            lens,
            use_case,
            stop,
            thread,
        });
        Ok(())
    }

    fn unbind_all(&self) {
        let Some(stream) = self.active.lock().take() else {
            return;
        };
        drop(stream.stop);
        if stream.thread.join().is_err() {
            tracing::error!(lens = %stream.lens, "Webcam producer panicked");
        }
        stream.use_case.close();
        tracing::info!(lens = %stream.lens, "Webcam unbound");
    }
}

impl Drop for NokhwaCameraProvider {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

/// Opens the device at the closest-higher supported size and exact fps.
fn open_camera(index: CameraIndex, config: &UseCaseConfig) -> Result<Camera, CameraError> {
    let device = |e: nokhwa::NokhwaError| CameraError::Device(e.to_string());

    let formats = {
        let mut probe = Camera::new(
            index.clone(),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        )
        .map_err(device)?;
        probe.compatible_camera_formats().map_err(device)?
    };

    let supported: Vec<Size> = formats
        .iter()
        .map(|f| Size::new(f.resolution().width(), f.resolution().height()))
        .collect();
    let size = config.select_size(&supported)?;
    let fps = config.fps_range.max;

    let format = formats
        .iter()
        .filter(|f| f.resolution().width() == size.width && f.resolution().height() == size.height)
        .min_by_key(|f| f.frame_rate().abs_diff(fps))
        .map(|f| CameraFormat::new(Resolution::new(size.width, size.height), f.format(), fps))
        .ok_or(CameraError::UnsupportedResolution { target: size })?;

    let mut camera = Camera::new(
        index,
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(format)),
    )
    .map_err(device)?;
    camera.open_stream().map_err(device)?;

    let actual = camera.camera_format();
    tracing::info!(
        width = actual.resolution().width(),
        height = actual.resolution().height(),
        fps = actual.frame_rate(),
        "Webcam stream opened"
    );
    Ok(camera)
}

/// Counts consecutive read failures and rate-limits their warnings.
#[derive(Debug, Default)]
struct ReadFailures {
    consecutive: u32,
}

impl ReadFailures {
    /// Returns `true` when this failure was logged.
    fn record(&mut self, what: &str, error: &dyn std::fmt::Display) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        let log = self.consecutive == 1 || self.consecutive % FAILURE_LOG_EVERY == 0;
        if log {
            tracing::warn!(error = %error, consecutive = self.consecutive, "{}", what);
        }
        log
    }

    fn reset(&mut self) {
        if self.consecutive > 0 {
            tracing::info!(after = self.consecutive, "Camera reads recovered");
            self.consecutive = 0;
        }
    }
}

/// Waits one frame interval before the next read. Returns `true` if the
/// stream was stopped meanwhile.
fn stop_requested(stopped: &Receiver<()>, interval: Duration) -> bool {
    !matches!(stopped.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
}

fn stream_frames(camera: &mut Camera, use_case: &ImageAnalysis, stopped: &Receiver<()>) {
    let started = Instant::now();
    let retry = Duration::from_secs(1) / use_case.config().fps_range.max.max(1);
    let mut failures = ReadFailures::default();
    loop {
        match stopped.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                failures.record("Camera frame error", &e);
                if stop_requested(stopped, retry) {
                    break;
                }
                continue;
            }
        };
        let decoded = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                failures.record("Frame decode error", &e);
                if stop_requested(stopped, retry) {
                    break;
                }
                continue;
            }
        };
        failures.reset();

        let (width, height) = (decoded.width(), decoded.height());
        let planes = match rgb_to_i420(decoded.as_raw(), width, height) {
            Ok(planes) => planes,
            Err(e) => {
                tracing::warn!(error = %e, "Frame conversion error");
                continue;
            }
        };

        let timestamp_ns = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        use_case.submit(Box::new(OwnedImage::from_i420(planes).with_timestamp(timestamp_ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_read_waits_one_interval() {
        let (_stop, stopped) = channel::<()>();
        let interval = Duration::from_millis(40);

        let began = Instant::now();
        assert!(!stop_requested(&stopped, interval));
        assert!(began.elapsed() >= interval);
    }

    #[test]
    fn test_failed_read_returns_early_on_stop() {
        let (stop, stopped) = channel::<()>();
        drop(stop);

        let began = Instant::now();
        assert!(stop_requested(&stopped, Duration::from_secs(5)));
        assert!(began.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_repeated_failures_are_rate_limited() {
        let mut failures = ReadFailures::default();
        let logged = (0..FAILURE_LOG_EVERY * 2)
            .filter(|_| failures.record("Camera frame error", &"unplugged"))
            .count();
        assert_eq!(logged, 3);

        failures.reset();
        assert!(failures.record("Camera frame error", &"unplugged"));
    }
}
