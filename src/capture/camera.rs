//! Camera provider abstraction.
//!
//! A provider is the platform's camera service. It binds one analysis
//! use case at a time to a physical lens and pushes the frames it
//! produces into that use case.

use super::ImageAnalysis;
use crate::format::{FpsRange, FrameRate, PixelFormat, Resolution, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera provider unavailable: {0}")]
    Unavailable(String),
    #[error("no supported size at or above {target}")]
    UnsupportedResolution { target: Size },
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(PixelFormat),
    #[error("a use case is already bound")]
    AlreadyBound,
    #[error("failed to bind use case: {0}")]
    BindFailed(String),
    #[error("failed to release frame: {0}")]
    ReleaseFailed(String),
    #[error("camera device error: {0}")]
    Device(String),
}

/// Physical camera sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lens {
    #[default]
    Front,
    Back,
}

impl Lens {
    /// Lens identifier of the front-facing camera.
    pub const FRONT_ID: i32 = 0;
    /// Lens identifier of the back-facing camera.
    pub const BACK_ID: i32 = 1;

    pub const fn id(self) -> i32 {
        match self {
            Lens::Front => Self::FRONT_ID,
            Lens::Back => Self::BACK_ID,
        }
    }

    pub const fn from_id(id: i32) -> Option<Lens> {
        match id {
            Self::FRONT_ID => Some(Lens::Front),
            Self::BACK_ID => Some(Lens::Back),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Lens {
        match self {
            Lens::Front => Lens::Back,
            Lens::Back => Lens::Front,
        }
    }

    /// Front-lens frames are shown mirrored.
    #[inline]
    pub const fn is_front(self) -> bool {
        matches!(self, Lens::Front)
    }
}

impl fmt::Display for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lens::Front => f.write_str("front"),
            Lens::Back => f.write_str("back"),
        }
    }
}

/// What to do when the target size is not offered by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRule {
    /// Pick the smallest supported size that is no smaller than the target.
    ClosestHigher,
}

/// Configuration of an image analysis use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseCaseConfig {
    pub target_size: Size,
    pub fallback: FallbackRule,
    pub fps_range: FpsRange,
    pub output_format: PixelFormat,
}

impl UseCaseConfig {
    pub fn new(resolution: Resolution, frame_rate: FrameRate) -> Self {
        Self {
            target_size: resolution.size(),
            fallback: FallbackRule::ClosestHigher,
            fps_range: frame_rate.range(),
            output_format: PixelFormat::Yuv420_888,
        }
    }

    /// Picks the capture size from what the camera supports.
    pub fn select_size(&self, supported: &[Size]) -> Result<Size, CameraError> {
        select_resolution(self.target_size, self.fallback, supported).ok_or(
            CameraError::UnsupportedResolution {
                target: self.target_size,
            },
        )
    }
}

/// Applies a resolution strategy to a list of supported sizes.
///
/// Returns the exact target when available; otherwise the fallback rule
/// decides. Ties between sizes of equal area go to the first listed.
pub fn select_resolution(target: Size, rule: FallbackRule, supported: &[Size]) -> Option<Size> {
    if supported.contains(&target) {
        return Some(target);
    }
    match rule {
        FallbackRule::ClosestHigher => supported
            .iter()
            .filter(|size| size.covers(&target))
            .min_by_key(|size| size.area())
            .copied(),
    }
}

/// The platform camera service.
///
/// Implementations must honor two guarantees the capture controller
/// relies on:
/// - at most one use case is bound at a time;
/// - [`unbind_all`](CameraProvider::unbind_all) returns only after the
///   backend has stopped submitting frames to the unbound use case.
pub trait CameraProvider: Send + Sync + 'static {
    /// Waits for the camera service to become usable.
    fn wait_ready(&self) -> Result<(), CameraError> {
        Ok(())
    }

    /// Binds an analysis use case to the lens it was configured for.
    fn bind(&self, use_case: Arc<ImageAnalysis>) -> Result<(), CameraError>;

    /// Detaches every bound use case. Unbinding nothing is a no-op.
    fn unbind_all(&self);
}

impl<P: CameraProvider + ?Sized> CameraProvider for Arc<P> {
    fn wait_ready(&self) -> Result<(), CameraError> {
        (**self).wait_ready()
    }

    fn bind(&self, use_case: Arc<ImageAnalysis>) -> Result<(), CameraError> {
        (**self).bind(use_case)
    }

    fn unbind_all(&self) {
        (**self).unbind_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lens_ids() {
        assert_eq!(Lens::from_id(Lens::FRONT_ID), Some(Lens::Front));
        assert_eq!(Lens::from_id(Lens::BACK_ID), Some(Lens::Back));
        assert_eq!(Lens::from_id(7), None);
        assert_eq!(Lens::Back.id(), 1);
        assert!(Lens::Front.is_front());
    }

    #[test]
    fn test_use_case_config_from_tables() {
        let config = UseCaseConfig::new(Resolution::High, FrameRate::Fps15);
        assert_eq!(config.target_size, Size::new(1280, 720));
        assert_eq!(config.fps_range, FpsRange { min: 15, max: 15 });
        assert_eq!(config.output_format, PixelFormat::Yuv420_888);
    }

    #[test]
    fn test_exact_size_preferred() {
        let supported = [Size::new(1920, 1080), Size::new(640, 480), Size::new(1280, 720)];
        let picked = select_resolution(Size::new(640, 480), FallbackRule::ClosestHigher, &supported);
        assert_eq!(picked, Some(Size::new(640, 480)));
    }

    #[test]
    fn test_closest_higher_fallback() {
        let supported = [Size::new(320, 240), Size::new(1920, 1080), Size::new(800, 600)];
        let picked = select_resolution(Size::new(640, 480), FallbackRule::ClosestHigher, &supported);
        assert_eq!(picked, Some(Size::new(800, 600)));
    }

    #[test]
    fn test_no_higher_size_fails() {
        let config = UseCaseConfig::new(Resolution::High1080p, FrameRate::Fps30);
        let result = config.select_size(&[Size::new(1280, 720)]);
        assert!(matches!(result, Err(CameraError::UnsupportedResolution { .. })));
    }

    proptest! {
        #[test]
        fn selected_size_never_smaller_than_target(
            tw in 1u32..2000,
            th in 1u32..2000,
            sizes in proptest::collection::vec((1u32..4000, 1u32..4000), 0..12),
        ) {
            let target = Size::new(tw, th);
            let supported: Vec<Size> = sizes.into_iter().map(|(w, h)| Size::new(w, h)).collect();
            match select_resolution(target, FallbackRule::ClosestHigher, &supported) {
                Some(size) => {
                    prop_assert!(size.covers(&target));
                    prop_assert!(supported.contains(&size));
                    for candidate in supported.iter().filter(|s| s.covers(&target)) {
                        prop_assert!(size.area() <= candidate.area());
                    }
                }
                None => prop_assert!(supported.iter().all(|s| !s.covers(&target))),
            }
        }

        #[test]
        fn toggling_twice_restores_lens(front in any::<bool>()) {
            let lens = if front { Lens::Front } else { Lens::Back };
            prop_assert_ne!(lens.toggled(), lens);
            prop_assert_eq!(lens.toggled().toggled(), lens);
        }
    }
}
