//! Resolution and frame-rate lookup tables.
//!
//! The engine describes capture quality with two small closed
//! enumerations. Each value maps to exactly one concrete size or
//! frames-per-second target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::FormatError;

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True if both dimensions are at least as large as `other`.
    #[inline]
    pub fn covers(&self, other: &Size) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capture resolution requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "LOW")]
    Low,
    #[default]
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "HIGH_1080P")]
    High1080p,
}

impl Resolution {
    /// Every resolution, lowest first.
    pub const ALL: [Resolution; 4] = [
        Resolution::Low,
        Resolution::Medium,
        Resolution::High,
        Resolution::High1080p,
    ];

    /// Concrete frame size for this resolution.
    pub const fn size(self) -> Size {
        match self {
            Resolution::Low => Size::new(352, 288),
            Resolution::Medium => Size::new(640, 480),
            Resolution::High => Size::new(1280, 720),
            Resolution::High1080p => Size::new(1920, 1080),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Resolution::Low => "LOW",
            Resolution::Medium => "MEDIUM",
            Resolution::High => "HIGH",
            Resolution::High1080p => "HIGH_1080P",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resolution {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FormatError::UnknownResolution(s.to_string()))
    }
}

/// Capture frame rate requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameRate {
    #[serde(rename = "FPS_1")]
    Fps1,
    #[serde(rename = "FPS_7")]
    Fps7,
    #[serde(rename = "FPS_15")]
    Fps15,
    #[default]
    #[serde(rename = "FPS_30")]
    Fps30,
}

impl FrameRate {
    /// Every frame rate, slowest first.
    pub const ALL: [FrameRate; 4] = [
        FrameRate::Fps1,
        FrameRate::Fps7,
        FrameRate::Fps15,
        FrameRate::Fps30,
    ];

    /// Integer frames-per-second target.
    pub const fn fps(self) -> u32 {
        match self {
            FrameRate::Fps1 => 1,
            FrameRate::Fps7 => 7,
            FrameRate::Fps15 => 15,
            FrameRate::Fps30 => 30,
        }
    }

    /// The fps range requested from the camera. Always exact.
    pub const fn range(self) -> FpsRange {
        FpsRange::exact(self.fps())
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameRate::Fps1 => "FPS_1",
            FrameRate::Fps7 => "FPS_7",
            FrameRate::Fps15 => "FPS_15",
            FrameRate::Fps30 => "FPS_30",
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FrameRate {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FrameRate::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FormatError::UnknownFrameRate(s.to_string()))
    }
}

/// Auto-exposure target fps range handed to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub const fn exact(fps: u32) -> Self {
        Self { min: fps, max: fps }
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
