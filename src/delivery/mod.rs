//! Boundary to the downstream video engine.
//!
//! The engine receives frames through [`FrameSink`] and exposes its
//! rendering style through [`RenderStyle`]. Everything past this
//! boundary (encoding, transport, rendering) belongs to the engine.

mod recording;
mod sink;
mod style;

pub use recording::RecordingSink;
pub use sink::{DeliveryError, FrameMetadata, FrameSink, PlanarFrame};
pub use style::{RenderStyle, StyleKey, StyleSettings, StyleValue};
