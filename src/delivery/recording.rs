//! A sink that keeps frame metadata for inspection.

use super::sink::{DeliveryError, FrameMetadata, FrameSink, PlanarFrame};
use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Records the metadata of every delivered frame.
///
/// Pixel data is never retained. Each record is also forwarded to the
/// receiver returned by [`RecordingSink::new`], which lets callers wait
/// for deliveries without polling.
pub struct RecordingSink {
    frames: Mutex<Vec<FrameMetadata>>,
    notify: Mutex<Option<Sender<FrameMetadata>>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Receiver<FrameMetadata>) {
        let (tx, rx) = channel();
        let sink = Self {
            frames: Mutex::new(Vec::new()),
            notify: Mutex::new(Some(tx)),
        };
        (sink, rx)
    }

    /// All frames recorded so far, in delivery order.
    pub fn frames(&self) -> Vec<FrameMetadata> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Stops accepting frames. Later deliveries fail with
    /// [`DeliveryError::Closed`].
    pub fn close(&self) {
        self.notify.lock().take();
    }
}

impl FrameSink for RecordingSink {
    fn deliver(&self, frame: &PlanarFrame<'_>) -> Result<(), DeliveryError> {
        let mut notify = self.notify.lock();
        let Some(tx) = notify.as_ref() else {
            return Err(DeliveryError::Closed);
        };

        let metadata = frame.metadata();
        self.frames.lock().push(metadata);

        // A dropped receiver only means nobody is waiting.
        if tx.send(metadata).is_err() {
            *notify = None;
            tracing::trace!("Recording receiver dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Plane, Rotation};

    fn frame(data: &[u8], timestamp_ns: i64) -> PlanarFrame<'_> {
        let plane = Plane::new(data, 1, 2);
        PlanarFrame {
            y: plane,
            u: plane,
            v: plane,
            width: 2,
            height: 2,
            rotation: Rotation::Deg90,
            mirrored: true,
            timestamp_ns,
        }
    }

    #[test]
    fn test_records_in_order() {
        let (sink, rx) = RecordingSink::new();
        let data = [0u8; 4];

        sink.deliver(&frame(&data, 1)).unwrap();
        sink.deliver(&frame(&data, 2)).unwrap();

        let stamps: Vec<i64> = sink.frames().iter().map(|m| m.timestamp_ns).collect();
        assert_eq!(stamps, vec![1, 2]);
        assert_eq!(rx.try_recv().unwrap().timestamp_ns, 1);
        assert_eq!(rx.try_recv().unwrap().rotation, Rotation::Deg90);
    }

    #[test]
    fn test_closed_sink_rejects() {
        let (sink, _rx) = RecordingSink::new();
        sink.close();
        let data = [0u8; 4];
        assert_eq!(sink.deliver(&frame(&data, 1)), Err(DeliveryError::Closed));
        assert!(sink.is_empty());
    }
}
