//! Single-slot handoff of the latest annotated frame.
//!
//! The recognition loop is the only writer. Readers get an `Arc` snapshot of
//! whatever was current at the time of the call; later publishes never
//! touch a snapshot already handed out.

use crate::types::Annotation;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// One fully processed, JPEG-encoded frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedFrame {
    /// Iteration counter of the run that produced this frame.
    pub sequence: u64,
    pub captured_at: NaiveDateTime,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub annotations: Vec<Annotation>,
}

type Slot = Option<Arc<PublishedFrame>>;

/// Write side of the frame slot.
pub struct FramePublisher {
    tx: watch::Sender<Slot>,
}

impl Default for FramePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: PublishedFrame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// Empty the slot, e.g. when the loop stops.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Read-only accessor for external callers.
    pub fn reader(&self) -> FrameReader {
        FrameReader { rx: self.tx.subscribe() }
    }
}

/// Read side of the frame slot. Cheap to clone, one per consumer.
#[derive(Clone)]
pub struct FrameReader {
    rx: watch::Receiver<Slot>,
}

impl FrameReader {
    /// Snapshot of the most recently published frame, if any.
    pub fn read(&self) -> Option<Arc<PublishedFrame>> {
        self.rx.borrow().clone()
    }

    /// Wait until the slot changes. Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
