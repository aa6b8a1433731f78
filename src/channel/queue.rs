#![expect(
    clippy::module_name_repetitions,
    reason = "The queue type carries the module name for clarity when re-exported"
)]

use std::collections::VecDeque;

/// FIFO buffer for frames sent while the connection is not open.
///
/// Unbounded. Survives failed connection attempts and is only emptied by a flush.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    /// Hand every buffered frame to `send` in insertion order, leaving the queue empty.
    ///
    /// Frames are not re-buffered if sending them fails. Returns how many were flushed.
    pub fn flush<F: FnMut(String)>(&mut self, mut send: F) -> usize {
        let flushed = self.frames.len();
        for frame in self.frames.drain(..) {
            send(frame);
        }
        flushed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
