//! Capture hand-off queue between the audio thread and the poller
//!
//! The audio callback enqueues one display block per period; the foreground
//! poller drains everything accumulated since its last visit. The lock is
//! held only for the push or the swap, never across I/O.

use std::sync::{Arc, Mutex};

use super::DisplayBlock;

/// Thread-safe queue of captured blocks. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    blocks: Arc<Mutex<Vec<DisplayBlock>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block. Called from the audio thread.
    pub fn enqueue(&self, block: DisplayBlock) {
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.push(block);
    }

    /// Take every block queued so far, in enqueue order, leaving the queue
    /// empty.
    pub fn drain(&self) -> Vec<DisplayBlock> {
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *blocks)
    }

    /// Number of blocks waiting to be drained.
    pub fn len(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop anything not yet drained.
    pub fn clear(&self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let buffer = CaptureBuffer::new();
        buffer.enqueue(vec![1.0]);
        buffer.enqueue(vec![2.0, 2.5]);
        buffer.enqueue(vec![3.0]);
        assert_eq!(buffer.len(), 3);

        let drained = buffer.drain();
        assert_eq!(drained, vec![vec![1.0], vec![2.0, 2.5], vec![3.0]]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_interleaved_enqueue_and_drain() {
        let buffer = CaptureBuffer::new();
        let mut seen = Vec::new();

        buffer.enqueue(vec![0.0]);
        seen.extend(buffer.drain());
        buffer.enqueue(vec![1.0]);
        buffer.enqueue(vec![2.0]);
        seen.extend(buffer.drain());
        seen.extend(buffer.drain());
        buffer.enqueue(vec![3.0]);
        seen.extend(buffer.drain());

        assert_eq!(seen, vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_concurrent_producer_loses_nothing() {
        const BLOCKS: usize = 2_000;
        let buffer = CaptureBuffer::new();
        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..BLOCKS {
                    buffer.enqueue(vec![i as f32]);
                }
            })
        };

        let mut collected = Vec::new();
        while collected.len() < BLOCKS {
            collected.extend(buffer.drain());
            thread::yield_now();
        }
        producer.join().unwrap();
        collected.extend(buffer.drain());

        let values: Vec<f32> = collected.into_iter().flatten().collect();
        let expected: Vec<f32> = (0..BLOCKS).map(|i| i as f32).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_clear_discards_pending() {
        let buffer = CaptureBuffer::new();
        buffer.enqueue(vec![1.0; 4]);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
