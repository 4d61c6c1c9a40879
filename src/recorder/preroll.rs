//! Pre-roll frame history
//!
//! Fixed-capacity ring of the most recent frames. Flushed oldest-first
//! into an event clip when it opens.

use crate::capture::Frame;
use std::collections::VecDeque;

/// Seconds of history kept ahead of a trigger
pub const PREROLL_SECONDS: u32 = 2;

/// Bounded history of recent frames
#[derive(Debug)]
pub struct PreRollBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl PreRollBuffer {
    /// Buffer sized for `PREROLL_SECONDS` at `fps` (at least one frame per second)
    pub fn for_fps(fps: u32) -> Self {
        Self::with_capacity(Self::capacity_for(fps))
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity_for(fps: u32) -> usize {
        (fps.max(1) * PREROLL_SECONDS) as usize
    }

    /// Append a frame, evicting the oldest when full
    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8) -> Frame {
        Frame::filled(2, 2, 1, value).unwrap()
    }

    #[test]
    fn test_capacity_from_fps() {
        assert_eq!(PreRollBuffer::capacity_for(0), 2);
        assert_eq!(PreRollBuffer::capacity_for(1), 2);
        assert_eq!(PreRollBuffer::capacity_for(15), 30);
        assert_eq!(PreRollBuffer::for_fps(25).capacity(), 50);
        assert_eq!(PreRollBuffer::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        for fps in [0, 1, 3, 10, 30] {
            let mut buffer = PreRollBuffer::for_fps(fps);
            for i in 0..200u32 {
                buffer.push(frame(i as u8));
                assert!(buffer.len() <= buffer.capacity());
            }
            assert_eq!(buffer.len(), buffer.capacity());
        }
    }

    #[test]
    fn test_snapshot_is_chronological_after_eviction() {
        let mut buffer = PreRollBuffer::with_capacity(3);
        for i in 1..=5 {
            buffer.push(frame(i));
        }
        let values: Vec<u8> = buffer.snapshot().iter().map(|f| f.data()[0]).collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut buffer = PreRollBuffer::with_capacity(2);
        buffer.push(frame(1));
        let snapshot = buffer.snapshot();
        buffer.push(frame(2));
        buffer.push(frame(3));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data()[0], 1);
    }
}
