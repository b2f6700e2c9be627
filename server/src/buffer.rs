//! Outgoing byte staging for one data channel.
//!
//! Records are appended here and leave as framed transfer chunks. The
//! buffer holds at most `capacity` bytes and flushes early once the soft
//! threshold is reached, which bounds the latency between a record being
//! produced and the viewer seeing it.
//!
//! The buffer performs no I/O itself: every flush yields the framed
//! chunk and the caller queues it to the owning channel's writer task.

use shared::wire;
use thiserror::Error;

pub const DEFAULT_CAPACITY: usize = 16384;
pub const DEFAULT_FLUSH_AT: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("append of {len} bytes exceeds buffer capacity {capacity}")]
    Oversize { len: usize, capacity: usize },
}

#[derive(Debug)]
pub struct ChunkBuffer {
    staged: Vec<u8>,
    capacity: usize,
    flush_at: usize,
}

impl ChunkBuffer {
    /// `flush_at` is the soft threshold; it must not exceed `capacity`.
    pub fn new(capacity: usize, flush_at: usize) -> Self {
        debug_assert!(flush_at <= capacity);
        Self {
            staged: Vec::with_capacity(capacity),
            capacity,
            flush_at,
        }
    }

    /// Stages `bytes`, first flushing if the soft threshold has been
    /// reached or the append would overflow capacity. Returns the frame
    /// produced by such an implicit flush, if any.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Option<Vec<u8>>, BufferError> {
        if bytes.len() > self.capacity {
            return Err(BufferError::Oversize {
                len: bytes.len(),
                capacity: self.capacity,
            });
        }
        let frame = if self.staged.len() >= self.flush_at
            || self.staged.len() + bytes.len() > self.capacity
        {
            self.flush()
        } else {
            None
        };
        self.staged.extend_from_slice(bytes);
        Ok(frame)
    }

    /// Emits the staged bytes as one framed chunk and resets the buffer.
    /// Flushing an empty buffer is suppressed and yields nothing.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.staged.is_empty() {
            return None;
        }
        let frame = wire::chunk(&self.staged);
        self.staged.clear();
        Some(frame)
    }

    pub fn used(&self) -> usize {
        self.staged.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_FLUSH_AT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flush_is_suppressed() {
        let mut buffer = ChunkBuffer::new(64, 32);
        assert_eq!(buffer.flush(), None);
        assert_eq!(buffer.flush(), None);
        // and does not corrupt later appends
        buffer.append(b"abc").unwrap();
        assert_eq!(buffer.used(), 3);
    }

    #[test]
    fn append_below_threshold_stages_without_flushing() {
        let mut buffer = ChunkBuffer::new(64, 32);
        assert_eq!(buffer.append(b"hello").unwrap(), None);
        assert_eq!(buffer.used(), 5);
    }

    #[test]
    fn soft_threshold_triggers_flush_before_copying() {
        let mut buffer = ChunkBuffer::new(64, 8);
        buffer.append(&[1u8; 8]).unwrap();
        let frame = buffer.append(&[2u8; 4]).unwrap().expect("threshold flush");
        let payload = extract_payload(&frame);
        assert_eq!(payload, vec![1u8; 8]);
        assert_eq!(buffer.used(), 4);
    }

    #[test]
    fn capacity_overflow_triggers_flush_before_copying() {
        let mut buffer = ChunkBuffer::new(16, 16);
        buffer.append(&[1u8; 10]).unwrap();
        let frame = buffer.append(&[2u8; 10]).unwrap().expect("capacity flush");
        assert_eq!(extract_payload(&frame), vec![1u8; 10]);
        assert_eq!(buffer.used(), 10);
    }

    #[test]
    fn used_never_exceeds_capacity() {
        let mut buffer = ChunkBuffer::new(16, 8);
        for _ in 0..50 {
            buffer.append(&[0u8; 5]).unwrap();
            assert!(buffer.used() <= 16);
        }
    }

    #[test]
    fn oversize_append_is_rejected() {
        let mut buffer = ChunkBuffer::new(8, 4);
        let err = buffer.append(&[0u8; 9]).unwrap_err();
        assert_eq!(err, BufferError::Oversize { len: 9, capacity: 8 });
        assert!(buffer.is_empty());
    }

    #[test]
    fn explicit_flush_resets_used() {
        let mut buffer = ChunkBuffer::new(64, 32);
        buffer.append(b"CLRS").unwrap();
        let frame = buffer.flush().expect("staged bytes");
        assert_eq!(extract_payload(&frame), b"CLRS".to_vec());
        assert!(buffer.is_empty());
    }

    fn extract_payload(frame: &[u8]) -> Vec<u8> {
        let line_end = frame.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
        let part = &frame[line_end..frame.len() - 2];
        wire::part_payload(part).unwrap().to_vec()
    }
}
