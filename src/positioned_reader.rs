//! Façade over [`RingBuffer`] that tracks an absolute byte position.
//!
//! Used by the framing logic in [`crate::processor`] to know file offsets for
//! diagnostics, and to carry a `location` on read failures.

use crate::error::Result;
use crate::ring_buffer::RingBuffer;
use std::sync::Arc;

/// Delegates every read to a shared [`RingBuffer`] while maintaining
/// `position`, the absolute offset of the next byte to be read.
pub struct PositionedReader {
    ring: Arc<RingBuffer>,
    position: u64,
}

impl PositionedReader {
    /// Wraps a ring buffer, starting at position 0.
    pub fn new(ring: Arc<RingBuffer>) -> Self {
        Self { ring, position: 0 }
    }

    /// Absolute offset of the next byte this reader will return.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The underlying ring buffer, for callers that need raw access (e.g.
    /// the producer-thread setup in [`crate::processor`]).
    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    /// `true` once the input is fully drained: nothing buffered, and the
    /// source has closed cleanly. A clean place to stop reading whole
    /// packets. `false` if a read failure is still pending, so the next read
    /// surfaces it instead of this looking like ordinary end of input.
    pub fn is_exhausted(&self) -> bool {
        self.ring.is_exhausted()
    }

    /// Closes this reader: signals the shared ring buffer's shutdown flag so
    /// a running producer thread stops within one yield cycle and any
    /// blocked consumer read unblocks.
    pub fn close(&self) {
        self.ring.shutdown();
    }

    /// Reads exactly `dst.len()` bytes, advancing `position`.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ring.read_exact(dst)?;
        self.position += dst.len() as u64;
        Ok(())
    }

    /// Reads and discards `len` bytes, advancing `position`.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ring.skip(len)?;
        self.position += len as u64;
        Ok(())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.ring.read_u8()?;
        self.position += 1;
        Ok(v)
    }

    /// Reads one byte as a signed value.
    pub fn read_i8(&mut self) -> Result<i8> {
        let v = self.ring.read_i8()?;
        self.position += 1;
        Ok(v)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let v = self.ring.read_u16_be()?;
        self.position += 2;
        Ok(v)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let v = self.ring.read_u32_be()?;
        self.position += 4;
        Ok(v)
    }

    /// Reads `len` bytes into a freshly allocated `Vec<u8>`.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let v = self.ring.read_bytes(len)?;
        self.position += len as u64;
        Ok(v)
    }
}
