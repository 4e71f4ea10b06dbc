//! Thread-safe single-producer/single-consumer expanding byte buffer.
//!
//! A producer thread pulls bytes from an arbitrary [`Read`] while a
//! consumer thread performs blocking, big-endian typed reads, with neither
//! side ever losing bytes or overrunning the backing storage.

use crate::error::{Error, ErrorDetails, Result};
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long the consumer waits on the condvar between re-checks of the
/// available-byte count. A real condvar notification wakes it immediately;
/// this bound only matters if a notification was somehow missed.
const CONSUMER_WAIT_BACKOFF: Duration = Duration::from_millis(1);

/// How long the producer sleeps between `fill_from` calls so the consumer
/// gets a chance to acquire the lock.
const PRODUCER_YIELD: Duration = Duration::from_millis(1);

struct Inner {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    source_closed: bool,
    /// Set when `source.read()` itself fails (as opposed to a clean `Ok(0)`
    /// EOF). Taken by the next consumer read that would otherwise report a
    /// plain `UnexpectedEof`, so the real I/O failure surfaces instead of
    /// being indistinguishable from a clean close.
    read_error: Option<io::Error>,
}

/// Builds the error a blocked consumer read reports once the source has
/// closed: the stashed read failure if there is one, otherwise a plain EOF.
fn closed_error(inner: &mut Inner, requested: usize, available: usize) -> Error {
    match inner.read_error.take() {
        Some(e) => Error::new(None, ErrorDetails::SourceReadFailure(e)),
        None => Error::new(
            None,
            ErrorDetails::UnexpectedEof {
                requested,
                available,
            },
        ),
    }
}

/// Outcome of one [`RingBuffer::fill_from`] call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FillOutcome {
    /// `n` bytes were pulled from the source and are now available to the consumer.
    Filled(usize),
    /// The source reported EOF; `source_closed` is now set.
    NoMoreData,
}

/// The expanding ring buffer.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    max_pull: usize,
    compaction_threshold: f64,
    shrink_floor: usize,
    shutdown: AtomicBool,
}

impl RingBuffer {
    /// Builds a ring buffer with the given initial capacity and tunables (see
    /// [`crate::config::DecodeConfig`] for the default values).
    pub fn new(
        initial_capacity: usize,
        max_pull: usize,
        compaction_threshold: f64,
        shrink_floor: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                storage: vec![0u8; initial_capacity],
                read_pos: 0,
                write_pos: 0,
                source_closed: false,
                read_error: None,
            }),
            not_empty: Condvar::new(),
            max_pull,
            compaction_threshold,
            shrink_floor,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Builds a ring buffer using the crate's literal defaults (16 MiB
    /// initial capacity, 64 KiB max pull, 0.9 compaction threshold, 16 MiB
    /// shrink floor).
    pub fn with_defaults() -> Self {
        Self::new(
            crate::config::DEFAULT_INITIAL_CAPACITY,
            crate::config::DEFAULT_MAX_PULL,
            crate::config::DEFAULT_COMPACTION_THRESHOLD,
            crate::config::DEFAULT_SHRINK_FLOOR,
        )
    }

    /// Pulls at most `min(capacity - write_pos, max_pull)` bytes from `source`
    /// into the buffer. Grows the buffer first if it is completely full, and
    /// compacts it afterwards if `read_pos` has drifted past the compaction
    /// threshold. Holds the lock for the duration of the underlying
    /// `source.read()` call plus bookkeeping.
    pub fn fill_from<R: Read>(&self, source: &mut R) -> Result<FillOutcome> {
        let mut inner = self.inner.lock();

        if inner.write_pos == inner.storage.len() {
            self.grow(&mut inner)?;
        }

        let pull_len = std::cmp::min(inner.storage.len() - inner.write_pos, self.max_pull);
        let write_pos = inner.write_pos;
        let read_result = source.read(&mut inner.storage[write_pos..write_pos + pull_len]);

        let outcome = match read_result {
            Ok(0) => {
                inner.source_closed = true;
                Ok(FillOutcome::NoMoreData)
            }
            Ok(n) => {
                inner.write_pos += n;
                self.maybe_compact(&mut inner);
                Ok(FillOutcome::Filled(n))
            }
            Err(e) => {
                inner.source_closed = true;
                inner.read_error = Some(io::Error::new(e.kind(), e.to_string()));
                Err(Error::new(None, ErrorDetails::SourceReadFailure(e)))
            }
        };

        drop(inner);
        self.not_empty.notify_all();
        outcome
    }

    fn grow(&self, inner: &mut Inner) -> Result<()> {
        let new_cap = match inner.storage.len().checked_mul(2) {
            Some(cap) if cap > 0 => cap,
            _ => {
                inner.source_closed = true;
                return Err(Error::new(None, ErrorDetails::BufferExhausted));
            }
        };
        inner.storage.resize(new_cap, 0);
        Ok(())
    }

    fn maybe_compact(&self, inner: &mut Inner) {
        let capacity = inner.storage.len() as f64;
        if (inner.read_pos as f64) <= self.compaction_threshold * capacity {
            return;
        }
        let live = inner.write_pos - inner.read_pos;
        inner.storage.copy_within(inner.read_pos..inner.write_pos, 0);
        inner.read_pos = 0;
        inner.write_pos = live;

        let shrink_target = std::cmp::max(live * 2, self.shrink_floor);
        if shrink_target < inner.storage.len() {
            inner.storage.truncate(shrink_target);
            inner.storage.shrink_to_fit();
        }
    }

    /// Blocks until `dst.len()` bytes are available or the source has
    /// closed, then copies them out and advances `read_pos`. Returns the
    /// source's own [`ErrorDetails::SourceReadFailure`] if that's why the
    /// source closed, otherwise [`ErrorDetails::UnexpectedEof`].
    pub fn read_exact(&self, dst: &mut [u8]) -> Result<()> {
        let len = dst.len();
        let mut inner = self.inner.lock();
        loop {
            let available = inner.write_pos - inner.read_pos;
            if available >= len {
                dst.copy_from_slice(&inner.storage[inner.read_pos..inner.read_pos + len]);
                inner.read_pos += len;
                return Ok(());
            }
            if inner.source_closed {
                return Err(closed_error(&mut inner, len, available));
            }
            self.not_empty.wait_for(&mut inner, CONSUMER_WAIT_BACKOFF);
        }
    }

    /// Reads and discards `len` bytes, blocking as [`RingBuffer::read_exact`] does.
    pub fn skip(&self, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            let available = inner.write_pos - inner.read_pos;
            if available >= len {
                inner.read_pos += len;
                return Ok(());
            }
            if inner.source_closed {
                return Err(closed_error(&mut inner, len, available));
            }
            self.not_empty.wait_for(&mut inner, CONSUMER_WAIT_BACKOFF);
        }
    }

    /// Reads one byte.
    pub fn read_u8(&self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Reads one byte as a signed value.
    pub fn read_i8(&self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16_be(&self) -> Result<i16> {
        Ok(self.read_u16_be()? as i16)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32_be(&self) -> Result<i32> {
        Ok(self.read_u32_be()? as i32)
    }

    /// Reads `len` bytes into a freshly allocated `Vec<u8>`.
    pub fn read_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Signals shutdown: marks the source closed (waking any blocked
    /// consumer read) and tells a running producer thread to stop pulling
    /// more data within one yield cycle.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        inner.source_closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Whether [`RingBuffer::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Whether the source has reported EOF or failed.
    pub fn is_source_closed(&self) -> bool {
        self.inner.lock().source_closed
    }

    /// Number of bytes currently buffered and unread.
    pub fn available_len(&self) -> usize {
        let inner = self.inner.lock();
        inner.write_pos - inner.read_pos
    }

    /// `true` once every buffered byte has been consumed and the source has
    /// cleanly closed: nothing more will ever become available. `false` if a
    /// read failure is still pending, so the caller's next read surfaces it
    /// instead of this being mistaken for a clean end. Checked under a
    /// single lock acquisition so it can't race with a concurrent `fill_from`.
    pub fn is_exhausted(&self) -> bool {
        let inner = self.inner.lock();
        inner.read_pos == inner.write_pos && inner.source_closed && inner.read_error.is_none()
    }

    /// Current backing storage capacity, for diagnostics/tests.
    pub fn capacity(&self) -> usize {
        self.inner.lock().storage.len()
    }

    fn run_producer<R: Read>(&self, mut source: R) {
        loop {
            if self.is_shutdown() {
                break;
            }
            match self.fill_from(&mut source) {
                Ok(FillOutcome::NoMoreData) => break,
                Ok(FillOutcome::Filled(_)) => {}
                Err(_) => break,
            }
            thread::sleep(PRODUCER_YIELD);
        }
    }

    /// Spawns the producer thread, pulling from `source`
    /// until EOF or [`RingBuffer::shutdown`] is observed.
    pub fn spawn_producer<R: Read + Send + 'static>(
        self: &Arc<Self>,
        source: R,
    ) -> thread::JoinHandle<()> {
        let ring = Arc::clone(self);
        thread::spawn(move || ring.run_producer(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_exact_round_trips_bytes() {
        let rb = RingBuffer::new(64, 64, 0.9, 64);
        let mut source = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        rb.fill_from(&mut source).unwrap();
        let mut dst = [0u8; 5];
        rb.read_exact(&mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_exact_reports_eof_on_truncated_input() {
        let rb = RingBuffer::new(64, 64, 0.9, 64);
        let mut source = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(
            rb.fill_from(&mut source).unwrap(),
            FillOutcome::Filled(3)
        );
        assert_eq!(rb.fill_from(&mut source).unwrap(), FillOutcome::NoMoreData);
        let mut dst = [0u8; 5];
        let err = rb.read_exact(&mut dst).unwrap_err();
        assert!(matches!(err.details, ErrorDetails::UnexpectedEof { .. }));
    }

    #[test]
    fn big_endian_round_trip() {
        let rb = RingBuffer::new(64, 64, 0.9, 64);
        let mut source = Cursor::new(vec![0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01]);
        rb.fill_from(&mut source).unwrap();
        assert_eq!(rb.read_u16_be().unwrap(), 0x1234);
        assert_eq!(rb.read_u32_be().unwrap(), 0xABCDEF01);
    }

    #[test]
    fn grows_once_past_initial_capacity() {
        let rb = RingBuffer::new(16, 16, 0.9, 16);
        let data = vec![7u8; 20];
        let mut source = Cursor::new(data);
        rb.fill_from(&mut source).unwrap(); // fills the first 16 bytes
        assert_eq!(rb.capacity(), 16);
        rb.fill_from(&mut source).unwrap(); // capacity is full, must grow before reading more
        assert_eq!(rb.capacity(), 32);
    }

    #[test]
    fn compacts_after_crossing_threshold() {
        // Capacity stays far above what's ever buffered so growth never
        // interferes; the point is read_pos drifting past the threshold.
        let rb = RingBuffer::new(100, 10, 0.2, 10);
        let mut source = Cursor::new(vec![0u8; 40]);

        rb.fill_from(&mut source).unwrap(); // write_pos: 0 -> 10
        rb.read_bytes(10).unwrap(); // read_pos = 10
        rb.fill_from(&mut source).unwrap(); // write_pos: 10 -> 20, read_pos 10 <= 20: no compaction
        rb.fill_from(&mut source).unwrap(); // write_pos: 20 -> 30
        rb.read_bytes(15).unwrap(); // read_pos = 25 > 0.2 * 100 = 20

        rb.fill_from(&mut source).unwrap(); // write_pos: 30 -> 40, then compacts
        assert_eq!(rb.available_len(), 15);
        assert_eq!(rb.capacity(), 30); // shrunk to max(15 * 2, 10)
    }

    #[test]
    fn skip_advances_without_copying() {
        let rb = RingBuffer::new(16, 16, 0.9, 16);
        let mut source = Cursor::new(vec![1u8, 2, 3, 4]);
        rb.fill_from(&mut source).unwrap();
        rb.skip(2).unwrap();
        assert_eq!(rb.read_u16_be().unwrap(), 0x0304);
    }
}
