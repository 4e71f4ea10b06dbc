//! Per-job configuration.
//!
//! Aggregates the ring-buffer tunables plus the container metadata a job
//! needs at start, so a caller only has to touch the fields that differ
//! from the crate's own defaults. Mirrors the `#[derive(Default)]`
//! parser-state pattern used elsewhere in this crate.

use crate::container::StreamDescriptor;

/// Initial [`crate::RingBuffer`] capacity in bytes.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16 * 1024 * 1024;

/// Maximum bytes pulled from the source in a single `fill_from` call.
pub const DEFAULT_MAX_PULL: usize = 64 * 1024;

/// Fraction of capacity consumed by `read_pos` that triggers compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.9;

/// Floor capacity kept after a compaction shrinks the buffer.
pub const DEFAULT_SHRINK_FLOOR: usize = 16 * 1024 * 1024;

/// Tunables and container metadata for one decode job.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Media access key supplied by the caller.
    pub mak: String,
    /// Per-stream descriptors read from the container header.
    pub streams: Vec<StreamDescriptor>,
    /// Initial ring buffer capacity, in bytes.
    pub initial_capacity: usize,
    /// Maximum bytes pulled from the source per `fill_from` call.
    pub max_pull: usize,
    /// Fraction of capacity consumed by `read_pos` that triggers compaction.
    pub compaction_threshold: f64,
    /// Floor capacity kept after a compaction shrinks the buffer.
    pub shrink_floor: usize,
}

impl DecodeConfig {
    /// Builds a config for the given MAK and stream descriptors, with every
    /// other tunable set to this crate's literal defaults.
    pub fn new(mak: impl Into<String>, streams: Vec<StreamDescriptor>) -> Self {
        Self {
            mak: mak.into(),
            streams,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_pull: DEFAULT_MAX_PULL,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            shrink_floor: DEFAULT_SHRINK_FLOOR,
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            mak: String::new(),
            streams: Vec::new(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_pull: DEFAULT_MAX_PULL,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            shrink_floor: DEFAULT_SHRINK_FLOOR,
        }
    }
}
