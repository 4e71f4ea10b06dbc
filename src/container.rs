//! Container header model.
//!
//! Parsing the outer container header is treated as an external concern:
//! something else parses the file header and hands the core engine a list
//! of stream descriptors plus the MAK. This module models just enough of
//! that boundary for [`crate::processor::TransportStreamProcessor`] to
//! resolve a per-PID [`TuringKey`](crate::turing::TuringKey) at job start.

use crate::stream_type::StreamType;
use crate::turing::TuringKey;

/// One entry of the header-level stream list.
///
/// `stream_id` is taken to be the low 8 bits of the elementary PID that
/// carries this stream, the only relationship the container format affords
/// without parsing it ourselves (out of scope, see crate docs).
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Low byte of the PID carrying this elementary stream.
    pub stream_id: u8,
    /// Declared stream type, already classified.
    pub stream_type: StreamType,
    /// Per-stream nonce recorded in the header, fed into key derivation
    /// alongside the MAK and `stream_id`.
    pub initial_nonce: [u8; 16],
}

impl StreamDescriptor {
    /// Builds a descriptor from the raw `(stream_id, stream_type, nonce)` triple
    /// as read off the container header.
    pub fn new(stream_id: u8, stream_type_code: u8, initial_nonce: [u8; 16]) -> Self {
        Self {
            stream_id,
            stream_type: StreamType::from_code(stream_type_code),
            initial_nonce,
        }
    }
}

/// Pins the external MAK-to-Turing-key derivation as an injectable,
/// pure-function collaborator — the derivation itself lives outside this
/// crate.
///
/// Implementations are expected to be pure and side-effect free; the
/// processor calls this exactly once per stream, at job start.
pub trait DeriveStreamKey {
    /// Derives the per-stream Turing key from the media access key, the
    /// stream id, and the per-stream nonce recorded in the container header.
    fn derive_stream_key(&self, mak: &str, stream_id: u8, initial_nonce: &[u8; 16]) -> TuringKey;
}
