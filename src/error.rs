//! Crate-wide error type.
//!
//! A location plus a details enum, with `Display`/`std::error::Error` impls
//! so `?` composes the way callers of a published crate expect.

use std::fmt;
use std::io;

/// Absolute byte offset (from [`crate::PositionedReader::position`]) or packet-local
/// offset at which an error was encountered, when one is meaningful.
pub type Location = Option<u64>;

/// Everything that can go wrong while decoding a container.
#[derive(Debug)]
pub struct Error {
    /// Where in the input stream the error was encountered, if known.
    pub location: Location,
    /// What went wrong.
    pub details: ErrorDetails,
}

/// Semantic error kinds, with payload fields added to make `Display`
/// useful.
#[derive(Debug)]
pub enum ErrorDetails {
    /// The consumer asked for `requested` bytes but the source closed with
    /// only `available` left.
    UnexpectedEof { requested: usize, available: usize },
    /// The ring buffer could not grow further (capacity doubling overflowed).
    BufferExhausted,
    /// Sync byte absent, or packet framing was otherwise impossible.
    MalformedPacket { reason: &'static str },
    /// [`crate::scanner`] saw a start-code prefix with an unrecognised identifier.
    UnknownStartCode { code: u32 },
    /// Header parse for a Turing block failed (stream id unknown, short read).
    DecryptFailure { reason: &'static str },
    /// The input source returned an I/O error while the producer thread was
    /// pulling more bytes.
    SourceReadFailure(io::Error),
    /// The output sink returned an I/O error.
    SinkWriteFailure(io::Error),
}

impl Error {
    pub(crate) fn new(location: Location, details: ErrorDetails) -> Self {
        Self { location, details }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "at byte {}: {}", loc, self.details),
            None => write!(f, "{}", self.details),
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetails::UnexpectedEof {
                requested,
                available,
            } => write!(
                f,
                "unexpected end of input: requested {} bytes, {} available",
                requested, available
            ),
            ErrorDetails::BufferExhausted => write!(f, "ring buffer exhausted: cannot grow further"),
            ErrorDetails::MalformedPacket { reason } => write!(f, "malformed packet: {}", reason),
            ErrorDetails::UnknownStartCode { code } => {
                write!(f, "unrecognised MPEG start code: {:#010x}", code)
            }
            ErrorDetails::DecryptFailure { reason } => write!(f, "decrypt failure: {}", reason),
            ErrorDetails::SourceReadFailure(e) => write!(f, "source read failure: {}", e),
            ErrorDetails::SinkWriteFailure(e) => write!(f, "sink write failure: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.details {
            ErrorDetails::SourceReadFailure(e) => Some(e),
            ErrorDetails::SinkWriteFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::new(None, ErrorDetails::SinkWriteFailure(e))
    }
}

/// [`std::result::Result`] alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
