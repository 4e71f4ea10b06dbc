//! Decodes a proprietary encrypted DVR transport-stream container into plain
//! MPEG-TS.
//!
//! The body of such a file is a concatenation of 188-byte transport-stream
//! packets; selected packet payloads are scrambled with a Turing-style
//! stream cipher keyed per elementary stream and per 16-packet block, with
//! the cipher applied only to the portion of each payload that lies past
//! the Packetised-Elementary-Stream (PES) header. [`TransportStreamProcessor`]
//! reassembles PES boundaries across packets and decrypts exactly that
//! trailing region, leaving everything else byte-for-byte untouched.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! dvrts-io = "~0.1.0"
//! ```
//!
//! Callers supply a [`DeriveStreamKey`] implementation (the media-access-key
//! derivation itself lives outside this crate) and a [`DecodeConfig`] built
//! from the container's own stream list:
//!
//! ```no_run
//! use dvrts_io::{DecodeConfig, DeriveStreamKey, StreamDescriptor, TransportStreamProcessor, TuringKey};
//! use std::fs::File;
//!
//! struct MyKeyDeriver;
//! impl DeriveStreamKey for MyKeyDeriver {
//!     fn derive_stream_key(&self, _mak: &str, _stream_id: u8, initial_nonce: &[u8; 16]) -> TuringKey {
//!         // real derivation lives outside this crate.
//!         TuringKey(*initial_nonce)
//!     }
//! }
//!
//! let streams = vec![StreamDescriptor::new(0xE0, 0x02, [0u8; 16])];
//! let config = DecodeConfig::new("my-mak", streams);
//! let mut processor = TransportStreamProcessor::new(config, MyKeyDeriver);
//! let source = File::open("recording.tivo").unwrap();
//! let mut sink = File::create("recording.ts").unwrap();
//! let report = processor.process(source, &mut sink).unwrap();
//! println!("{} packets in, {} out", report.packets_in, report.packets_out);
//! ```

#![allow(unused)]
#![deny(missing_docs, unsafe_code, warnings)]

mod config;
mod container;
mod error;
mod packet;
mod positioned_reader;
mod processor;
mod ring_buffer;
mod scanner;
mod stream_type;
mod turing;

pub use config::{
    DecodeConfig, DEFAULT_COMPACTION_THRESHOLD, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_PULL,
    DEFAULT_SHRINK_FLOOR,
};
pub use container::{DeriveStreamKey, StreamDescriptor};
pub use error::{Error, ErrorDetails, Location, Result};
pub use positioned_reader::PositionedReader;
pub use processor::{DecodeReport, TransportStreamProcessor};
pub use ring_buffer::{FillOutcome, RingBuffer};
pub use stream_type::StreamType;
pub use turing::TuringKey;
