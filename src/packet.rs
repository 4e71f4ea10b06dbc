//! 188-byte transport-stream frame, parsed once and partially rewritten in
//! place by the Flush transition in [`crate::processor`].
//!
//! Field layout matches the standard MPEG-TS link-layer header, parsed with
//! the same MSB-first bitfield approach used for the adaptation field.

use crate::error::{Error, ErrorDetails};
use modular_bitfield_msb::prelude::*;

const PACKET_LEN: usize = 188;
const SYNC_BYTE: u8 = 0x47;

/// Link-layer header found at the start of every packet.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PacketHeader {
    sync_byte: B8,
    transport_error: bool,
    payload_start: bool,
    transport_priority: bool,
    pid: B13,
    scrambling_control: B2,
    adaptation_field_control: B2,
    continuity_counter: B4,
}

/// One 188-byte transport-stream packet, with the fields needed for framing
/// and selective decryption parsed out. `pes_header_offset` starts at 0 and
/// is finalised by the processor's Flush transition.
#[derive(Debug, Clone)]
pub struct TransportPacket {
    bytes: [u8; PACKET_LEN],
    pid: u16,
    payload_start: bool,
    transport_error: bool,
    transport_priority: bool,
    scrambling_control: u8,
    continuity_counter: u8,
    payload_offset: usize,
    /// Bytes from `payload_offset` that are plaintext PES header and must
    /// not be decrypted. Finalised by the processor during Flush.
    pub pes_header_offset: u16,
}

impl TransportPacket {
    /// Parses a raw 188-byte frame.
    pub fn parse(bytes: [u8; PACKET_LEN]) -> Result<Self, Error> {
        if bytes[0] != SYNC_BYTE {
            return Err(Error::new(
                None,
                ErrorDetails::MalformedPacket {
                    reason: "sync byte absent",
                },
            ));
        }

        let header = PacketHeader::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let adaptation_field_control = header.adaptation_field_control();

        let mut payload_offset = 4;
        if adaptation_field_control & 0b10 != 0 {
            let af_length = *bytes.get(4).ok_or_else(|| {
                Error::new(
                    None,
                    ErrorDetails::MalformedPacket {
                        reason: "adaptation field length out of bounds",
                    },
                )
            })? as usize;
            payload_offset += 1 + af_length;
        }

        if payload_offset > PACKET_LEN {
            return Err(Error::new(
                None,
                ErrorDetails::MalformedPacket {
                    reason: "adaptation field longer than the packet",
                },
            ));
        }

        Ok(Self {
            bytes,
            pid: header.pid(),
            payload_start: header.payload_start(),
            transport_error: header.transport_error(),
            transport_priority: header.transport_priority(),
            scrambling_control: header.scrambling_control(),
            continuity_counter: header.continuity_counter(),
            payload_offset,
            pes_header_offset: 0,
        })
    }

    /// 13-bit Packet Identifier.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Payload Unit Start Indicator.
    pub fn payload_start(&self) -> bool {
        self.payload_start
    }

    /// Transport error indicator bit.
    pub fn transport_error(&self) -> bool {
        self.transport_error
    }

    /// Transport priority bit.
    pub fn transport_priority(&self) -> bool {
        self.transport_priority
    }

    /// Raw 2-bit scrambling control value.
    pub fn scrambling_control(&self) -> u8 {
        self.scrambling_control
    }

    /// `true` unless `scrambling_control` is zero.
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }

    /// 4-bit continuity counter.
    pub fn continuity_counter(&self) -> u8 {
        self.continuity_counter
    }

    /// Byte offset of the payload, past the link-layer header and any
    /// adaptation field.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Length of the payload, in bytes.
    pub fn payload_len(&self) -> usize {
        PACKET_LEN - self.payload_offset
    }

    /// The payload bytes, unmodified.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.payload_offset..]
    }

    /// Clears the two scrambling-control bits in the cached header byte.
    pub fn clear_scrambled(&mut self) {
        self.scrambling_control = 0;
        self.bytes[3] &= 0x3F;
    }

    /// Returns the unmodified 188 bytes of this packet.
    pub fn get_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.bytes
    }

    /// Returns a 188-byte buffer where the header and plaintext prefix
    /// (`payload_offset + pes_header_offset` bytes) are preserved, the
    /// remainder comes from `plaintext`, and the scrambling-control bits
    /// are cleared.
    pub fn get_scrambled_bytes(&self, plaintext: &[u8]) -> [u8; PACKET_LEN] {
        let prefix_len = self.payload_offset + self.pes_header_offset as usize;
        debug_assert_eq!(plaintext.len(), PACKET_LEN - prefix_len);

        let mut out = self.bytes;
        out[3] &= 0x3F;
        out[prefix_len..].copy_from_slice(plaintext);
        out
    }
}
