//! The per-PID Idle/Buffering/Flush state machine that ties every other
//! component together: reassembles PES boundaries, decrypts only the
//! scrambled post-header region of each packet, and drives the producer
//! thread and consumer loop to completion.
//!
//! Tracks pending packets in a `HashMap<u16, PidState>` keyed by PID,
//! buffering until a PES header boundary is known and then selectively
//! decrypting.

use crate::config::DecodeConfig;
use crate::container::DeriveStreamKey;
use crate::error::{Error, ErrorDetails, Result};
use crate::packet::TransportPacket;
use crate::positioned_reader::PositionedReader;
use crate::ring_buffer::RingBuffer;
use crate::scanner;
use crate::stream_type::StreamType;
use crate::turing::{self, TuringKey};
use log::{trace, warn};
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::Arc;

const PACKET_LEN: usize = 188;

/// Block number advances every 16 packets of a stream.
const PACKETS_PER_BLOCK: u32 = 16;

/// Scratch capacity cap: a PES header search spanning more than this many
/// packets is treated as malformed and the pending group is discarded.
const MAX_PENDING_PACKETS: usize = 10;

struct PidState {
    stream_type: StreamType,
    key: Option<TuringKey>,
    block_number: u32,
    packets_since_block_start: u32,
    pending: VecDeque<TransportPacket>,
}

impl PidState {
    fn new(stream_type: StreamType, key: Option<TuringKey>) -> Self {
        Self {
            stream_type,
            key,
            block_number: 0,
            packets_since_block_start: 0,
            pending: VecDeque::new(),
        }
    }

    fn advance_block(&mut self) {
        self.packets_since_block_start += 1;
        if self.packets_since_block_start == PACKETS_PER_BLOCK {
            self.packets_since_block_start = 0;
            self.block_number = self.block_number.wrapping_add(1);
        }
    }
}

/// Packet counters for one completed [`TransportStreamProcessor::process`] call.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct DecodeReport {
    /// Number of 188-byte packets read from the source.
    pub packets_in: u64,
    /// Number of 188-byte packets written to the sink.
    pub packets_out: u64,
}

/// Reassembles a scrambled transport-stream container body into plain
/// MPEG-TS, given the stream list and MAK carried in [`DecodeConfig`].
pub struct TransportStreamProcessor<D: DeriveStreamKey> {
    config: DecodeConfig,
    key_deriver: D,
    pids: HashMap<u16, PidState>,
}

impl<D: DeriveStreamKey> TransportStreamProcessor<D> {
    /// Builds a processor for one decode job.
    pub fn new(config: DecodeConfig, key_deriver: D) -> Self {
        Self {
            config,
            key_deriver,
            pids: HashMap::new(),
        }
    }

    /// The [`StreamType`] resolved for `pid`, if a packet on that PID has
    /// been seen yet. Purely informational: the state machine itself never
    /// branches on it.
    pub fn stream_type(&self, pid: u16) -> Option<StreamType> {
        self.pids.get(&pid).map(|state| state.stream_type)
    }

    /// Spawns the producer thread over `source`, drives the consumer loop
    /// to completion or the first unrecoverable error, and joins the
    /// producer before returning.
    pub fn process<R, W>(&mut self, source: R, mut sink: W) -> Result<DecodeReport>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let ring = Arc::new(RingBuffer::new(
            self.config.initial_capacity,
            self.config.max_pull,
            self.config.compaction_threshold,
            self.config.shrink_floor,
        ));
        let producer = ring.spawn_producer(source);
        let mut reader = PositionedReader::new(Arc::clone(&ring));

        let mut report = DecodeReport::default();
        let result = self.drive(&mut reader, &mut sink, &mut report);

        reader.close();
        let _ = producer.join();

        result.map(|()| report)
    }

    fn drive<W: Write>(
        &mut self,
        reader: &mut PositionedReader,
        sink: &mut W,
        report: &mut DecodeReport,
    ) -> Result<()> {
        loop {
            if reader.is_exhausted() {
                return Ok(());
            }

            let bytes = reader.read_bytes(PACKET_LEN)?;
            let mut frame = [0u8; PACKET_LEN];
            frame.copy_from_slice(&bytes);
            report.packets_in += 1;

            let packet = TransportPacket::parse(frame)?;
            self.handle_packet(packet, sink, report)?;
        }
    }

    fn resolve_pid(&self, pid: u16) -> (StreamType, Option<TuringKey>) {
        let stream_id = (pid & 0xFF) as u8;
        match self
            .config
            .streams
            .iter()
            .find(|d| d.stream_id == stream_id)
        {
            Some(descriptor) => {
                let key = self.key_deriver.derive_stream_key(
                    &self.config.mak,
                    descriptor.stream_id,
                    &descriptor.initial_nonce,
                );
                (descriptor.stream_type, Some(key))
            }
            None => (StreamType::PrivateData, None),
        }
    }

    fn handle_packet<W: Write>(
        &mut self,
        packet: TransportPacket,
        sink: &mut W,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let pid = packet.pid();
        if !self.pids.contains_key(&pid) {
            let (stream_type, key) = self.resolve_pid(pid);
            trace!("pid {}: first packet, classified as {:?}", pid, stream_type);
            self.pids.insert(pid, PidState::new(stream_type, key));
        }

        let state = self.pids.get_mut(&pid).unwrap();
        let was_idle = state.pending.is_empty();
        let payload_start = packet.payload_start();
        state.pending.push_back(packet);

        if was_idle && !payload_start {
            // No PES boundary information at all for this unit: flush the
            // single packet with a zero-length header region.
            return self.flush(pid, 0, sink, report);
        }

        if self.pids.get(&pid).unwrap().pending.len() > MAX_PENDING_PACKETS {
            warn!(
                "pid {}: PES header search exceeded {} packets, discarding group",
                pid, MAX_PENDING_PACKETS
            );
            self.pids.get_mut(&pid).unwrap().pending.clear();
            return Ok(());
        }

        self.recompute_buffering(pid, sink, report)
    }

    fn recompute_buffering<W: Write>(
        &mut self,
        pid: u16,
        sink: &mut W,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let state = self.pids.get_mut(&pid).unwrap();
        let mut scratch = Vec::with_capacity(state.pending.len() * PACKET_LEN);
        for packet in &state.pending {
            scratch.extend_from_slice(packet.payload());
        }

        let outcome = scanner::scan(&scratch);
        if !outcome.success {
            self.pids.get_mut(&pid).unwrap().pending.clear();
            return Err(Error::new(
                None,
                ErrorDetails::UnknownStartCode {
                    code: outcome.unknown_code.unwrap_or(0),
                },
            ));
        }

        let consumed = outcome.consumed_bytes;
        debug_assert!(consumed <= scratch.len());

        if consumed < scratch.len() {
            self.flush(pid, consumed, sink, report)
        } else {
            // Scanning ran out of window mid-header: stay in Buffering and
            // wait for the next packet to extend the scratch buffer.
            Ok(())
        }
    }

    fn flush<W: Write>(
        &mut self,
        pid: u16,
        header_total_bytes: usize,
        sink: &mut W,
        report: &mut DecodeReport,
    ) -> Result<()> {
        let mut queue = {
            let state = self.pids.get_mut(&pid).unwrap();
            std::mem::take(&mut state.pending)
        };

        let mut remaining = header_total_bytes;
        for packet in queue.iter_mut() {
            let payload_len = packet.payload_len();
            if remaining >= payload_len {
                packet.pes_header_offset = payload_len as u16;
                remaining -= payload_len;
            } else {
                packet.pes_header_offset = remaining as u16;
                remaining = 0;
            }
        }

        for mut packet in queue {
            self.emit(pid, &mut packet, sink)?;
            report.packets_out += 1;
        }
        Ok(())
    }

    fn emit<W: Write>(&mut self, pid: u16, packet: &mut TransportPacket, sink: &mut W) -> Result<()> {
        let state = self.pids.get_mut(&pid).unwrap();

        if packet.is_scrambled() {
            if let Some(key) = state.key {
                let region_start = packet.payload_offset() + packet.pes_header_offset as usize;
                let mut region = packet.get_bytes()[region_start..].to_vec();

                if !region.is_empty() {
                    match turing::do_header(&region) {
                        Some((stream_id, block_number)) => trace!(
                            "pid {}: in-band header reports stream_id={} block_number={} (cross-check only, processor block={})",
                            pid, stream_id, block_number, state.block_number
                        ),
                        None => {
                            return Err(Error::new(
                                None,
                                ErrorDetails::DecryptFailure {
                                    reason: "scrambled region too short to contain a Turing block header",
                                },
                            ));
                        }
                    }
                }

                turing::decrypt_bytes(&key, state.block_number, &mut region);
                packet.clear_scrambled();
                let frame = packet.get_scrambled_bytes(&region);
                sink.write_all(&frame)?;
            } else {
                warn!("pid {}: scrambled packet with no resolved key, emitting verbatim", pid);
                sink.write_all(packet.get_bytes())?;
            }
        } else {
            sink.write_all(packet.get_bytes())?;
        }

        state.advance_block();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_support::XorTestDeriver;
    use crate::container::StreamDescriptor;
    use std::io::Cursor;

    fn packet_header(pusi: bool, scramble: u8, pid: u16) -> [u8; 4] {
        let b1 = ((pusi as u8) << 6) | (((pid >> 8) as u8) & 0x1F);
        let b2 = (pid & 0xFF) as u8;
        let b3 = (scramble << 6) | 0b01_0000; // payload only
        [0x47, b1, b2, b3]
    }

    fn plain_packet(pid: u16, fill: u8) -> [u8; PACKET_LEN] {
        let mut p = [fill; PACKET_LEN];
        p[..4].copy_from_slice(&packet_header(false, 0, pid));
        p
    }

    #[test]
    fn plaintext_packets_pass_through_unchanged() {
        let config = DecodeConfig::new("", vec![]);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        let p1 = plain_packet(0x10, 0xAA);
        let p2 = plain_packet(0x10, 0xBB);
        let mut input = Vec::new();
        input.extend_from_slice(&p1);
        input.extend_from_slice(&p2);

        let mut out = Vec::new();
        let report = processor.process(Cursor::new(input.clone()), &mut out).unwrap();

        assert_eq!(report.packets_in, 2);
        assert_eq!(report.packets_out, 2);
        assert_eq!(out, input);
    }

    #[test]
    fn scrambled_single_packet_decrypts_post_header_region() {
        let nonce = [0x11u8; 16];
        let streams = vec![StreamDescriptor::new(0x10, 0x02, nonce)];
        let config = DecodeConfig::new("test-mak", streams);
        let deriver = XorTestDeriver;
        let key = deriver.derive_stream_key("test-mak", 0x10, &nonce);

        let mut packet = [0u8; PACKET_LEN];
        packet[..4].copy_from_slice(&packet_header(true, 0b11, 0x10));
        // PES video start with a 2-byte additional header: total header = 6+3+2=11 bytes.
        let header_bytes = [0x00, 0x00, 0x01, 0xE0, 0x00, 0x05, 0x80, 0x00, 0x02, 0xCC, 0xDD];
        packet[4..4 + header_bytes.len()].copy_from_slice(&header_bytes);
        let plain_tail: Vec<u8> = (0..(PACKET_LEN - 4 - header_bytes.len()))
            .map(|i| i as u8)
            .collect();
        packet[4 + header_bytes.len()..].copy_from_slice(&plain_tail);

        let mut expected_region = plain_tail.clone();
        turing::decrypt_bytes(&key, 0, &mut expected_region);

        let mut processor = TransportStreamProcessor::new(config, deriver);
        let mut out = Vec::new();
        let report = processor.process(Cursor::new(packet.to_vec()), &mut out).unwrap();

        assert_eq!(report.packets_out, 1);
        assert_eq!(out[3] & 0xC0, 0); // scramble bits cleared
        assert_eq!(&out[4..4 + header_bytes.len()], &header_bytes[..]);
        assert_eq!(&out[4 + header_bytes.len()..], expected_region.as_slice());
    }

    #[test]
    fn pes_header_straddling_two_packets() {
        let nonce = [0x22u8; 16];
        let streams = vec![StreamDescriptor::new(0x20, 0x02, nonce)];
        let config = DecodeConfig::new("mak", streams);
        let deriver = XorTestDeriver;
        let key = deriver.derive_stream_key("mak", 0x20, &nonce);

        // Packet 1: payload_start, entirely PES header (no additional header
        // bytes beyond the fixed 9, padded so the scan can't find the end in
        // this packet: additional_header_length large enough to run past 188).
        let mut p1 = [0u8; PACKET_LEN];
        p1[..4].copy_from_slice(&packet_header(true, 0b11, 0x20));
        let remaining_payload_p1 = PACKET_LEN - 4;
        let additional_len_total = remaining_payload_p1 - 9 + 20; // ends 20 bytes into packet 2's payload
        p1[4..13].copy_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x05, 0x80, 0x00, additional_len_total as u8]);
        // fill the rest of packet 1's payload with "additional header" filler
        for b in p1[13..].iter_mut() {
            *b = 0x00;
        }

        let mut p2 = [0xEE; PACKET_LEN];
        p2[..4].copy_from_slice(&packet_header(false, 0b11, 0x20));

        let mut processor = TransportStreamProcessor::new(config, deriver);
        let mut input = Vec::new();
        input.extend_from_slice(&p1);
        input.extend_from_slice(&p2);
        let mut out = Vec::new();
        let report = processor.process(Cursor::new(input), &mut out).unwrap();

        assert_eq!(report.packets_out, 2);
        // Packet 1 entirely header: scramble bits cleared, bytes otherwise unchanged.
        assert_eq!(out[3] & 0xC0, 0);
        assert_eq!(&out[4..PACKET_LEN], &p1[4..PACKET_LEN]);
        // Packet 2: first 20 bytes of payload are header (unchanged), rest decrypted.
        let p2_out = &out[PACKET_LEN..];
        assert_eq!(p2_out[3] & 0xC0, 0);
        assert_eq!(&p2_out[4..24], &p2[4..24]);
        let mut expected_tail = p2[24..].to_vec();
        turing::decrypt_bytes(&key, 0, &mut expected_tail);
        assert_eq!(&p2_out[24..], expected_tail.as_slice());
    }

    #[test]
    fn unknown_start_code_aborts_process() {
        let config = DecodeConfig::new("", vec![]);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        let mut packet = [0u8; PACKET_LEN];
        packet[..4].copy_from_slice(&packet_header(true, 0, 0x30));
        packet[4..8].copy_from_slice(&[0x00, 0x00, 0x01, 0xFF]);

        let mut out = Vec::new();
        let result = processor.process(Cursor::new(packet.to_vec()), &mut out);
        assert!(result.is_err());
    }

    #[test]
    fn truncated_input_mid_packet_reports_eof() {
        let config = DecodeConfig::new("", vec![]);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        let short = vec![0x47u8; 180];
        let mut out = Vec::new();
        let result = processor.process(Cursor::new(short), &mut out);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().details,
            ErrorDetails::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn continuation_packet_with_no_prior_state_emits_as_is() {
        let config = DecodeConfig::new("", vec![]);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        let mut packet = [0u8; PACKET_LEN];
        packet[..4].copy_from_slice(&packet_header(false, 0b11, 0x40)); // scrambled, no key resolvable
        let mut out = Vec::new();
        let report = processor.process(Cursor::new(packet.to_vec()), &mut out).unwrap();
        assert_eq!(report.packets_out, 1);
        assert_eq!(out, packet.to_vec());
    }

    #[test]
    fn scrambled_region_too_short_for_a_header_reports_decrypt_failure() {
        let nonce = [0x33u8; 16];
        let streams = vec![StreamDescriptor::new(0x50, 0x02, nonce)];
        let config = DecodeConfig::new("mak", streams);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        // PES header consumes 182 of the packet's 184 payload bytes, leaving
        // only 2 scrambled bytes: too few for do_header's 5-byte prefix.
        let mut packet = [0u8; PACKET_LEN];
        packet[..4].copy_from_slice(&packet_header(true, 0b11, 0x50));
        let mut payload = vec![0u8; PACKET_LEN - 4];
        payload[0..3].copy_from_slice(&[0x00, 0x00, 0x01]);
        payload[3] = 0xE0;
        payload[8] = 173; // additional_header_length: 9 + 173 = 182
        packet[4..].copy_from_slice(&payload);

        let mut out = Vec::new();
        let result = processor.process(Cursor::new(packet.to_vec()), &mut out);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().details,
            ErrorDetails::DecryptFailure { .. }
        ));
    }

    #[test]
    fn stream_type_reports_the_resolved_classification() {
        let nonce = [0x44u8; 16];
        let streams = vec![StreamDescriptor::new(0x60, 0x0F, nonce)]; // audio
        let config = DecodeConfig::new("mak", streams);
        let mut processor = TransportStreamProcessor::new(config, XorTestDeriver);

        assert_eq!(processor.stream_type(0x60), None);

        let packet = plain_packet(0x60, 0xAA);
        let mut out = Vec::new();
        processor.process(Cursor::new(packet.to_vec()), &mut out).unwrap();

        assert_eq!(processor.stream_type(0x60), Some(StreamType::Audio));
    }
}
