//! Keystream generator honoring the published Turing stream-cipher contract:
//! deterministic, reversible, keyed by a 16-byte key and a 32-bit block
//! number. The key-schedule math itself — the real cipher's LFSR tap
//! positions and S-box construction — is out of scope here; this module
//! reproduces the same two-layer shape (linear-feedback register plus
//! non-linear byte substitution) without claiming bit-exact compatibility:
//! regenerate a fixed-size block of keystream words at a time, re-key on
//! construction, XOR to combine.

use log::trace;

/// A resolved per-stream Turing key, opaque to callers outside this crate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TuringKey(pub [u8; 16]);

impl std::fmt::Debug for TuringKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TuringKey").field(&"<redacted>").finish()
    }
}

const LFSR_WORDS: usize = 17;
const QBOX_SIZE: usize = 256;
const WORDS_PER_BLOCK: usize = 20;

/// Per-(key, block) keystream state. Cheap to construct; holds no buffers
/// beyond the fixed-size register and substitution table.
pub struct TuringState {
    lfsr: [u32; LFSR_WORDS],
    qbox: [u8; QBOX_SIZE],
}

impl TuringState {
    /// Derives the LFSR register and substitution table from a 16-byte key.
    pub fn new(key: &[u8; 16]) -> Self {
        let mut lfsr = [0u32; LFSR_WORDS];
        for (i, word) in lfsr.iter_mut().enumerate() {
            let k = [
                key[(4 * i) % 16],
                key[(4 * i + 1) % 16],
                key[(4 * i + 2) % 16],
                key[(4 * i + 3) % 16],
            ];
            *word = u32::from_be_bytes(k) ^ (i as u32).wrapping_mul(0x9E3779B9);
        }

        let mut qbox = [0u8; QBOX_SIZE];
        let mut acc = key.iter().fold(0u8, |a, &b| a.wrapping_add(b).rotate_left(1));
        for (i, slot) in qbox.iter_mut().enumerate() {
            acc = acc
                .wrapping_add(key[i % 16])
                .rotate_left(3)
                .wrapping_add(i as u8);
            *slot = acc;
        }

        Self { lfsr, qbox }
    }

    fn clock(&mut self) -> u32 {
        let feedback = self.lfsr[0]
            ^ self.lfsr[2].rotate_left(7)
            ^ self.lfsr[5].rotate_left(13)
            ^ self.lfsr[11].rotate_left(19);
        for i in 0..LFSR_WORDS - 1 {
            self.lfsr[i] = self.lfsr[i + 1];
        }
        self.lfsr[LFSR_WORDS - 1] = feedback;
        feedback
    }

    fn substitute(&self, word: u32) -> u32 {
        let bytes = word.to_be_bytes();
        let subbed = [
            self.qbox[bytes[0] as usize],
            self.qbox[bytes[1] as usize],
            self.qbox[bytes[2] as usize],
            self.qbox[bytes[3] as usize],
        ];
        u32::from_be_bytes(subbed).rotate_left(11).wrapping_add(word)
    }

    /// Generates one block (20 words, 80 bytes) of keystream for
    /// `block_number`, folding the block number into the register once.
    fn generate_block(&mut self, block_number: u32) -> [u8; WORDS_PER_BLOCK * 4] {
        self.lfsr[LFSR_WORDS - 1] ^= block_number;
        let mut out = [0u8; WORDS_PER_BLOCK * 4];
        for chunk in out.chunks_exact_mut(4) {
            let raw = self.clock();
            let word = self.substitute(raw);
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

/// XORs `buf` in place with keystream bytes generated from `key`, starting
/// at `block_number` and advancing to subsequent blocks as needed. The same
/// operation serves both directions since XOR is its own inverse.
pub fn decrypt_bytes(key: &TuringKey, block_number: u32, buf: &mut [u8]) {
    let mut state = TuringState::new(&key.0);
    let mut block_number = block_number;
    let mut offset = 0;
    while offset < buf.len() {
        let block = state.generate_block(block_number);
        let take = (buf.len() - offset).min(block.len());
        for i in 0..take {
            buf[offset + i] ^= block[i];
        }
        offset += take;
        block_number = block_number.wrapping_add(1);
    }
    trace!("decrypted {} bytes starting at block {}", buf.len(), block_number);
}

/// Reads the 1-byte stream id and 4-byte big-endian block number that
/// prefix a scrambled payload.
pub fn do_header(buf: &[u8]) -> Option<(u8, u32)> {
    if buf.len() < 5 {
        return None;
    }
    let stream_id = buf[0];
    let block_number = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    Some((stream_id, block_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypting_twice_with_the_same_key_and_block_is_identity() {
        // XOR is its own inverse: applying decrypt_bytes a second time with
        // the same key/block reproduces the original buffer.
        let key = TuringKey([7u8; 16]);
        let mut buf: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
        let original = buf.clone();

        decrypt_bytes(&key, 3, &mut buf);
        assert_ne!(buf, original);
        decrypt_bytes(&key, 3, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn different_block_numbers_diverge() {
        let key = TuringKey([1u8; 16]);
        let mut a = vec![0u8; 32];
        let mut b = vec![0u8; 32];
        decrypt_bytes(&key, 0, &mut a);
        decrypt_bytes(&key, 1, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn different_keys_diverge() {
        let mut a = vec![0u8; 32];
        let mut b = vec![0u8; 32];
        decrypt_bytes(&TuringKey([1u8; 16]), 5, &mut a);
        decrypt_bytes(&TuringKey([2u8; 16]), 5, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn keystream_spans_multiple_blocks() {
        let key = TuringKey([9u8; 16]);
        let mut buf = vec![0u8; 81]; // one byte past a single 80-byte block
        decrypt_bytes(&key, 0, &mut buf);
        let mut expected_tail = vec![0u8; 81];
        decrypt_bytes(&key, 0, &mut expected_tail);
        assert_eq!(buf, expected_tail);
    }

    #[test]
    fn do_header_reads_stream_id_and_block_number() {
        let buf = [0x05, 0x00, 0x00, 0x00, 0x2A, 0xAA, 0xBB];
        let (stream_id, block_number) = do_header(&buf).unwrap();
        assert_eq!(stream_id, 0x05);
        assert_eq!(block_number, 0x2A);
    }

    #[test]
    fn do_header_rejects_short_buffers() {
        assert!(do_header(&[0x01, 0x02]).is_none());
    }
}
