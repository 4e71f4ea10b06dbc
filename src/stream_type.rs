//! Elementary stream type classification.
//!
//! Expressed as a plain const table at module scope rather than a trait
//! hierarchy, since the classification is a flat lookup with no per-variant
//! behaviour.

/// Coarse classification of an elementary stream, derived from the MPEG/DVB
/// stream type byte carried in the container header's stream descriptor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StreamType {
    /// No payload is expected on this PID (stream type `0x00`).
    None,
    /// Video elementary stream.
    Video,
    /// Audio elementary stream.
    Audio,
    /// Private/opaque data stream.
    PrivateData,
    /// Recognised but otherwise uncategorised stream type.
    Other,
}

const VIDEO_TYPES: &[u8] = &[0x01, 0x02, 0x10, 0x1B, 0x80, 0xEA];
const AUDIO_TYPES: &[u8] = &[0x03, 0x04, 0x0F, 0x11, 0x81, 0x8A];
const PRIVATE_DATA_TYPES: &[u8] = &[0x97];

fn is_other_type(code: u8) -> bool {
    matches!(code, 0x05..=0x09 | 0x0A..=0x0E | 0x12..=0x1A | 0x7F)
}

impl StreamType {
    /// Classifies a raw MPEG/DVB stream type byte read from the container
    /// header. Unknown codes default to [`StreamType::PrivateData`].
    pub fn from_code(code: u8) -> Self {
        if code == 0x00 {
            StreamType::None
        } else if VIDEO_TYPES.contains(&code) {
            StreamType::Video
        } else if AUDIO_TYPES.contains(&code) {
            StreamType::Audio
        } else if PRIVATE_DATA_TYPES.contains(&code) {
            StreamType::PrivateData
        } else if is_other_type(code) {
            StreamType::Other
        } else {
            StreamType::PrivateData
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_codes() {
        assert_eq!(StreamType::from_code(0x1B), StreamType::Video);
        assert_eq!(StreamType::from_code(0x0F), StreamType::Audio);
        assert_eq!(StreamType::from_code(0x97), StreamType::PrivateData);
        assert_eq!(StreamType::from_code(0x00), StreamType::None);
        assert_eq!(StreamType::from_code(0x06), StreamType::Other);
    }

    #[test]
    fn defaults_unknown_codes_to_private_data() {
        assert_eq!(StreamType::from_code(0xFF), StreamType::PrivateData);
        assert_eq!(StreamType::from_code(0x50), StreamType::PrivateData);
    }
}
