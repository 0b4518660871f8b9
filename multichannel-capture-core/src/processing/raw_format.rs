//! Raw channel file format.
//!
//! Each channel file is a headerless run of little-endian IEEE-754 f32
//! samples, one per captured frame:
//! ```text
//! [f0 f0 f0 f0][f1 f1 f1 f1][f2 ...]
//!  └─ 4 bytes LE per sample ─┘
//! ```

/// Bytes per stored sample.
pub const BYTES_PER_SAMPLE: usize = 4;

/// File name for a channel: `<prefix><index>.<extension>`.
pub fn channel_file_name(prefix: &str, channel: u16, extension: &str) -> String {
    if extension.is_empty() {
        format!("{}{}", prefix, channel)
    } else {
        format!("{}{}.{}", prefix, channel, extension)
    }
}

/// Append the little-endian encoding of `samples` to `out`.
pub fn encode_samples_le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Decode a raw channel file body. Trailing bytes that do not form a whole
/// sample are ignored.
pub fn decode_samples_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_naming_matches_reference_layout() {
        assert_eq!(channel_file_name("channel_", 0, "raw"), "channel_0.raw");
        assert_eq!(channel_file_name("channel_", 15, "raw"), "channel_15.raw");
        assert_eq!(channel_file_name("mic", 2, ""), "mic2");
    }

    #[test]
    fn encodes_little_endian() {
        let mut out = Vec::new();
        encode_samples_le(&[1.0, -2.5], &mut out);
        assert_eq!(out, vec![0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x20, 0xC0]);
    }

    #[test]
    fn encode_appends() {
        let mut out = vec![0xFF];
        encode_samples_le(&[0.0], &mut out);
        assert_eq!(out.len(), 1 + BYTES_PER_SAMPLE);
        assert_eq!(out[0], 0xFF);
    }

    #[test]
    fn decode_ignores_partial_trailing_sample() {
        let bytes = [0x00, 0x00, 0x80, 0x3F, 0x12, 0x34];
        assert_eq!(decode_samples_le(&bytes), vec![1.0]);
    }
}
