// Sample decoder for raw binary frames
// Frames are packed little-endian f32 samples preceded by a 4-byte lead word

/// Size in bytes of one packed sample
pub const SAMPLE_BYTES: usize = 4;

/// Number of samples `decode_samples` will produce for a frame of `len` bytes
#[cfg(test)]
fn decoded_len(len: usize) -> usize {
    len.saturating_sub(SAMPLE_BYTES) / SAMPLE_BYTES
}

/// Decode a raw frame into PCM samples.
///
/// The first 4 bytes of every frame are skipped before any sample is
/// emitted, so a frame of `n` bytes yields `(n - 4) / 4` samples. Capture
/// clients rely on this lead word, so it is kept rather than treated as audio.
/// A trailing partial group is dropped.
///
/// # Examples
/// ```
/// use audiorelay_lib::audio::decoder::decode_samples;
///
/// let mut frame = vec![0u8; 4];
/// frame.extend_from_slice(&0.5f32.to_le_bytes());
/// assert_eq!(decode_samples(&frame), vec![0.5]);
/// ```
pub fn decode_samples(raw: &[u8]) -> Vec<f32> {
    let body = match raw.get(SAMPLE_BYTES..) {
        Some(body) => body,
        None => return Vec::new(),
    };

    body.chunks_exact(SAMPLE_BYTES)
        .map(|group| f32::from_le_bytes([group[0], group[1], group[2], group[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_lead(lead: f32, samples: &[f32]) -> Vec<u8> {
        let mut raw = lead.to_le_bytes().to_vec();
        for sample in samples {
            raw.extend_from_slice(&sample.to_le_bytes());
        }
        raw
    }

    #[test]
    fn test_lead_word_is_skipped() {
        let raw = frame_with_lead(9.0, &[0.25, -0.5, 1.0]);
        assert_eq!(decode_samples(&raw), vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_short_frames_decode_to_nothing() {
        assert!(decode_samples(&[]).is_empty());
        assert!(decode_samples(&[1, 2, 3]).is_empty());
        assert!(decode_samples(&1.0f32.to_le_bytes()).is_empty());
    }

    #[test]
    fn test_trailing_partial_group_is_dropped() {
        let mut raw = frame_with_lead(0.0, &[0.75]);
        raw.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(decode_samples(&raw), vec![0.75]);
        assert_eq!(decoded_len(raw.len()), 1);
    }

    #[test]
    fn test_decoded_len_matches_output() {
        for len in 0..40 {
            let raw = vec![0u8; len];
            assert_eq!(decode_samples(&raw).len(), decoded_len(len), "len {}", len);
        }
    }

    #[test]
    fn test_eight_byte_frame_yields_one_sample() {
        let raw = frame_with_lead(3.0, &[-0.125]);
        assert_eq!(raw.len(), 8);
        assert_eq!(decode_samples(&raw), vec![-0.125]);
    }
}
