//! Sample format helpers: float capture to PCM16, base64 wire encoding and
//! channel mapping.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Converts float samples to signed 16-bit PCM.
///
/// Samples are clamped to [-1, 1] first. Negative values scale by 32768 and
/// non-negative ones by 32767, so both ends of the i16 range are reachable.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

pub fn pcm16_to_base64(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

/// One capture frame in wire form: PCM16 little-endian, base64.
pub fn encode_frame(samples: &[f32]) -> String {
    pcm16_to_base64(&float_to_pcm16(samples))
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// Converts interleaved samples between channel counts.
pub fn convert_channels(samples: &[i16], input_channels: usize, output_channels: usize) -> Vec<i16> {
    if input_channels == output_channels || input_channels == 0 || output_channels == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / input_channels;

    if output_channels == 1 {
        // Multi-channel → mono: average all channels
        (0..frames)
            .map(|i| {
                let frame = &samples[i * input_channels..(i + 1) * input_channels];
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / input_channels as i32) as i16
            })
            .collect()
    } else {
        // General channel mapping (e.g. mono → stereo: duplicate)
        let mut out = vec![0i16; frames * output_channels];
        for i in 0..frames {
            for c in 0..output_channels {
                out[i * output_channels + c] = samples[i * input_channels + (c % input_channels)];
            }
        }
        out
    }
}

pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_conversion_edges() {
        assert_eq!(float_to_pcm16(&[1.0, -1.0, 0.0]), vec![32767, -32768, 0]);
    }

    #[test]
    fn pcm_conversion_clamps_out_of_range() {
        assert_eq!(float_to_pcm16(&[2.5, -7.0]), vec![32767, -32768]);
    }

    #[test]
    fn pcm_conversion_scales_asymmetrically() {
        assert_eq!(float_to_pcm16(&[0.5, -0.5]), vec![16383, -16384]);
    }

    #[test]
    fn frame_encoding_is_little_endian_base64() {
        // 32767 = ff 7f, -32768 = 00 80
        assert_eq!(encode_frame(&[1.0, -1.0]), STANDARD.encode([0xff, 0x7f, 0x00, 0x80]));
        assert_eq!(decode_base64(&encode_frame(&[0.0])).unwrap(), vec![0, 0]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        assert_eq!(convert_channels(&[100, 300, -50, 50], 2, 1), vec![200, 0]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        assert_eq!(convert_channels(&[1, 2], 1, 2), vec![1, 1, 2, 2]);
    }

    #[test]
    fn pcm16_to_float_spans_unit_range() {
        assert_eq!(pcm16_to_float(&[-32768, 0, 16384]), vec![-1.0, 0.0, 0.5]);
    }
}
