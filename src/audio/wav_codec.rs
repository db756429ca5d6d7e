//! RIFF/WAV fragment decoder.

use std::io::Cursor;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader};

use super::stream_decoder::{DecodedAudio, StreamDecoder};

pub struct WavDecoder;

impl StreamDecoder for WavDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio> {
        let mut reader = WavReader::new(Cursor::new(data)).context("Invalid WAV header")?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .collect::<Result<_, _>>()
                .context("Truncated WAV data")?,
            (SampleFormat::Int, bits @ 1..=32) => reader
                .samples::<i32>()
                .map(|s| s.map(|v| scale_to_i16(v, bits)))
                .collect::<Result<_, _>>()
                .context("Truncated WAV data")?,
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0) as i16))
                .collect::<Result<_, _>>()
                .context("Truncated WAV data")?,
            (format, bits) => bail!("Unsupported WAV sample format {:?}/{} bit", format, bits),
        };

        if samples.is_empty() {
            bail!("WAV fragment has no samples");
        }

        Ok(DecodedAudio {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

fn scale_to_i16(value: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}
