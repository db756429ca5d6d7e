//! Generic stream decoder trait for multi-format audio playback support.

use anyhow::{Result, bail};

use super::audio_system::AudioConfig;
use super::mp3_codec::Mp3Decoder;
use super::opus_codec::OpusDecoder;
use super::pcm;
use super::wav_codec::WavDecoder;

/// Decoded interleaved PCM together with the format it was produced in.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Interleaved samples remapped to `channels`. The rate is left alone.
    pub fn to_channels(&self, channels: usize) -> Vec<i16> {
        pcm::convert_channels(&self.samples, self.channels as usize, channels)
    }
}

/// A trait for audio stream decoders that turn one inbound fragment into
/// PCM. Resampling and channel conversion are left to the sink.
pub trait StreamDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio>;
}

/// Raw little-endian PCM16 at a fixed, configured format.
pub struct PcmDecoder {
    sample_rate: u32,
    channels: u16,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl StreamDecoder for PcmDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio> {
        if data.is_empty() {
            bail!("Empty PCM fragment");
        }
        if data.len() % 2 != 0 {
            bail!("PCM fragment has odd length {}", data.len());
        }
        let samples = data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(DecodedAudio {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

/// Factory function: create a decoder based on the configured stream format.
pub fn create_decoder(config: &AudioConfig) -> Result<Box<dyn StreamDecoder>> {
    let channels = u16::try_from(config.stream_channels)?;
    match config.stream_format.as_str() {
        "wav" => Ok(Box::new(WavDecoder)),
        "mp3" => Ok(Box::new(Mp3Decoder)),
        "pcm" => Ok(Box::new(PcmDecoder::new(config.stream_sample_rate, channels))),
        "opus" => Ok(Box::new(OpusDecoder::new(config.stream_sample_rate, channels)?)),
        other => bail!("Unsupported stream format: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_decoder_reads_le_samples() {
        let mut decoder = PcmDecoder::new(16000, 1);
        let audio = decoder.decode(&[0xff, 0x7f, 0x00, 0x80]).unwrap();
        assert_eq!(audio.samples, vec![32767, -32768]);
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.frames(), 2);
    }

    #[test]
    fn pcm_decoder_rejects_odd_and_empty() {
        let mut decoder = PcmDecoder::new(16000, 1);
        assert!(decoder.decode(&[1, 2, 3]).is_err());
        assert!(decoder.decode(&[]).is_err());
    }

    #[test]
    fn to_channels_upmixes_mono() {
        let audio = DecodedAudio {
            samples: vec![1, 2, 3],
            sample_rate: 16000,
            channels: 1,
        };
        assert_eq!(audio.to_channels(2), vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(audio.frames(), 3);
    }

    #[test]
    fn factory_rejects_unknown_format() {
        let config = AudioConfig {
            stream_format: "flac".to_string(),
            ..AudioConfig::default()
        };
        assert!(create_decoder(&config).is_err());
    }

    #[test]
    fn factory_builds_known_formats() {
        for format in ["wav", "mp3", "pcm"] {
            let config = AudioConfig {
                stream_format: format.to_string(),
                ..AudioConfig::default()
            };
            assert!(create_decoder(&config).is_ok(), "{}", format);
        }
    }
}
