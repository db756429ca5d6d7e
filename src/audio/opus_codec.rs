//! Opus decoder for agents that stream one Opus packet per audio message.

use anyhow::{Context, Result, bail};

use super::stream_decoder::{DecodedAudio, StreamDecoder};

// Max 120ms @ 48kHz = 5760 samples/channel
const MAX_FRAME_SIZE: usize = 5760;

pub struct OpusDecoder {
    decoder: opus::Decoder,
    sample_rate: u32,
    channels: u16,
}

impl OpusDecoder {
    /// * `sample_rate` - Opus stream sample rate (8000, 12000, 16000, 24000 or 48000)
    /// * `channels`    - Opus stream channels (1 or 2)
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        let opus_channels = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            n => bail!("Opus supports 1 or 2 channels, got {}", n),
        };
        let decoder = opus::Decoder::new(sample_rate, opus_channels)
            .with_context(|| format!("Failed to create Opus decoder at {}Hz", sample_rate))?;
        Ok(Self {
            decoder,
            sample_rate,
            channels,
        })
    }
}

impl StreamDecoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio> {
        if data.is_empty() {
            bail!("Empty Opus packet");
        }
        let mut pcm_buf = vec![0i16; MAX_FRAME_SIZE * self.channels as usize];
        let decoded_samples_per_ch = self
            .decoder
            .decode(data, &mut pcm_buf, false)
            .context("Opus decode failed")?;
        pcm_buf.truncate(decoded_samples_per_ch * self.channels as usize);

        Ok(DecodedAudio {
            samples: pcm_buf,
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_channel_count() {
        assert!(OpusDecoder::new(16000, 3).is_err());
    }

    #[test]
    fn round_trips_an_encoded_packet() {
        let mut encoder =
            opus::Encoder::new(16000, opus::Channels::Mono, opus::Application::Voip).unwrap();
        let frame = vec![0i16; 320]; // 20ms @ 16kHz
        let mut packet = vec![0u8; 4000];
        let len = encoder.encode(&frame, &mut packet).unwrap();
        packet.truncate(len);

        let mut decoder = OpusDecoder::new(16000, 1).unwrap();
        let audio = decoder.decode(&packet).unwrap();
        assert_eq!(audio.samples.len(), 320);
        assert_eq!(audio.sample_rate, 16000);
    }
}
