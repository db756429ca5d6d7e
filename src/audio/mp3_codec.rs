//! MP3 fragment decoder. A fragment may hold several MP3 frames; they are
//! concatenated.

use std::io::Cursor;

use anyhow::{Result, anyhow, bail};
use minimp3::{Decoder, Error as Mp3Error, Frame};

use super::stream_decoder::{DecodedAudio, StreamDecoder};

pub struct Mp3Decoder;

impl StreamDecoder for Mp3Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedAudio> {
        let mut decoder = Decoder::new(Cursor::new(data));
        let mut samples = Vec::new();
        let mut format: Option<(u32, u16)> = None;

        loop {
            match decoder.next_frame() {
                Ok(Frame {
                    data,
                    sample_rate,
                    channels,
                    ..
                }) => {
                    let frame_format = (sample_rate as u32, channels as u16);
                    match format {
                        None => format = Some(frame_format),
                        Some(f) if f != frame_format => {
                            log::warn!(
                                "MP3 fragment changes format mid-stream ({:?} -> {:?}), truncating",
                                f,
                                frame_format
                            );
                            break;
                        }
                        Some(_) => {}
                    }
                    samples.extend_from_slice(&data);
                }
                Err(Mp3Error::Eof) | Err(Mp3Error::InsufficientData) => break,
                Err(Mp3Error::SkippedData) => continue,
                Err(e) => return Err(anyhow!("MP3 decode error: {:?}", e)),
            }
        }

        let Some((sample_rate, channels)) = format else {
            bail!("No MP3 frames in fragment");
        };

        Ok(DecodedAudio {
            samples,
            sample_rate,
            channels,
        })
    }
}
