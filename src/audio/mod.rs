//! audio - Audio capture, playback, and codec library
//!
//! ALSA for audio I/O on dedicated threads, with decoders for the fragment
//! formats a voice agent may stream (WAV, MP3, raw PCM16, Opus) and the
//! PCM16/base64 encoding used for microphone frames.

mod alsa_device;
mod audio_system;
pub mod device;
mod mp3_codec;
mod opus_codec;
pub mod pcm;
mod play;
mod record;
mod resample;
pub mod stream_decoder;
mod wav_codec;

pub use audio_system::{AlsaBackend, AudioConfig};
pub use device::{AudioSink, CaptureDevice, CaptureParams, FrameCallback, MediaBackend, PlaybackChain};
pub use mp3_codec::Mp3Decoder;
pub use opus_codec::OpusDecoder;
pub use play::AlsaSink;
pub use record::AlsaCapture;
pub use resample::StreamResampler;
pub use stream_decoder::{DecodedAudio, PcmDecoder, StreamDecoder, create_decoder};
pub use wav_codec::WavDecoder;
