//! Narrow interfaces over the audio hardware, so the call logic can run
//! against ALSA or against scripted fakes.

use anyhow::Result;
use async_trait::async_trait;

use super::stream_decoder::{DecodedAudio, StreamDecoder};

/// Invoked on the capture thread with one fixed-size block of mono samples.
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Format the capture device must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate: u32,
    pub channels: u32,
    /// Samples per frame handed to the callback.
    pub frame_size: usize,
}

pub trait CaptureDevice: Send {
    /// Starts delivering frames. Fails if the microphone cannot be opened.
    fn start(&mut self, on_frame: FrameCallback) -> Result<()>;

    /// Stops capture and releases the device. Safe to call more than once.
    fn stop(&mut self);
}

#[async_trait]
pub trait AudioSink: Send {
    /// Plays one decoded fragment, resolving when it has been rendered.
    /// The future may be dropped part way through, followed by `stop`.
    async fn play(&mut self, audio: DecodedAudio) -> Result<()>;

    /// Halts whatever is currently playing.
    fn stop(&mut self);
}

/// Decoder and output device used by one call's playback loop.
pub struct PlaybackChain {
    pub decoder: Box<dyn StreamDecoder>,
    pub sink: Box<dyn AudioSink>,
}

/// Opens per-call audio resources.
pub trait MediaBackend: Send + Sync {
    fn open_capture(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>>;

    fn open_playback(&self) -> Result<PlaybackChain>;
}
