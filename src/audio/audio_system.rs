//! ALSA-backed media backend.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks. Devices are opened per call and
//! released when the call's handles are dropped.

use anyhow::{Context, Result};

use super::device::{CaptureDevice, CaptureParams, MediaBackend, PlaybackChain};
use super::play::AlsaSink;
use super::record::AlsaCapture;
use super::stream_decoder::create_decoder;

/// Audio system configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Capture sample rate sent on the wire
    pub sample_rate: u32,
    /// Capture channel count requested from ALSA; only the first is sent
    pub channels: u32,
    /// 网络下发流的编码格式: "wav", "mp3", "pcm", "opus"
    pub stream_format: String,
    /// Sample rate of "pcm"/"opus" streams (containers carry their own)
    pub stream_sample_rate: u32,
    /// Channel count of "pcm"/"opus" streams
    pub stream_channels: u32,
    /// Desired ALSA playback sample rate
    pub playback_sample_rate: u32,
    /// Desired ALSA playback channel count
    pub playback_channels: u32,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            sample_rate: 16000,
            channels: 1,
            stream_format: "wav".to_string(),
            stream_sample_rate: 16000,
            stream_channels: 1,
            playback_sample_rate: 48000,
            playback_channels: 2,
            playback_period_size: 1024,
        }
    }
}

pub struct AlsaBackend {
    config: AudioConfig,
}

impl AlsaBackend {
    pub fn new(config: AudioConfig) -> Self {
        log::info!(
            "AudioSystem configured: capture: \"{}\", playback: \"{}\", rate: {}Hz, stream: {}",
            config.capture_device,
            config.playback_device,
            config.sample_rate,
            config.stream_format,
        );
        Self { config }
    }
}

impl MediaBackend for AlsaBackend {
    fn open_capture(&self, params: &CaptureParams) -> Result<Box<dyn CaptureDevice>> {
        Ok(Box::new(AlsaCapture::new(&self.config.capture_device, *params)))
    }

    fn open_playback(&self) -> Result<PlaybackChain> {
        let decoder = create_decoder(&self.config)?;
        let sink = AlsaSink::open(&self.config)
            .with_context(|| format!("Failed to open playback device '{}'", self.config.playback_device))?;
        Ok(PlaybackChain {
            decoder,
            sink: Box::new(sink),
        })
    }
}
