//! Streaming sample-rate conversion.
//!
//! One `StreamResampler` lives as long as the stream it converts (a capture
//! session or a playback sink). Input is buffered across calls so period and
//! fragment boundaries never reach the filter.

use anyhow::{Result, anyhow, bail};
use rubato::{FftFixedIn, Resampler};

use super::pcm;

pub struct StreamResampler {
    inner: FftFixedIn<f32>,
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    // 按声道拆开的待处理输入
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// * `chunk_size` - input frames per filter pass, latency is about one chunk
    pub fn new(from_rate: u32, to_rate: u32, channels: usize, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            bail!("Invalid resampling rates {}Hz -> {}Hz", from_rate, to_rate);
        }
        let channels = channels.max(1);
        let chunk_size = chunk_size.max(1);
        let inner = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 1, channels)
            .map_err(|e| anyhow!("Resampler init failed ({}Hz -> {}Hz): {}", from_rate, to_rate, e))?;
        Ok(Self {
            inner,
            from_rate,
            to_rate,
            channels,
            pending: vec![Vec::with_capacity(chunk_size * 2); channels],
        })
    }

    pub fn converts(&self, from_rate: u32, to_rate: u32, channels: usize) -> bool {
        self.from_rate == from_rate && self.to_rate == to_rate && self.channels == channels
    }

    /// Feeds interleaved samples and appends every output frame that is ready.
    pub fn process_into(&mut self, interleaved: &[f32], out: &mut Vec<f32>) -> Result<()> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (lane, &sample) in self.pending.iter_mut().zip(frame) {
                lane.push(sample);
            }
        }

        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                return Ok(());
            }
            let chunk: Vec<&[f32]> = self.pending.iter().map(|lane| &lane[..needed]).collect();
            let resampled = self
                .inner
                .process(&chunk, None)
                .map_err(|e| anyhow!("Resampling failed: {}", e))?;
            for lane in &mut self.pending {
                lane.drain(..needed);
            }

            let frames = resampled.first().map_or(0, Vec::len);
            out.reserve(frames * self.channels);
            for i in 0..frames {
                out.extend(resampled.iter().map(|lane| lane[i]));
            }
        }
    }

    pub fn process_pcm16(&mut self, samples: &[i16]) -> Result<Vec<i16>> {
        let mut out = Vec::new();
        self.process_into(&pcm::pcm16_to_float(samples), &mut out)?;
        Ok(pcm::float_to_pcm16(&out))
    }

    /// Forgets buffered input and filter history, e.g. after an interrupt.
    pub fn reset(&mut self) {
        self.inner.reset();
        for lane in &mut self.pending {
            lane.clear();
        }
    }
}
