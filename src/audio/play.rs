use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::alsa_device::PcmRequest;
use super::audio_system::AudioConfig;
use super::device::AudioSink;
use super::resample::StreamResampler;
use super::stream_decoder::DecodedAudio;

// Source frames per resampler pass
const RESAMPLE_CHUNK: usize = 256;

struct RenderJob {
    audio: DecodedAudio,
    epoch: u64,
    done: oneshot::Sender<()>,
}

/// Speaker output on a dedicated OS thread.
///
/// `stop()` bumps an epoch that the thread checks between period writes;
/// a job from an older epoch is dropped and the hardware buffer discarded.
pub struct AlsaSink {
    jobs: Option<mpsc::Sender<RenderJob>>,
    stop_epoch: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl AlsaSink {
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<RenderJob>(1);
        let stop_epoch = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let handle = {
            let config = config.clone();
            let stop_epoch = stop_epoch.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(&config, job_rx, &stop_epoch, ready_tx) {
                        log::error!("Playback thread error: {:#}", e);
                    }
                })?
        };

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("Playback thread exited before opening the device")));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            jobs: Some(job_tx),
            stop_epoch,
            handle: Some(handle),
        })
    }
}

#[async_trait]
impl AudioSink for AlsaSink {
    async fn play(&mut self, audio: DecodedAudio) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("Playback thread stopped"))?;
        let (done_tx, done_rx) = oneshot::channel();
        let job = RenderJob {
            audio,
            epoch: self.stop_epoch.load(Ordering::SeqCst),
            done: done_tx,
        };
        jobs.send(job)
            .await
            .map_err(|_| anyhow!("Playback thread stopped"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("Render abandoned by playback thread"))
    }

    fn stop(&mut self) {
        self.stop_epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for AlsaSink {
    fn drop(&mut self) {
        self.stop();
        // Playback thread exits once the job sender is dropped.
        self.jobs.take();
        if let Some(h) = self.handle.take() {
            // 在异步上下文中不阻塞 worker
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn_blocking(move || {
                        let _ = h.join();
                    });
                }
                Err(_) => {
                    let _ = h.join();
                }
            }
        }
    }
}

fn play_thread(
    config: &AudioConfig,
    mut job_rx: mpsc::Receiver<RenderJob>,
    stop_epoch: &AtomicU64,
    ready: std_mpsc::Sender<Result<()>>,
) -> Result<()> {
    // 1. Open ALSA playback device with configurable sample rate, channels, and period size
    let request = PcmRequest {
        device: &config.playback_device,
        rate: config.playback_sample_rate,
        channels: config.playback_channels,
        period: (config.playback_period_size > 0).then_some(config.playback_period_size),
    };
    let (pcm, params) = match request.open_playback() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready.send(Err(anyhow!("Playback device has no i16 I/O: {}", e)));
            return Ok(());
        }
    };
    let _ = ready.send(Ok(()));

    let actual_rate = params.rate;
    let actual_channels = params.channels.max(1) as usize;
    let chunk_frames = params.period.max(1);
    // 片段之间保持状态，打断后重置
    let mut resampler: Option<StreamResampler> = None;
    let mut resampler_epoch = stop_epoch.load(Ordering::SeqCst);

    log::info!(
        "Playback started: stream_format={}, rate={}, ch={}, period={}",
        config.stream_format,
        actual_rate,
        actual_channels,
        chunk_frames,
    );

    // Block until we receive a render job (or channel closes)
    while let Some(job) = job_rx.blocking_recv() {
        if job.epoch != stop_epoch.load(Ordering::SeqCst) {
            continue;
        }

        if job.epoch != resampler_epoch {
            if let Some(resampler) = resampler.as_mut() {
                resampler.reset();
            }
            resampler_epoch = job.epoch;
        }

        log::debug!(
            "Rendering {} frames at {}Hz x{}",
            job.audio.frames(),
            job.audio.sample_rate,
            job.audio.channels
        );
        let pcm_data = match to_device_pcm(&job.audio, actual_rate, actual_channels, &mut resampler) {
            Ok(data) => data,
            Err(e) => {
                // done 被丢弃，play() 返回错误
                log::warn!("Cannot convert fragment for the device: {:#}", e);
                continue;
            }
        };
        let total_frames = pcm_data.len() / actual_channels;
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        let mut interrupted = false;

        while frames_written < total_frames {
            if job.epoch != stop_epoch.load(Ordering::SeqCst) {
                // 打断：丢弃已写入硬件缓冲区但尚未播放的数据
                if let Err(e) = pcm.drop() {
                    log::warn!("Failed to drop playback buffer: {}", e);
                }
                if let Err(e) = pcm.prepare() {
                    log::error!("Failed to prepare PCM after interrupt: {}", e);
                }
                interrupted = true;
                break;
            }

            let end = (frames_written + chunk_frames).min(total_frames);
            let chunk = &pcm_data[frames_written * actual_channels..end * actual_channels];
            match io.writei(chunk) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;

                    // 触发 ALSA 硬件恢复状态机
                    if let Err(e2) = pcm.prepare() {
                        log::error!("Failed to recover PCM playback: {}", e2);
                        break;
                    }

                    // 熔断器：底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            total_frames - frames_written
                        );
                        break;
                    }
                }
            }
        }

        if !interrupted {
            let _ = job.done.send(());
        }
    }

    log::info!("Playback stopped");
    Ok(())
}

fn to_device_pcm(
    audio: &DecodedAudio,
    rate: u32,
    channels: usize,
    resampler: &mut Option<StreamResampler>,
) -> Result<Vec<i16>> {
    let mapped = audio.to_channels(channels);
    if audio.sample_rate == rate {
        return Ok(mapped);
    }
    if let Some(current) = resampler.as_mut().filter(|r| r.converts(audio.sample_rate, rate, channels)) {
        return current.process_pcm16(&mapped);
    }
    log::info!("Resampling playback {}Hz -> {}Hz", audio.sample_rate, rate);
    let fresh = resampler.insert(StreamResampler::new(audio.sample_rate, rate, channels, RESAMPLE_CHUNK)?);
    fresh.process_pcm16(&mapped)
}
