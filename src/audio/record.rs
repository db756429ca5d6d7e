use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow, bail};

use super::alsa_device::PcmRequest;
use super::device::{CaptureDevice, CaptureParams, FrameCallback};
use super::resample::StreamResampler;

/// Microphone capture on a dedicated OS thread.
///
/// The thread reads float periods from ALSA, keeps the first channel,
/// resamples to the requested rate if the hardware negotiated another one,
/// and hands fixed-size frames to the callback.
pub struct AlsaCapture {
    device: String,
    params: CaptureParams,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AlsaCapture {
    pub fn new(device: &str, params: CaptureParams) -> Self {
        Self {
            device: device.to_string(),
            params,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl CaptureDevice for AlsaCapture {
    fn start(&mut self, on_frame: FrameCallback) -> Result<()> {
        if self.handle.is_some() {
            bail!("Capture already started");
        }
        self.running.store(true, Ordering::SeqCst);

        // 设备打开结果同步返回，权限/设备错误在 start() 中直接暴露
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let handle = {
            let running = self.running.clone();
            let device = self.device.clone();
            let params = self.params;
            thread::Builder::new()
                .name("audio-record".into())
                .spawn(move || {
                    if let Err(e) = record_thread(&device, params, on_frame, &running, ready_tx) {
                        log::error!("Recording thread error: {:#}", e);
                    }
                })?
        };

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("Recording thread exited before opening the device")));
        match ready {
            Ok(()) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
            log::info!("Capture device released");
        }
    }
}

impl Drop for AlsaCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_thread(
    device: &str,
    params: CaptureParams,
    mut on_frame: FrameCallback,
    running: &AtomicBool,
    ready: std_mpsc::Sender<Result<()>>,
) -> Result<()> {
    // 1. Open ALSA capture device
    let request = PcmRequest {
        device,
        rate: params.sample_rate,
        channels: params.channels,
        period: None,
    };
    let (pcm, negotiated) = match request.open_capture() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };
    let io = match pcm.io_f32() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready.send(Err(anyhow!("Capture device has no float I/O: {}", e)));
            return Ok(());
        }
    };

    let actual_rate = negotiated.rate;
    let actual_channels = negotiated.channels.max(1) as usize;
    let period_size = negotiated.period.max(1);
    let frame_size = params.frame_size.max(1);

    // 2. 采样率不一致时整个采集期间共用一个重采样器
    let mut resampler = if actual_rate == params.sample_rate {
        None
    } else {
        match StreamResampler::new(actual_rate, params.sample_rate, 1, period_size) {
            Ok(resampler) => {
                log::warn!(
                    "Capture rate negotiated at {}Hz, resampling to {}Hz",
                    actual_rate,
                    params.sample_rate
                );
                Some(resampler)
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return Ok(());
            }
        }
    };
    let _ = ready.send(Ok(()));

    // ALSA read buffer (interleaved f32, one period)
    let mut read_buf = vec![0f32; period_size * actual_channels];
    let mut mono: Vec<f32> = Vec::with_capacity(period_size);
    // Accumulation buffer until one full frame is available
    let mut accum_buf: Vec<f32> = Vec::with_capacity(frame_size * 2);

    log::info!(
        "Recording started: rate={}, ch={}, period={}, frame_size={}",
        actual_rate,
        actual_channels,
        period_size,
        frame_size,
    );

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                mono.clear();
                mono.extend((0..frames).map(|i| read_buf[i * actual_channels]));

                match resampler.as_mut() {
                    Some(resampler) => {
                        if let Err(e) = resampler.process_into(&mono, &mut accum_buf) {
                            log::error!("Capture resampling failed: {:#}", e);
                            break;
                        }
                    }
                    None => accum_buf.extend_from_slice(&mono),
                }

                while accum_buf.len() >= frame_size {
                    on_frame(&accum_buf[..frame_size]);
                    accum_buf.drain(..frame_size);
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
                // 溢出后输入不连续
                if let Some(resampler) = resampler.as_mut() {
                    resampler.reset();
                }
            }
        }
    }

    log::info!("Recording stopped");
    Ok(())
}
