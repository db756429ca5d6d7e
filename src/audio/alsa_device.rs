//! Opening the call's ALSA microphone and speaker.

use alsa::pcm::{Access, Format, Frames, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

/// What the hardware agreed to after negotiation.
#[derive(Debug, Clone, Copy)]
pub struct Negotiated {
    pub rate: u32,
    pub channels: u32,
    /// Frames per period
    pub period: usize,
}

/// Desired stream shape. ALSA may settle on a nearby rate or period.
#[derive(Debug, Clone, Copy)]
pub struct PcmRequest<'a> {
    pub device: &'a str,
    pub rate: u32,
    pub channels: u32,
    pub period: Option<usize>,
}

impl PcmRequest<'_> {
    /// Microphone side, float samples.
    pub fn open_capture(&self) -> Result<(PCM, Negotiated)> {
        self.open(Direction::Capture, Format::FloatLE)
    }

    /// Speaker side, 16-bit samples.
    pub fn open_playback(&self) -> Result<(PCM, Negotiated)> {
        self.open(Direction::Playback, Format::S16LE)
    }

    fn open(&self, direction: Direction, format: Format) -> Result<(PCM, Negotiated)> {
        let side = match direction {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        };
        let pcm = PCM::new(self.device, direction, false)
            .with_context(|| format!("Cannot open {} device '{}'", side, self.device))?;
        self.configure(&pcm, format)
            .with_context(|| format!("Cannot configure {} device '{}'", side, self.device))?;

        let hwp = pcm.hw_params_current()?;
        let negotiated = Negotiated {
            rate: hwp.get_rate()?,
            channels: hwp.get_channels()?,
            period: hwp.get_period_size()? as usize,
        };
        drop(hwp);

        if negotiated.rate != self.rate || negotiated.channels != self.channels {
            log::warn!(
                "ALSA {} '{}' asked for {}Hz x{}, got {}Hz x{}",
                side,
                self.device,
                self.rate,
                self.channels,
                negotiated.rate,
                negotiated.channels,
            );
        }
        log::info!(
            "ALSA {} '{}' ready: {}Hz x{}, period {} frames",
            side,
            self.device,
            negotiated.rate,
            negotiated.channels,
            negotiated.period,
        );
        Ok((pcm, negotiated))
    }

    fn configure(&self, pcm: &PCM, format: Format) -> Result<()> {
        let hwp = HwParams::any(pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(format)
            .with_context(|| format!("Sample format {:?} rejected", format))?;
        hwp.set_channels(self.channels)?;
        hwp.set_rate_near(self.rate, ValueOr::Nearest)?;
        if let Some(period) = self.period {
            hwp.set_period_size_near(period as Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(period: Option<usize>) -> PcmRequest<'static> {
        PcmRequest {
            device: "webcall_no_such_pcm",
            rate: 16000,
            channels: 1,
            period,
        }
    }

    #[test]
    fn unknown_device_names_the_side() {
        let Err(err) = missing(None).open_capture() else {
            panic!("capture opened a missing device");
        };
        assert!(format!("{:#}", err).contains("capture device 'webcall_no_such_pcm'"));

        let Err(err) = missing(Some(512)).open_playback() else {
            panic!("playback opened a missing device");
        };
        assert!(format!("{:#}", err).contains("playback device 'webcall_no_such_pcm'"));
    }
}
