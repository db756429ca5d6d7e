use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::audio::AudioConfig;

#[derive(Debug, Clone)]
pub struct Config {
    // 网络配置
    pub ws_host: String,
    pub agent_id: String,
    pub access_token: String,

    // 通话参数
    pub context_data: BTreeMap<String, String>,
    pub audio_chunk_size: usize,
    pub queue_processing_interval_ms: u64,
    pub outbound_queue_size: usize,
    pub auto_start: bool,
    pub exit_on_hangup: bool,

    // GUI进程配置
    pub gui_local_port: u16,
    pub gui_remote_port: u16,

    // 音频设备与解码配置
    pub audio: AudioConfig,
}

/// Values that may be replaced at runtime, from `webcall.toml` in the
/// working directory or `WEBCALL_*` environment variables.
#[derive(Debug, Default, Deserialize)]
struct Overrides {
    ws_host: Option<String>,
    agent_id: Option<String>,
    access_token: Option<String>,
    audio_chunk_size: Option<usize>,
    queue_processing_interval_ms: Option<u64>,
    auto_start: Option<bool>,
    exit_on_hangup: Option<bool>,
    capture_device: Option<String>,
    playback_device: Option<String>,
    stream_format: Option<String>,
}

impl Config {
    /// 从编译时设置的环境变量创建配置，再叠加运行时覆盖项
    pub fn new() -> anyhow::Result<Self> {
        let mut config = Self::build_defaults()?;
        config.apply(load_overrides()?);
        Ok(config)
    }

    /// 所有默认参数都在编译时从 config.toml 中读取
    pub fn build_defaults() -> anyhow::Result<Self> {
        Ok(Self {
            ws_host: env!("WS_HOST").to_string(),
            agent_id: env!("AGENT_ID").to_string(),
            access_token: env!("ACCESS_TOKEN").to_string(),

            context_data: serde_json::from_str(env!("CONTEXT_DATA"))
                .context("Failed to parse CONTEXT_DATA")?,
            audio_chunk_size: env!("AUDIO_CHUNK_SIZE")
                .parse()
                .context("Failed to parse AUDIO_CHUNK_SIZE")?,
            queue_processing_interval_ms: env!("QUEUE_PROCESSING_INTERVAL_MS")
                .parse()
                .context("Failed to parse QUEUE_PROCESSING_INTERVAL_MS")?,
            outbound_queue_size: env!("OUTBOUND_QUEUE_SIZE")
                .parse()
                .context("Failed to parse OUTBOUND_QUEUE_SIZE")?,
            auto_start: env!("AUTO_START").parse().context("Failed to parse AUTO_START")?,
            exit_on_hangup: env!("EXIT_ON_HANGUP")
                .parse()
                .context("Failed to parse EXIT_ON_HANGUP")?,

            gui_local_port: env!("GUI_LOCAL_PORT")
                .parse()
                .context("Failed to parse GUI_LOCAL_PORT")?,
            gui_remote_port: env!("GUI_REMOTE_PORT")
                .parse()
                .context("Failed to parse GUI_REMOTE_PORT")?,

            audio: AudioConfig {
                capture_device: env!("CAPTURE_DEVICE").to_string(),
                playback_device: env!("PLAYBACK_DEVICE").to_string(),
                sample_rate: env!("CAPTURE_SAMPLE_RATE")
                    .parse()
                    .context("Failed to parse CAPTURE_SAMPLE_RATE")?,
                channels: env!("CAPTURE_CHANNELS")
                    .parse()
                    .context("Failed to parse CAPTURE_CHANNELS")?,
                stream_format: env!("STREAM_FORMAT").to_string(),
                stream_sample_rate: env!("STREAM_SAMPLE_RATE")
                    .parse()
                    .context("Failed to parse STREAM_SAMPLE_RATE")?,
                stream_channels: env!("STREAM_CHANNELS")
                    .parse()
                    .context("Failed to parse STREAM_CHANNELS")?,
                playback_sample_rate: env!("PLAYBACK_SAMPLE_RATE")
                    .parse()
                    .context("Failed to parse PLAYBACK_SAMPLE_RATE")?,
                playback_channels: env!("PLAYBACK_CHANNELS")
                    .parse()
                    .context("Failed to parse PLAYBACK_CHANNELS")?,
                playback_period_size: env!("PLAYBACK_PERIOD_SIZE")
                    .parse()
                    .context("Failed to parse PLAYBACK_PERIOD_SIZE")?,
            },
        })
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(v) = overrides.ws_host {
            self.ws_host = v;
        }
        if let Some(v) = overrides.agent_id {
            self.agent_id = v;
        }
        if let Some(v) = overrides.access_token {
            self.access_token = v;
        }
        if let Some(v) = overrides.audio_chunk_size {
            self.audio_chunk_size = v;
        }
        if let Some(v) = overrides.queue_processing_interval_ms {
            self.queue_processing_interval_ms = v;
        }
        if let Some(v) = overrides.auto_start {
            self.auto_start = v;
        }
        if let Some(v) = overrides.exit_on_hangup {
            self.exit_on_hangup = v;
        }
        if let Some(v) = overrides.capture_device {
            self.audio.capture_device = v;
        }
        if let Some(v) = overrides.playback_device {
            self.audio.playback_device = v;
        }
        if let Some(v) = overrides.stream_format {
            self.audio.stream_format = v;
        }
    }
}

fn load_overrides() -> anyhow::Result<Overrides> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::with_name("webcall").required(false))
        .add_source(::config::Environment::with_prefix("WEBCALL").try_parsing(true))
        .build()
        .context("Failed to load runtime configuration")?;
    settings
        .try_deserialize()
        .context("Invalid runtime configuration")
}

/// Builds the web-call endpoint for an agent:
/// `{host}/web-call/v1/{agent_id}?auth_token=..&user_agent=web-call&enforce_streaming=true`
pub fn call_url(ws_host: &str, agent_id: &str, access_token: &str) -> Result<Url, url::ParseError> {
    let base = format!("{}/web-call/v1/{}", ws_host.trim_end_matches('/'), agent_id);
    let mut url = Url::parse(&base)?;
    url.query_pairs_mut()
        .append_pair("auth_token", access_token)
        .append_pair("user_agent", "web-call")
        .append_pair("enforce_streaming", "true");
    Ok(url)
}
