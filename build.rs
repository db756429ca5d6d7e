use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    network: Network,
    call: Call,
    audio: Audio,
    gui: Gui,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Network {
    ws_host: String,
    agent_id: String,
    access_token: String,
}

#[derive(Deserialize)]
struct Call {
    audio_chunk_size: usize,
    queue_processing_interval_ms: u64,
    outbound_queue_size: usize,
    auto_start: bool,
    exit_on_hangup: bool,
    #[serde(default)]
    context_data: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    channels: u32,
    stream_format: String,
    stream_sample_rate: u32,
    stream_channels: u32,
    playback_sample_rate: u32,
    playback_channels: u32,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Gui {
    local_port: u16,
    remote_port: u16,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 网络配置
    println!("cargo:rustc-env=WS_HOST={}", config.network.ws_host);
    println!("cargo:rustc-env=AGENT_ID={}", config.network.agent_id);
    println!("cargo:rustc-env=ACCESS_TOKEN={}", config.network.access_token);

    // 通话配置
    println!("cargo:rustc-env=AUDIO_CHUNK_SIZE={}", config.call.audio_chunk_size);
    println!(
        "cargo:rustc-env=QUEUE_PROCESSING_INTERVAL_MS={}",
        config.call.queue_processing_interval_ms
    );
    println!("cargo:rustc-env=OUTBOUND_QUEUE_SIZE={}", config.call.outbound_queue_size);
    println!("cargo:rustc-env=AUTO_START={}", config.call.auto_start);
    println!("cargo:rustc-env=EXIT_ON_HANGUP={}", config.call.exit_on_hangup);
    // context_data 以 JSON 字符串形式传递
    let context_json =
        serde_json::to_string(&config.call.context_data).expect("Failed to encode context_data");
    println!("cargo:rustc-env=CONTEXT_DATA={}", context_json);

    // 音频配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=CAPTURE_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CAPTURE_CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=STREAM_FORMAT={}", config.audio.stream_format);
    println!("cargo:rustc-env=STREAM_SAMPLE_RATE={}", config.audio.stream_sample_rate);
    println!("cargo:rustc-env=STREAM_CHANNELS={}", config.audio.stream_channels);
    println!("cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}", config.audio.playback_sample_rate);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.audio.playback_channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);

    // GUI 配置
    println!("cargo:rustc-env=GUI_LOCAL_PORT={}", config.gui.local_port);
    println!("cargo:rustc-env=GUI_REMOTE_PORT={}", config.gui.remote_port);
}
