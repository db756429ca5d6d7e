use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audio::{CaptureDevice, CaptureParams, MediaBackend, PlaybackChain};
use crate::capture::CapturePipeline;
use crate::config::{self, Config};
use crate::error::{CallError, ErrorKind};
use crate::events::CallObserver;
use crate::playback::{PlaybackEvent, PlaybackQueue, PlaybackScheduler};
use crate::protocol::{self, ContextData, ServerMessage};
use crate::state_machine::{CallGate, CallState};
use crate::transport::{NetCommand, NetEvent, Transport};

const EVENT_CHANNEL_SIZE: usize = 64;
const SCHEDULER_GRACE: Duration = Duration::from_secs(2);

/// Everything a call attempt needs that does not change between calls.
#[derive(Debug, Clone)]
pub struct CallSettings {
    pub ws_host: String,
    pub agent_id: String,
    pub access_token: String,
    pub context_data: ContextData,
    pub capture: CaptureParams,
    pub poll_interval: Duration,
    pub outbound_capacity: usize,
}

impl CallSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ws_host: config.ws_host.clone(),
            agent_id: config.agent_id.clone(),
            access_token: config.access_token.clone(),
            context_data: config.context_data.clone(),
            capture: CaptureParams {
                sample_rate: config.audio.sample_rate,
                channels: config.audio.channels,
                frame_size: config.audio_chunk_size,
            },
            poll_interval: Duration::from_millis(config.queue_processing_interval_ms),
            outbound_capacity: config.outbound_queue_size,
        }
    }
}

/// Per-call resources. Dropped as a unit at teardown.
struct ActiveCall {
    id: Uuid,
    gate: Arc<CallGate>,
    queue: Arc<PlaybackQueue>,
    capture: Option<Box<dyn CaptureDevice>>,
    commands: mpsc::Sender<NetCommand>,
    events: mpsc::Receiver<NetEvent>,
    hangup: Option<oneshot::Sender<()>>,
    // 连接建立后交给播放循环
    playback: Option<PlaybackChain>,
    scheduler: Option<JoinHandle<()>>,
}

/// One voice call at a time against a remote agent.
///
/// The host drives the session: call `initiate_call`, then feed
/// `next_event` into `handle_net_event` (or use `run_until_ended`) from its
/// own loop, and call `end_call` to hang up.
pub struct CallSession {
    settings: CallSettings,
    transport: Arc<dyn Transport>,
    media: Arc<dyn MediaBackend>,
    observer: Arc<dyn CallObserver>,
    state: CallState,
    first_audio_seen: bool,
    call: Option<ActiveCall>,
}

impl CallSession {
    pub fn new(
        settings: CallSettings,
        transport: Arc<dyn Transport>,
        media: Arc<dyn MediaBackend>,
        observer: Arc<dyn CallObserver>,
    ) -> Self {
        Self {
            settings,
            transport,
            media,
            observer,
            state: CallState::Idle,
            first_audio_seen: false,
            call: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_call_active(&self) -> bool {
        self.state.is_in_progress()
    }

    /// True once the first playback audio of this call has arrived.
    pub fn is_connected(&self) -> bool {
        self.first_audio_seen
    }

    pub fn pending_playback(&self) -> usize {
        self.call.as_ref().map_or(0, |call| call.queue.len())
    }

    pub async fn initiate_call(&mut self) -> Result<(), CallError> {
        if self.state.is_in_progress() {
            log::info!("Call already in progress");
            return Err(CallError::AlreadyInProgress);
        }

        let id = Uuid::new_v4();
        self.state = CallState::AwaitingAck;
        self.first_audio_seen = false;
        self.observer.on_call_state_change(true);

        let url = match config::call_url(&self.settings.ws_host, &self.settings.agent_id, &self.settings.access_token) {
            Ok(url) => url,
            Err(e) => return Err(self.abort_attempt(id, CallError::Transport(format!("Invalid call URL: {}", e)))),
        };
        log::info!("[{}] Starting call to agent {}", id, self.settings.agent_id);

        let gate = Arc::new(CallGate::new());
        let queue = Arc::new(PlaybackQueue::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(self.settings.outbound_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (hangup_tx, hangup_rx) = oneshot::channel();

        // 打开设备会阻塞，放到 blocking 线程池
        let media = self.media.clone();
        let params = self.settings.capture;
        let pipeline = CapturePipeline::new(gate.clone(), cmd_tx.clone());
        let opened = tokio::task::spawn_blocking(move || open_devices(media.as_ref(), &params, pipeline)).await;
        let (capture, playback) = match opened {
            Ok(Ok(devices)) => devices,
            Ok(Err(e)) => return Err(self.abort_attempt(id, CallError::MicrophoneAccess(format!("{:#}", e)))),
            Err(e) => {
                let error = CallError::MicrophoneAccess(format!("Device open task failed: {}", e));
                return Err(self.abort_attempt(id, error));
            }
        };
        self.observer.on_media_permission_granted();

        self.call = Some(ActiveCall {
            id,
            gate,
            queue,
            capture: Some(capture),
            commands: cmd_tx,
            events: event_rx,
            hangup: Some(hangup_tx),
            playback: Some(playback),
            scheduler: None,
        });

        if let Err(e) = self.transport.open(&url, cmd_rx, event_tx, hangup_rx) {
            let error = CallError::Transport(format!("{:#}", e));
            log::error!("[{}] Failed to open transport: {}", id, error);
            self.observer.on_error(ErrorKind::Websocket, &error.to_string());
            self.teardown().await;
            return Err(error);
        }
        Ok(())
    }

    /// Hangs up. Does nothing when no call is in progress.
    pub async fn end_call(&mut self) {
        if let Some(call) = &self.call {
            log::info!("[{}] Call ended by host", call.id);
        }
        self.teardown().await;
    }

    /// Next transport event of the current call. Never resolves while no call
    /// is in progress, so it can sit in a `select!` next to other sources.
    pub async fn next_event(&mut self) -> NetEvent {
        match self.call.as_mut() {
            Some(call) => call.events.recv().await.unwrap_or(NetEvent::Disconnected),
            None => std::future::pending().await,
        }
    }

    pub async fn run_until_ended(&mut self) {
        while self.call.is_some() {
            let event = self.next_event().await;
            self.handle_net_event(event).await;
        }
    }

    pub async fn handle_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Connected => self.on_connected().await,
            NetEvent::Text(text) => self.on_message(&text),
            NetEvent::Error(detail) => {
                if let Some(call) = &self.call {
                    log::error!("[{}] Web call websocket error: {}", call.id, detail);
                    self.observer.on_error(ErrorKind::Websocket, &detail);
                }
                self.teardown().await;
            }
            NetEvent::Disconnected => {
                if let Some(call) = &self.call {
                    log::info!("[{}] Websocket closed", call.id);
                }
                self.teardown().await;
            }
        }
    }

    async fn on_connected(&mut self) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.gate.is_transport_open() {
            log::debug!("[{}] Duplicate connected event ignored", call.id);
            return;
        }
        log::info!("[{}] WebSocket connected", call.id);
        call.gate.set_transport_open(true);

        if let Some(chain) = call.playback.take() {
            let scheduler = PlaybackScheduler::new(
                call.queue.clone(),
                call.gate.clone(),
                chain,
                call.commands.clone(),
                self.observer.clone(),
                self.settings.poll_interval,
            );
            call.scheduler = Some(tokio::spawn(scheduler.run()));
        }

        match protocol::init_packet(&self.settings.context_data) {
            Ok(packet) => {
                if call.commands.send(NetCommand::SendText(packet)).await.is_err() {
                    log::warn!("[{}] Transport gone before init packet", call.id);
                }
            }
            Err(e) => log::error!("[{}] Failed to serialise init packet: {}", call.id, e),
        }
    }

    fn on_message(&mut self, text: &str) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("[{}] Dropping malformed message: {}", call.id, e);
                return;
            }
        };

        if !call.gate.is_ack_received() && message != ServerMessage::Ack {
            log::debug!("[{}] Acknowledgement not received yet, dropping {}", call.id, message.kind());
            return;
        }

        match message {
            ServerMessage::Ack => {
                if call.gate.acknowledge() {
                    log::info!("[{}] Acknowledgement received", call.id);
                    self.state = CallState::Active;
                }
            }
            ServerMessage::Audio { data } => {
                call.queue.enqueue(PlaybackEvent::Audio(data));
                if !self.first_audio_seen {
                    self.first_audio_seen = true;
                    self.observer.on_first_audio_packet();
                }
            }
            ServerMessage::Mark(payload) => call.queue.enqueue(PlaybackEvent::Mark(payload)),
            ServerMessage::Clear => {
                let discarded = call.queue.clear();
                log::info!("[{}] Clear received, discarded {} queued events", call.id, discarded);
            }
            ServerMessage::Other(kind) => {
                log::debug!("[{}] Ignoring message type {}", call.id, kind);
            }
        }
    }

    /// Failure before any per-call resources were stored.
    fn abort_attempt(&mut self, id: Uuid, error: CallError) -> CallError {
        log::error!("[{}] Call setup failed: {}", id, error);
        if let Some(kind) = error.kind() {
            self.observer.on_error(kind, &error.to_string());
        }
        self.state = CallState::Ended;
        self.observer.on_call_state_change(false);
        error
    }

    /// Shared by every exit path.
    async fn teardown(&mut self) {
        let Some(mut call) = self.call.take() else {
            return;
        };

        call.gate.close();
        call.queue.clear();
        call.queue.wake();
        if let Some(mut capture) = call.capture.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
                log::warn!("[{}] Capture stop task failed: {}", call.id, e);
            }
        }
        if let Some(hangup) = call.hangup.take() {
            if hangup.send(()).is_err() {
                log::debug!("[{}] Transport already gone", call.id);
            }
        }

        if let Some(mut handle) = call.scheduler.take() {
            if tokio::time::timeout(SCHEDULER_GRACE, &mut handle).await.is_err() {
                log::warn!("[{}] Playback loop did not stop in time, aborting", call.id);
                handle.abort();
            }
        }
        log::info!("[{}] Call torn down", call.id);
        drop(call);

        self.first_audio_seen = false;
        self.state = CallState::Ended;
        self.observer.on_call_state_change(false);
    }
}

/// Microphone first (already gated), then the playback chain.
fn open_devices(
    media: &dyn MediaBackend,
    params: &CaptureParams,
    pipeline: CapturePipeline,
) -> anyhow::Result<(Box<dyn CaptureDevice>, PlaybackChain)> {
    let mut capture = media.open_capture(params)?;
    if let Err(e) = capture.start(pipeline.into_callback()) {
        capture.stop();
        return Err(e);
    }
    match media.open_playback() {
        Ok(playback) => Ok((capture, playback)),
        Err(e) => {
            capture.stop();
            Err(e)
        }
    }
}
