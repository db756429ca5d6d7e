use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::queue::{PlaybackEvent, PlaybackQueue};
use crate::audio::pcm;
use crate::audio::{AudioSink, PlaybackChain, StreamDecoder};
use crate::error::{CallError, ErrorKind};
use crate::events::CallObserver;
use crate::state_machine::CallGate;
use crate::transport::NetCommand;

/// Drains a call's playback queue, one event at a time.
///
/// Each audio fragment is decoded and rendered to completion before the next
/// event is taken, unless a `clear` bumps the queue epoch, in which case the
/// render is dropped and the sink stopped. The loop ends once the queue is
/// empty and the transport has closed.
pub struct PlaybackScheduler {
    queue: Arc<PlaybackQueue>,
    gate: Arc<CallGate>,
    decoder: Box<dyn StreamDecoder>,
    sink: Box<dyn AudioSink>,
    outbound: mpsc::Sender<NetCommand>,
    observer: Arc<dyn CallObserver>,
    poll_interval: Duration,
}

impl PlaybackScheduler {
    pub fn new(
        queue: Arc<PlaybackQueue>,
        gate: Arc<CallGate>,
        chain: PlaybackChain,
        outbound: mpsc::Sender<NetCommand>,
        observer: Arc<dyn CallObserver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            gate,
            decoder: chain.decoder,
            sink: chain.sink,
            outbound,
            observer,
            poll_interval,
        }
    }

    pub async fn run(mut self) {
        let mut interrupts = self.queue.subscribe();
        log::info!("Playback loop started");

        loop {
            if let Some((event, epoch)) = self.queue.dequeue() {
                match event {
                    PlaybackEvent::Audio(data) => self.play_fragment(&data, epoch, &mut interrupts).await,
                    PlaybackEvent::Mark(payload) => self.echo_mark(payload).await,
                }
                continue;
            }

            if !self.gate.is_transport_open() {
                break;
            }
            self.queue.wait(self.poll_interval).await;
        }

        self.sink.stop();
        log::info!("Playback loop finished");
    }

    async fn play_fragment(&mut self, data: &str, epoch: u64, interrupts: &mut watch::Receiver<u64>) {
        let audio = match self.decode(data) {
            Ok(audio) => audio,
            Err(e) => {
                let error = CallError::PlaybackDecode(format!("{:#}", e));
                log::warn!("Skipping fragment: {}", error);
                self.observer.on_error(ErrorKind::AudioDecoding, &error.to_string());
                return;
            }
        };

        // clear 可能在解码期间到达
        if self.queue.epoch() != epoch {
            log::debug!("Fragment discarded by interrupt before rendering");
            return;
        }

        let interrupted = tokio::select! {
            result = self.sink.play(audio) => {
                if let Err(e) = result {
                    log::warn!("Render failed: {:#}", e);
                }
                false
            }
            _ = epoch_moved(interrupts, epoch) => true,
        };

        if interrupted {
            log::info!("Render interrupted");
            self.sink.stop();
        }
    }

    fn decode(&mut self, data: &str) -> anyhow::Result<crate::audio::DecodedAudio> {
        let bytes = pcm::decode_base64(data).context("Invalid base64 in audio fragment")?;
        self.decoder.decode(&bytes)
    }

    async fn echo_mark(&mut self, payload: Value) {
        if !self.gate.is_transport_open() {
            log::debug!("Transport closed, mark not echoed");
            return;
        }
        if self.outbound.send(NetCommand::SendText(payload.to_string())).await.is_err() {
            log::debug!("Outbound channel closed, mark not echoed");
        }
    }
}

/// Resolves once the queue epoch moves past `epoch`.
async fn epoch_moved(interrupts: &mut watch::Receiver<u64>, epoch: u64) {
    while *interrupts.borrow_and_update() == epoch {
        if interrupts.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DecodedAudio;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use parking_lot::Mutex;

    // 片段长度即样本数，sink 据此区分片段
    struct TagDecoder;

    impl StreamDecoder for TagDecoder {
        fn decode(&mut self, data: &[u8]) -> anyhow::Result<DecodedAudio> {
            if data == b"bad" {
                anyhow::bail!("corrupt fragment");
            }
            Ok(DecodedAudio {
                samples: vec![0; data.len()],
                sample_rate: 16000,
                channels: 1,
            })
        }
    }

    struct RecordingSink {
        played: Arc<Mutex<Vec<usize>>>,
        stops: Arc<Mutex<usize>>,
        hang: bool,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&mut self, audio: DecodedAudio) -> anyhow::Result<()> {
            self.played.lock().push(audio.samples.len());
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        fn stop(&mut self) {
            *self.stops.lock() += 1;
        }
    }

    #[derive(Default)]
    struct Errors(Mutex<Vec<ErrorKind>>);

    impl CallObserver for Errors {
        fn on_error(&self, kind: ErrorKind, _detail: &str) {
            self.0.lock().push(kind);
        }
    }

    struct Harness {
        queue: Arc<PlaybackQueue>,
        gate: Arc<CallGate>,
        played: Arc<Mutex<Vec<usize>>>,
        stops: Arc<Mutex<usize>>,
        errors: Arc<Errors>,
        rx: mpsc::Receiver<NetCommand>,
        scheduler: Option<PlaybackScheduler>,
    }

    fn harness(hang: bool) -> Harness {
        let queue = Arc::new(PlaybackQueue::new());
        let gate = Arc::new(CallGate::new());
        gate.set_transport_open(true);
        let played = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(Mutex::new(0));
        let errors = Arc::new(Errors::default());
        let (tx, rx) = mpsc::channel(16);
        let chain = PlaybackChain {
            decoder: Box::new(TagDecoder),
            sink: Box::new(RecordingSink {
                played: played.clone(),
                stops: stops.clone(),
                hang,
            }),
        };
        let scheduler = PlaybackScheduler::new(
            queue.clone(),
            gate.clone(),
            chain,
            tx,
            errors.clone(),
            Duration::from_millis(10),
        );
        Harness {
            queue,
            gate,
            played,
            stops,
            errors,
            rx,
            scheduler: Some(scheduler),
        }
    }

    fn fragment(bytes: &[u8]) -> PlaybackEvent {
        PlaybackEvent::Audio(STANDARD.encode(bytes))
    }

    #[tokio::test]
    async fn drains_in_order_then_exits_when_transport_closed() {
        let mut h = harness(false);
        h.queue.enqueue(fragment(b"a"));
        h.queue.enqueue(PlaybackEvent::Mark(serde_json::json!({"type": "mark", "n": 1})));
        h.queue.enqueue(fragment(b"bbb"));
        h.gate.set_transport_open(false);

        // Transport closed: marks are not echoed, audio still drains.
        tokio::time::timeout(Duration::from_secs(2), h.scheduler.take().unwrap().run())
            .await
            .unwrap();

        assert_eq!(*h.played.lock(), vec![1, 3]);
        assert!(h.rx.try_recv().is_err());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn echoes_marks_between_fragments() {
        let mut h = harness(false);
        h.queue.enqueue(fragment(b"a"));
        h.queue.enqueue(PlaybackEvent::Mark(serde_json::json!({"type": "mark", "n": 1})));
        let task = tokio::spawn(h.scheduler.take().unwrap().run());

        let cmd = tokio::time::timeout(Duration::from_secs(2), h.rx.recv()).await.unwrap();
        let Some(NetCommand::SendText(text)) = cmd else {
            panic!("expected mark echo");
        };
        let echoed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(echoed, serde_json::json!({"type": "mark", "n": 1}));
        assert_eq!(*h.played.lock(), vec![1]);

        h.gate.set_transport_open(false);
        h.queue.wake();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn decode_failure_is_reported_and_skipped() {
        let mut h = harness(false);
        h.queue.enqueue(fragment(b"bad"));
        h.queue.enqueue(PlaybackEvent::Audio("!!not base64!!".to_string()));
        h.queue.enqueue(fragment(b"ok"));
        h.gate.set_transport_open(false);

        tokio::time::timeout(Duration::from_secs(2), h.scheduler.take().unwrap().run())
            .await
            .unwrap();

        assert_eq!(*h.played.lock(), vec![2]);
        assert_eq!(
            *h.errors.0.lock(),
            vec![ErrorKind::AudioDecoding, ErrorKind::AudioDecoding]
        );
    }

    #[tokio::test]
    async fn clear_stops_inflight_render() {
        let mut h = harness(true);
        h.queue.enqueue(fragment(b"a"));
        h.queue.enqueue(fragment(b"bb"));
        h.queue.enqueue(fragment(b"ccc"));
        let task = tokio::spawn(h.scheduler.take().unwrap().run());

        // Wait until the first fragment is stuck in the sink.
        while h.played.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.queue.clear(), 2);
        while *h.stops.lock() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        h.gate.set_transport_open(false);
        h.queue.wake();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        assert_eq!(*h.played.lock(), vec![1]);
        // Once for the interrupt, once on exit.
        assert_eq!(*h.stops.lock(), 2);
    }
}
