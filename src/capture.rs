//! Microphone frames to outbound `audio` messages.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::audio::{FrameCallback, pcm};
use crate::protocol;
use crate::state_machine::CallGate;
use crate::transport::NetCommand;

/// What happened to one capture frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent,
    /// Transport not open or no ack yet; the frame is dropped.
    Gated,
    /// Outbound queue full; the frame is dropped.
    Backpressure,
    /// The transport has gone away.
    Closed,
}

/// Runs on the capture thread. Never blocks: frames that cannot be sent
/// right now are dropped.
pub struct CapturePipeline {
    gate: Arc<CallGate>,
    outbound: mpsc::Sender<NetCommand>,
    dropped: u64,
}

impl CapturePipeline {
    pub fn new(gate: Arc<CallGate>, outbound: mpsc::Sender<NetCommand>) -> Self {
        Self {
            gate,
            outbound,
            dropped: 0,
        }
    }

    pub fn on_frame(&mut self, samples: &[f32]) -> FrameOutcome {
        if !self.gate.is_ready() {
            return FrameOutcome::Gated;
        }

        let encoded = pcm::encode_frame(samples);
        let packet = match protocol::audio_packet(&encoded) {
            Ok(packet) => packet,
            Err(e) => {
                log::error!("Failed to serialise audio frame: {}", e);
                return FrameOutcome::Closed;
            }
        };

        match self.outbound.try_send(NetCommand::SendText(packet)) {
            Ok(()) => FrameOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 50 == 1 {
                    log::warn!("Outbound queue full, dropped {} capture frames so far", self.dropped);
                }
                FrameOutcome::Backpressure
            }
            Err(TrySendError::Closed(_)) => FrameOutcome::Closed,
        }
    }

    pub fn into_callback(mut self) -> FrameCallback {
        Box::new(move |samples| {
            self.on_frame(samples);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn ready_gate() -> Arc<CallGate> {
        let gate = Arc::new(CallGate::new());
        gate.set_transport_open(true);
        gate.acknowledge();
        gate
    }

    #[test]
    fn frames_before_ack_are_dropped() {
        let gate = Arc::new(CallGate::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = CapturePipeline::new(gate.clone(), tx);

        assert_eq!(pipeline.on_frame(&[0.5; 4]), FrameOutcome::Gated);
        gate.set_transport_open(true);
        assert_eq!(pipeline.on_frame(&[0.5; 4]), FrameOutcome::Gated);
        assert!(rx.try_recv().is_err());

        gate.acknowledge();
        assert_eq!(pipeline.on_frame(&[0.5; 4]), FrameOutcome::Sent);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn sent_frame_is_base64_pcm16() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = CapturePipeline::new(ready_gate(), tx);
        pipeline.on_frame(&[1.0, -1.0]);

        let Ok(NetCommand::SendText(text)) = rx.try_recv() else {
            panic!("expected audio packet");
        };
        let packet: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(packet["type"], "audio");
        // 32767, -32768 little-endian
        let bytes = pcm::decode_base64(packet["data"].as_str().unwrap()).unwrap();
        assert_eq!(bytes, vec![0xff, 0x7f, 0x00, 0x80]);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let mut pipeline = CapturePipeline::new(ready_gate(), tx);
        assert_eq!(pipeline.on_frame(&[0.0; 4]), FrameOutcome::Sent);
        assert_eq!(pipeline.on_frame(&[0.0; 4]), FrameOutcome::Backpressure);
    }

    #[test]
    fn closed_gate_stops_sending() {
        let gate = ready_gate();
        let (tx, rx) = mpsc::channel(8);
        let mut pipeline = CapturePipeline::new(gate.clone(), tx);
        gate.close();
        assert_eq!(pipeline.on_frame(&[0.0; 4]), FrameOutcome::Gated);
        drop(rx);
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut pipeline = CapturePipeline::new(ready_gate(), tx);
        assert_eq!(pipeline.on_frame(&[0.0; 4]), FrameOutcome::Closed);
    }
}
