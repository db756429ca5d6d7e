use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AwaitingAck,
    Active,
    Ended,
}

impl CallState {
    pub fn is_in_progress(self) -> bool {
        matches!(self, CallState::AwaitingAck | CallState::Active)
    }
}

/// Readiness flags shared between the session, the playback loop and the
/// capture thread.
#[derive(Debug, Default)]
pub struct CallGate {
    transport_open: AtomicBool,
    ack_received: AtomicBool,
}

impl CallGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transport_open(&self, open: bool) {
        self.transport_open.store(open, Ordering::SeqCst);
    }

    pub fn is_transport_open(&self) -> bool {
        self.transport_open.load(Ordering::SeqCst)
    }

    /// Returns `false` if the ack had already been seen.
    pub fn acknowledge(&self) -> bool {
        !self.ack_received.swap(true, Ordering::SeqCst)
    }

    pub fn is_ack_received(&self) -> bool {
        self.ack_received.load(Ordering::SeqCst)
    }

    /// Capture frames may go out only when this holds.
    pub fn is_ready(&self) -> bool {
        self.is_transport_open() && self.is_ack_received()
    }

    pub fn close(&self) {
        self.transport_open.store(false, Ordering::SeqCst);
        self.ack_received.store(false, Ordering::SeqCst);
    }
}
