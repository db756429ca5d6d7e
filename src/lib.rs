//! Linux client for real-time voice calls with a remote agent over
//! WebSocket: handshake gate, ordered playback with barge-in, and gated
//! microphone streaming.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod gui_bridge;
pub mod net_link;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod state_machine;
pub mod transport;

pub use error::{CallError, ErrorKind};
pub use events::CallObserver;
pub use session::{CallSession, CallSettings};
pub use state_machine::CallState;
