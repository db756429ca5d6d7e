//! Notifications delivered to the host application.

use crate::error::ErrorKind;

/// Callbacks invoked by the session and the playback loop. Every method has
/// an empty default so hosts only implement what they display.
///
/// Calls arrive from the session task and the scheduler task and must return
/// quickly.
pub trait CallObserver: Send + Sync {
    fn on_call_state_change(&self, _active: bool) {}

    fn on_first_audio_packet(&self) {}

    fn on_media_permission_granted(&self) {}

    fn on_error(&self, _kind: ErrorKind, _detail: &str) {}
}
