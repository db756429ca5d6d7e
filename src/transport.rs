use tokio::sync::{mpsc, oneshot};
use url::Url;

/// Events a transport reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Connected,
    Text(String),
    Error(String),
    Disconnected,
}

/// Work handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum NetCommand {
    SendText(String),
}

/// Message channel to the voice agent.
///
/// `open` must not block: the connection is established in the background
/// and reported through `events` (`Connected`, then `Text`, and finally
/// `Disconnected`, preceded by `Error` on failure). The transport drains
/// `commands` until the sender side is dropped. `hangup` firing (or its
/// sender being dropped) closes the connection at once, even with
/// commands still queued.
pub trait Transport: Send + Sync {
    fn open(
        &self,
        url: &Url,
        commands: mpsc::Receiver<NetCommand>,
        events: mpsc::Sender<NetEvent>,
        hangup: oneshot::Receiver<()>,
    ) -> anyhow::Result<()>;
}
