use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Call already in progress")]
    AlreadyInProgress,

    #[error("Microphone access failed: {0}")]
    MicrophoneAccess(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Audio decoding failed: {0}")]
    PlaybackDecode(String),
}

impl CallError {
    /// Kind reported to the host, `None` for errors that are not surfaced.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CallError::AlreadyInProgress => None,
            CallError::MicrophoneAccess(_) => Some(ErrorKind::MicrophoneAccess),
            CallError::Transport(_) => Some(ErrorKind::Websocket),
            CallError::PlaybackDecode(_) => Some(ErrorKind::AudioDecoding),
        }
    }
}

/// Error categories as the host sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MicrophoneAccess,
    Websocket,
    AudioDecoding,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MicrophoneAccess => "microphone_access_error",
            ErrorKind::Websocket => "websocket_error",
            ErrorKind::AudioDecoding => "audio_decoding_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_use_wire_names() {
        assert_eq!(
            CallError::MicrophoneAccess("denied".into()).kind().map(ErrorKind::as_str),
            Some("microphone_access_error")
        );
        assert_eq!(
            CallError::Transport("reset".into()).kind().map(ErrorKind::as_str),
            Some("websocket_error")
        );
        assert_eq!(
            CallError::PlaybackDecode("bad header".into()).kind().map(ErrorKind::as_str),
            Some("audio_decoding_error")
        );
        assert_eq!(CallError::AlreadyInProgress.kind(), None);
    }
}
