/// Failure to open or read the chat event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Backend answered with a non-success status; no event stream follows.
    #[error("chat stream request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The request could not be sent or the connection failed.
    #[error("chat stream request failed: {0}")]
    Request(String),
    /// Reading the response body failed mid-stream.
    #[error("chat stream read failed: {0}")]
    Read(String),
}

/// Ways a streaming send can end other than a terminal protocol event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Network or HTTP failure before or during streaming.
    #[error(transparent)]
    Transport(TransportError),
    /// The server closed the stream without sending `done` or `error`.
    #[error("stream ended without a terminal event")]
    Incomplete,
    /// The caller requested `stop()`.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<TransportError> for StreamError {
    fn from(value: TransportError) -> Self {
        StreamError::Transport(value)
    }
}

/// A `data:` line whose payload is not a known protocol event.
///
/// Recovered by dropping the line; never leaves the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed event line: {reason}")]
pub(crate) struct ProtocolParseError {
    pub reason: String,
}

/// Setup-time errors: configuration, client construction and user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input.
    #[error("validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_keeps_code_and_body() {
        let err = TransportError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(
            err.to_string(),
            "chat stream request failed with status 502: bad gateway"
        );
    }

    #[test]
    fn stream_error_is_transparent_over_transport() {
        let err = StreamError::from(TransportError::Read("reset".into()));
        assert_eq!(err.to_string(), "chat stream read failed: reset");
        assert!(!err.is_cancelled());
        assert!(StreamError::Cancelled.is_cancelled());
    }
}
