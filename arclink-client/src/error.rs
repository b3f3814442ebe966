use std::time::Duration;

/// Errors that can occur during ArcLink client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP, socket or dump file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ArcLink protocol error (malformed size header, bad record header, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] arclink_rs_protocol::ArclinkError),

    /// Operation exceeded the configured timeout duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server closed the connection.
    #[error("disconnected")]
    Disconnected,

    /// Server answered `ERROR` to a command that must succeed.
    #[error("{0} rejected by server")]
    CommandRejected(&'static str),

    /// Server sent a line the handshake cannot use.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The connection was closed through a [`CloseHandle`](crate::CloseHandle).
    #[error("interrupted by close")]
    Interrupted,

    /// The source string could not be parsed.
    #[error("invalid source {input:?}: {reason}")]
    InvalidSource {
        /// The offending source string.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
