use std::time::Duration;

use tokio::sync::watch;

use crate::source::SourceLocation;

/// Configuration for [`ArclinkConnection`](crate::ArclinkConnection).
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Server address, credentials and optional dump file.
    pub source: SourceLocation,
    /// Sent as `INSTITUTION <name>` after `USER` when set. Default: `None`.
    pub institution: Option<String>,
    /// Timeout for the initial TCP connection. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Timeout for each individual read or write. Default: 30 seconds.
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            source: SourceLocation::default(),
            institution: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Transfer state established by a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    /// Request id returned by the server for `END`.
    pub request_id: String,
    /// Payload bytes still to be read before re-arming or finishing.
    pub remaining_bytes: i64,
    /// Whether the byte budget is re-armed by `CHUNK <n>` lines.
    pub chunk_mode: bool,
    /// Cleared once the transfer has been consumed and purged.
    pub is_open: bool,
}

impl SessionState {
    pub(crate) fn new(request_id: String, remaining_bytes: i64, chunk_mode: bool) -> Self {
        Self {
            request_id,
            remaining_bytes,
            chunk_mode,
            is_open: true,
        }
    }
}

/// Greeting lines returned by the server for `HELLO`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Software identification line.
    pub software: String,
    /// Organization line.
    pub organization: String,
}

/// Why [`ArclinkConnection::next`](crate::ArclinkConnection::next) stopped
/// producing records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The announced payload was fully consumed.
    EndOfStream,
    /// The server had nothing to send for the request.
    SessionEmpty,
    /// Connection, handshake or transfer failure.
    Failed(String),
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndOfStream => "end of stream",
            Self::SessionEmpty => "session empty",
            Self::Failed(_) => "failed",
        }
    }
}

/// Handle for closing an [`ArclinkConnection`](crate::ArclinkConnection)
/// from another task or thread.
///
/// Closing aborts any read currently blocked on the transport; the pending
/// `next()` call then returns `None`.
#[derive(Clone, Debug)]
pub struct CloseHandle {
    tx: watch::Sender<bool>,
}

impl CloseHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
