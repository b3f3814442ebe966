//! Per-stream waveform request lines.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::time::Timestamp;

/// Network, station, location and channel codes identifying one stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl StreamKey {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_owned(),
            station: station.to_owned(),
            location: location.to_owned(),
            channel: channel.to_owned(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// One requested stream with an optional explicit time range.
///
/// Equality, hashing and ordering only look at the stream codes; the time
/// range rides along with whichever request was inserted first.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    key: StreamKey,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl StreamRequest {
    pub fn new(key: StreamKey) -> Self {
        Self {
            key,
            start: None,
            end: None,
        }
    }

    pub fn with_window(key: StreamKey, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { key, start, end }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    /// Resolve this stream's window against the connection-wide fallbacks.
    pub fn resolve(
        &self,
        fallback_start: Option<Timestamp>,
        fallback_end: Option<Timestamp>,
    ) -> (Option<Timestamp>, Option<Timestamp>) {
        (self.start.or(fallback_start), self.end.or(fallback_end))
    }

    /// Render the request line sent after `REQUEST WAVEFORM`.
    ///
    /// Layout: `<start> <end> <NET> <STA> <CHA> <LOC>`, empty codes as `.`.
    /// Returns `None` only when neither side of the window resolves; a single
    /// unresolved side is written as [`Timestamp::UNSET`].
    pub fn request_line(
        &self,
        fallback_start: Option<Timestamp>,
        fallback_end: Option<Timestamp>,
    ) -> Option<String> {
        let (start, end) = self.resolve(fallback_start, fallback_end);
        if start.is_none() && end.is_none() {
            return None;
        }
        let start = start.unwrap_or(Timestamp::UNSET);
        let end = end.unwrap_or(Timestamp::UNSET);
        Some(format!(
            "{} {} {} {} {} {}",
            start.to_arclink(),
            end.to_arclink(),
            code_or_dot(&self.key.network),
            code_or_dot(&self.key.station),
            code_or_dot(&self.key.channel),
            code_or_dot(&self.key.location),
        ))
    }
}

fn code_or_dot(code: &str) -> &str {
    if code.is_empty() { "." } else { code }
}

impl PartialEq for StreamRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for StreamRequest {}

impl Hash for StreamRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for StreamRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
