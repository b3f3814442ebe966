use std::collections::HashSet;

use arclink_rs_protocol::{StreamKey, StreamRequest, Timestamp};

/// Ordered, deduplicated set of requested streams.
///
/// The first insertion of a stream wins, including its time window; later
/// adds of the same codes are no-ops. Iteration follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct StreamSelection {
    ordered: Vec<StreamRequest>,
    seen: HashSet<StreamKey>,
}

impl StreamSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream using the connection-wide time window.
    pub fn add(&mut self, network: &str, station: &str, location: &str, channel: &str) -> bool {
        self.insert(StreamRequest::new(StreamKey::new(
            network, station, location, channel,
        )))
    }

    /// Add a stream with its own time window.
    pub fn add_window(
        &mut self,
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> bool {
        self.insert(StreamRequest::with_window(
            StreamKey::new(network, station, location, channel),
            start,
            end,
        ))
    }

    /// Returns `false` if a stream with the same codes is already present.
    pub fn insert(&mut self, request: StreamRequest) -> bool {
        if !self.seen.insert(request.key().clone()) {
            return false;
        }
        self.ordered.push(request);
        true
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.seen.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamRequest> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.seen.clear();
    }
}
