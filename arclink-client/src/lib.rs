//! Async ArcLink client for retrieving archived seismic waveform records.
//!
//! Negotiates a waveform request with an ArcLink server and pulls the
//! resulting miniSEED records one at a time.

mod client;
mod connection;
pub mod error;
#[cfg(test)]
mod mock;
mod negotiate;
mod reader;
mod select;
mod source;
mod state;
mod stream;

pub use client::ArclinkConnection;
pub use error::{ClientError, Result};
pub use select::StreamSelection;
pub use source::SourceLocation;
pub use state::{CloseHandle, ConnectionConfig, EndReason, ServerInfo, SessionState};

pub use arclink_rs_protocol::{
    MiniSeedDecoder, Record, RecordDecoder, RecordHeader, StreamKey, StreamRequest, Timestamp,
};
