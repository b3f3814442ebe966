//! ArcLink protocol types, commands, and record framing.
//!
//! This crate provides the wire vocabulary of the ArcLink waveform
//! request protocol, used by the async client crate.

pub mod command;
pub mod error;
pub mod record;
pub mod request;
pub mod response;
pub mod time;

pub use command::Command;
pub use error::{ArclinkError, Result};
pub use record::{MiniSeedDecoder, Record, RecordDecoder, RecordHeader};
pub use request::{StreamKey, StreamRequest};
pub use response::DownloadReply;
pub use time::Timestamp;
