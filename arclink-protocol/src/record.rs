//! miniSEED v2 record framing: length detection and fixed header decoding.

use crate::error::{ArclinkError, Result};
use crate::request::StreamKey;
use crate::time::Timestamp;

/// Smallest record the server emits; also the size of the reader's probe.
pub const MIN_RECORD_LEN: usize = 512;
pub const FIXED_HEADER_LEN: usize = 48;

const BLOCKETTE_1000: u16 = 1000;
const MIN_LEN_EXPONENT: u8 = 7;
const MAX_LEN_EXPONENT: u8 = 20;

/// Length detection and decoding of records pulled off the wire.
///
/// Implementations must be cheap to call once per record.
pub trait RecordDecoder: Send + Sync {
    /// Total record length announced by the header bytes in `probe`, or
    /// `None` if it cannot be determined.
    fn detect_length(&self, probe: &[u8]) -> Option<usize>;

    /// Build a record from a complete byte buffer.
    fn decode(&self, raw: Vec<u8>) -> Result<Record>;
}

/// Decoder for miniSEED v2 records.
#[derive(Clone, Copy, Debug, Default)]
pub struct MiniSeedDecoder;

impl RecordDecoder for MiniSeedDecoder {
    fn detect_length(&self, probe: &[u8]) -> Option<usize> {
        detect_length(probe)
    }

    fn decode(&self, raw: Vec<u8>) -> Result<Record> {
        let header = RecordHeader::parse(&raw)?;
        Ok(Record { header, raw })
    }
}

/// Determine the record length from blockette 1000 in a miniSEED v2 header.
///
/// Returns `None` if the fixed header is not valid or carries no blockette 1000.
pub fn detect_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < FIXED_HEADER_LEN || !has_valid_fixed_header(buf) {
        return None;
    }
    let big_endian = header_byte_order(buf)?;
    let read_u16 = |at: usize| -> Option<u16> {
        let bytes = [*buf.get(at)?, *buf.get(at + 1)?];
        Some(if big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    };

    let mut offset = read_u16(46)? as usize;
    while offset >= FIXED_HEADER_LEN && offset + 4 <= buf.len() {
        let blockette_type = read_u16(offset)?;
        let next = read_u16(offset + 2)? as usize;

        if blockette_type == BLOCKETTE_1000 {
            let exponent = *buf.get(offset + 6)?;
            if !(MIN_LEN_EXPONENT..=MAX_LEN_EXPONENT).contains(&exponent) {
                return None;
            }
            return Some(1usize << exponent);
        }

        // Blockette chains only move forward.
        if next <= offset {
            break;
        }
        offset = next;
    }
    None
}

fn has_valid_fixed_header(buf: &[u8]) -> bool {
    let sequence_ok = buf[0..6]
        .iter()
        .all(|&b| b.is_ascii_digit() || b == b' ' || b == 0);
    let quality_ok = matches!(buf[6], b'D' | b'R' | b'Q' | b'M');
    let reserved_ok = buf[7] == b' ' || buf[7] == 0;
    sequence_ok && quality_ok && reserved_ok
}

/// Decide header byte order from the plausibility of the BTime year.
fn header_byte_order(buf: &[u8]) -> Option<bool> {
    let plausible = |year: u16| (1900..=2100).contains(&year);
    if plausible(u16::from_be_bytes([buf[20], buf[21]])) {
        Some(true)
    } else if plausible(u16::from_le_bytes([buf[20], buf[21]])) {
        Some(false)
    } else {
        None
    }
}

/// Fields of the miniSEED v2 fixed section of data header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub sequence: String,
    pub quality: char,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start_time: Timestamp,
    pub sample_count: u16,
    pub rate_factor: i16,
    pub rate_multiplier: i16,
    pub big_endian: bool,
}

impl RecordHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(ArclinkError::RecordTooShort {
                expected: FIXED_HEADER_LEN,
                actual: buf.len(),
            });
        }
        if !has_valid_fixed_header(buf) {
            return Err(ArclinkError::InvalidHeader(
                "bad sequence number or quality indicator".into(),
            ));
        }
        let big_endian = header_byte_order(buf)
            .ok_or_else(|| ArclinkError::InvalidHeader("implausible start year".into()))?;
        let start_time = Timestamp::from_btime(buf, big_endian)
            .ok_or_else(|| ArclinkError::InvalidHeader("invalid start time".into()))?;

        let u16_at = |at: usize| {
            let bytes = [buf[at], buf[at + 1]];
            if big_endian {
                u16::from_be_bytes(bytes)
            } else {
                u16::from_le_bytes(bytes)
            }
        };

        Ok(Self {
            sequence: ascii_field(&buf[0..6], "sequence")?,
            quality: buf[6] as char,
            station: ascii_field(&buf[8..13], "station")?,
            location: ascii_field(&buf[13..15], "location")?,
            channel: ascii_field(&buf[15..18], "channel")?,
            network: ascii_field(&buf[18..20], "network")?,
            start_time,
            sample_count: u16_at(30),
            rate_factor: u16_at(32) as i16,
            rate_multiplier: u16_at(34) as i16,
            big_endian,
        })
    }

    /// Nominal sample rate in Hz derived from factor and multiplier.
    pub fn sample_rate(&self) -> f64 {
        let factor = self.rate_factor as f64;
        let multiplier = self.rate_multiplier as f64;
        match (self.rate_factor.signum(), self.rate_multiplier.signum()) {
            (1, 1) => factor * multiplier,
            (1, -1) => -factor / multiplier,
            (-1, 1) => -multiplier / factor,
            (-1, -1) => 1.0 / (factor * multiplier),
            _ => 0.0,
        }
    }
}

fn ascii_field(bytes: &[u8], name: &str) -> Result<String> {
    let s = std::str::from_utf8(bytes)
        .ok()
        .filter(|s| s.is_ascii())
        .ok_or_else(|| ArclinkError::InvalidHeader(format!("{name} is not ASCII")))?;
    Ok(s.trim_matches(|c| c == ' ' || c == '\0').to_owned())
}

/// A complete record as received from the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    header: RecordHeader,
    raw: Vec<u8>,
}

impl Record {
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// Record bytes exactly as read from the wire.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn network(&self) -> &str {
        &self.header.network
    }

    pub fn station(&self) -> &str {
        &self.header.station
    }

    pub fn location(&self) -> &str {
        &self.header.location
    }

    pub fn channel(&self) -> &str {
        &self.header.channel
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(
            &self.header.network,
            &self.header.station,
            &self.header.location,
            &self.header.channel,
        )
    }

    pub fn start_time(&self) -> Timestamp {
        self.header.start_time
    }

    /// Decode the full record, including samples, as miniSEED.
    pub fn decode(&self) -> Result<miniseed_rs::MseedRecord> {
        Ok(miniseed_rs::decode(&self.raw)?)
    }
}
