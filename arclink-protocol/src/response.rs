use crate::error::{ArclinkError, Result};

/// Sentinel reply for a rejected command.
pub const ERROR: &str = "ERROR";

/// Reply announcing that a request produced no (more) data.
pub const END: &str = "END";

/// Prefix of a chunk header line.
pub const CHUNK_PREFIX: &str = "CHUNK ";

/// Returns true if `line` is the `ERROR` sentinel.
pub fn is_error(line: &str) -> bool {
    trim_line(line) == ERROR
}

/// Reply to `BCDOWNLOAD` / `BDOWNLOAD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadReply {
    /// The server refused the download command.
    Error,
    /// Nothing to transfer.
    End,
    /// Chunked transfer; the first chunk carries this many bytes.
    Chunk(u64),
    /// Plain transfer of this many bytes.
    Size(u64),
}

impl DownloadReply {
    /// Classify a download reply line.
    ///
    /// `command` names the download command in malformed-size errors.
    pub fn parse(line: &str, command: &'static str) -> Result<Self> {
        let line = trim_line(line);
        if line == ERROR {
            return Ok(Self::Error);
        }
        if line == END {
            return Ok(Self::End);
        }
        if let Some(size) = parse_chunk_header(line, command)? {
            return Ok(Self::Chunk(size));
        }
        parse_byte_count(line)
            .map(Self::Size)
            .ok_or_else(|| ArclinkError::MalformedSize {
                command,
                line: line.to_owned(),
            })
    }

    /// Initial byte budget announced by this reply.
    pub fn byte_count(self) -> u64 {
        match self {
            Self::Error | Self::End => 0,
            Self::Chunk(n) | Self::Size(n) => n,
        }
    }

    pub fn is_chunked(self) -> bool {
        matches!(self, Self::Chunk(_))
    }
}

/// Parse a `CHUNK <n>` header.
///
/// Returns `Ok(None)` when the line is not a chunk header at all, which the
/// reader treats as an out-of-band status message.
pub fn parse_chunk_header(line: &str, command: &'static str) -> Result<Option<u64>> {
    let line = trim_line(line);
    let Some(rest) = line.strip_prefix(CHUNK_PREFIX) else {
        return Ok(None);
    };
    parse_byte_count(rest)
        .map(Some)
        .ok_or_else(|| ArclinkError::MalformedSize {
            command,
            line: line.to_owned(),
        })
}

/// Parse an unsigned decimal byte count.
///
/// Leading whitespace is skipped and an empty field counts as zero; anything
/// left after the digits makes the count malformed.
pub fn parse_byte_count(s: &str) -> Option<u64> {
    if s.is_empty() {
        return Some(0);
    }
    let digits = s.trim_start();
    let digits = digits.strip_prefix('+').unwrap_or(digits);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}
