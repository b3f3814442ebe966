#[derive(Debug, thiserror::Error)]
pub enum ArclinkError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("malformed size in {command} reply: {line:?}")]
    MalformedSize { command: &'static str, line: String },

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("record too short: expected {expected}, actual {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("invalid record header: {0}")]
    InvalidHeader(String),

    #[error("miniseed error: {0}")]
    Miniseed(#[from] miniseed_rs::MseedError),
}

pub type Result<T> = std::result::Result<T, ArclinkError>;
