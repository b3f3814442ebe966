//! Source string parsing: `host:port?user=<u>&pwd=<p>&dump=<path>`.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{ClientError, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 18001;
pub const DEFAULT_USER: &str = "guest@anywhere";

/// Server address plus the options carried in the source query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Only sent when non-empty.
    pub password: Option<String>,
    /// File receiving a raw copy of every payload byte read.
    pub dump: Option<PathBuf>,
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_owned(),
            password: None,
            dump: None,
        }
    }
}

impl SourceLocation {
    /// Parse a source string.
    ///
    /// An empty host becomes `localhost`, an empty or missing port `18001`.
    /// Query parameters are split on `&`, then on `=`; unknown keys are
    /// ignored.
    pub fn parse(source: &str) -> Result<Self> {
        let (address, query) = match source.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (source, None),
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => (address, ""),
        };

        let mut location = Self::default();
        if !host.is_empty() {
            location.host = host.to_owned();
        }
        if !port.is_empty() {
            location.port = port.parse().map_err(|_| ClientError::InvalidSource {
                input: source.to_owned(),
                reason: format!("invalid port {port:?}"),
            })?;
        }

        for param in query.into_iter().flat_map(|q| q.split('&')) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            match key {
                "user" => location.user = value.to_owned(),
                "pwd" => {
                    location.password = (!value.is_empty()).then(|| value.to_owned());
                }
                "dump" => {
                    location.dump = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                "" => {}
                _ => debug!(key, "ignoring unknown source parameter"),
            }
        }

        Ok(location)
    }

    /// `host:port` for connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for SourceLocation {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
