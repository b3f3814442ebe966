use crate::error::{ArclinkError, Result};
use crate::time::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    // Session
    Hello,
    User {
        user: String,
        password: Option<String>,
    },
    Institution {
        name: String,
    },

    // Request definition
    Request {
        request_type: String,
        attributes: Vec<(String, String)>,
    },
    /// One `<start> <end> <NET> <STA> <CHA> <LOC>` line inside a request.
    StreamLine(String),
    End,

    // Transfer
    BcDownload {
        request_id: String,
    },
    BDownload {
        request_id: String,
    },
    Purge {
        request_id: String,
    },
}

impl Command {
    /// `REQUEST WAVEFORM format=MSEED`.
    pub fn waveform_request() -> Self {
        Self::Request {
            request_type: "WAVEFORM".into(),
            attributes: vec![("format".into(), "MSEED".into())],
        }
    }

    /// Parse a command from a text line.
    ///
    /// The line should NOT include the trailing `\r\n`.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut parts = line.split_whitespace();
        let keyword = parts
            .next()
            .ok_or_else(|| ArclinkError::InvalidCommand("empty command".into()))?;

        match keyword.to_uppercase().as_str() {
            "HELLO" => {
                reject_extra_args(&mut parts, "HELLO")?;
                Ok(Self::Hello)
            }
            "USER" => {
                let user = parts
                    .next()
                    .ok_or_else(|| ArclinkError::InvalidCommand("USER requires a name".into()))?
                    .to_owned();
                let rest: Vec<&str> = parts.collect();
                let password = if rest.is_empty() {
                    None
                } else {
                    Some(rest.join(" "))
                };
                Ok(Self::User { user, password })
            }
            "INSTITUTION" => {
                let rest: Vec<&str> = parts.collect();
                if rest.is_empty() {
                    return Err(ArclinkError::InvalidCommand(
                        "INSTITUTION requires a name".into(),
                    ));
                }
                Ok(Self::Institution {
                    name: rest.join(" "),
                })
            }
            "REQUEST" => {
                let request_type = parts
                    .next()
                    .ok_or_else(|| ArclinkError::InvalidCommand("REQUEST requires a type".into()))?
                    .to_owned();
                let attributes = parts
                    .map(|attr| match attr.split_once('=') {
                        Some((k, v)) => Ok((k.to_owned(), v.to_owned())),
                        None => Err(ArclinkError::InvalidCommand(format!(
                            "REQUEST: expected key=value, got {attr:?}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Request {
                    request_type,
                    attributes,
                })
            }
            "END" => {
                reject_extra_args(&mut parts, "END")?;
                Ok(Self::End)
            }
            "BCDOWNLOAD" => Ok(Self::BcDownload {
                request_id: single_arg(&mut parts, "BCDOWNLOAD")?,
            }),
            "BDOWNLOAD" => Ok(Self::BDownload {
                request_id: single_arg(&mut parts, "BDOWNLOAD")?,
            }),
            "PURGE" => Ok(Self::Purge {
                request_id: single_arg(&mut parts, "PURGE")?,
            }),
            _ if Timestamp::parse(keyword).is_ok() => {
                if line.split_whitespace().count() != 6 {
                    return Err(ArclinkError::InvalidCommand(format!(
                        "request line needs 6 fields: {line:?}"
                    )));
                }
                Ok(Self::StreamLine(line.trim().to_owned()))
            }
            _ => Err(ArclinkError::InvalidCommand(format!(
                "unknown command: {keyword:?}"
            ))),
        }
    }

    /// Serialize to wire bytes (`\r\n` terminated).
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.to_line()).into_bytes()
    }

    /// The command keyword, used in error reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::User { .. } => "USER",
            Self::Institution { .. } => "INSTITUTION",
            Self::Request { .. } => "REQUEST",
            Self::StreamLine(_) => "request line",
            Self::End => "END",
            Self::BcDownload { .. } => "BCDOWNLOAD",
            Self::BDownload { .. } => "BDOWNLOAD",
            Self::Purge { .. } => "PURGE",
        }
    }

    /// The wire line without terminator.
    pub fn to_line(&self) -> String {
        match self {
            Self::Hello => "HELLO".into(),
            Self::User { user, password } => match password {
                Some(pwd) => format!("USER {user} {pwd}"),
                None => format!("USER {user}"),
            },
            Self::Institution { name } => format!("INSTITUTION {name}"),
            Self::Request {
                request_type,
                attributes,
            } => {
                let mut s = format!("REQUEST {request_type}");
                for (k, v) in attributes {
                    s.push(' ');
                    s.push_str(k);
                    s.push('=');
                    s.push_str(v);
                }
                s
            }
            Self::StreamLine(line) => line.clone(),
            Self::End => "END".into(),
            Self::BcDownload { request_id } => format!("BCDOWNLOAD {request_id}"),
            Self::BDownload { request_id } => format!("BDOWNLOAD {request_id}"),
            Self::Purge { request_id } => format!("PURGE {request_id}"),
        }
    }
}

fn single_arg(parts: &mut std::str::SplitWhitespace<'_>, command: &str) -> Result<String> {
    let arg = parts
        .next()
        .ok_or_else(|| ArclinkError::InvalidCommand(format!("{command} requires a request id")))?
        .to_owned();
    reject_extra_args(parts, command)?;
    Ok(arg)
}

fn reject_extra_args(parts: &mut std::str::SplitWhitespace<'_>, command: &str) -> Result<()> {
    if parts.next().is_some() {
        Err(ArclinkError::InvalidCommand(format!(
            "{command}: unexpected extra arguments"
        )))
    } else {
        Ok(())
    }
}
