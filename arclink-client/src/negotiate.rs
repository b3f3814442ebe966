//! ArcLink handshake: greeting, login, waveform request and download start.

use arclink_rs_protocol::{Command, DownloadReply, Timestamp};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::select::StreamSelection;
use crate::state::{ConnectionConfig, ServerInfo, SessionState};

/// Connection-wide time window applied to streams without their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

/// Run the full handshake on a freshly opened connection.
///
/// Returns the session with its initial byte budget. A budget of zero means
/// the server has nothing to send for this request.
pub async fn negotiate(
    conn: &mut Connection,
    config: &ConnectionConfig,
    streams: &StreamSelection,
    window: TimeWindow,
) -> Result<(SessionState, ServerInfo)> {
    let server_info = hello(conn).await?;

    let source = &config.source;
    debug!(user = %source.user, "USER");
    conn.send_command(&Command::User {
        user: source.user.clone(),
        password: source.password.clone(),
    })
    .await?;

    if let Some(name) = &config.institution {
        debug!(institution = %name, "INSTITUTION");
        conn.send_command(&Command::Institution { name: name.clone() })
            .await?;
    }

    conn.send_command(&Command::waveform_request()).await?;
    send_request_lines(conn, streams, window).await?;

    let request_id = conn.send_command(&Command::End).await?.trim().to_owned();
    if request_id.is_empty() {
        return Err(ClientError::UnexpectedResponse(
            "empty request id for END".into(),
        ));
    }
    debug!(%request_id, "request accepted");

    let reply = start_download(conn, &request_id).await?;
    let remaining_bytes = i64::try_from(reply.byte_count()).unwrap_or(i64::MAX);
    info!(%request_id, ?reply, "download started");

    let session = SessionState::new(request_id, remaining_bytes, reply.is_chunked());
    Ok((session, server_info))
}

async fn hello(conn: &mut Connection) -> Result<ServerInfo> {
    let software = conn.send_command(&Command::Hello).await?;
    let organization = conn.read_line().await?;
    info!(%software, %organization, "connected");
    Ok(ServerInfo {
        software,
        organization,
    })
}

/// Send one line per selected stream; the server does not acknowledge them.
async fn send_request_lines(
    conn: &mut Connection,
    streams: &StreamSelection,
    window: TimeWindow,
) -> Result<()> {
    let end = window.end.unwrap_or_else(Timestamp::now);
    for request in streams.iter() {
        match request.request_line(window.start, Some(end)) {
            Some(line) => conn.send_line(&Command::StreamLine(line)).await?,
            None => warn!(stream = %request.key(), "no time window, skipping stream"),
        }
    }
    Ok(())
}

/// `BCDOWNLOAD`, falling back to `BDOWNLOAD` if the server refuses it.
async fn start_download(conn: &mut Connection, request_id: &str) -> Result<DownloadReply> {
    conn.send_line(&Command::BcDownload {
        request_id: request_id.to_owned(),
    })
    .await?;
    let line = conn.read_line().await?;
    let reply = DownloadReply::parse(&line, "BCDOWNLOAD")?;
    if reply != DownloadReply::Error {
        return Ok(reply);
    }

    debug!(%request_id, "BCDOWNLOAD refused, trying BDOWNLOAD");
    conn.send_line(&Command::BDownload {
        request_id: request_id.to_owned(),
    })
    .await?;
    let line = conn.read_line().await?;
    Ok(DownloadReply::parse(&line, "BDOWNLOAD")?)
}
