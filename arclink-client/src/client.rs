use std::time::Duration;

use arclink_rs_protocol::{MiniSeedDecoder, Record, RecordDecoder, Timestamp};
use futures_core::Stream;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::negotiate::{self, TimeWindow};
use crate::reader;
use crate::select::StreamSelection;
use crate::source::SourceLocation;
use crate::state::{CloseHandle, ConnectionConfig, EndReason, ServerInfo, SessionState};

/// Pull-based ArcLink client for one waveform request.
///
/// Streams and time windows are configured up front; the first call to
/// [`next()`](Self::next) connects, runs the handshake and starts the
/// download. Each later call yields one record until the transfer is
/// consumed, the server has nothing to send, or an error occurs. All three
/// end with `None`; [`end_reason()`](Self::end_reason) tells them apart.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> arclink_rs_client::Result<()> {
/// use arclink_rs_client::{ArclinkConnection, Timestamp};
///
/// let mut conn = ArclinkConnection::new("arclink.example.org:18001?user=me@example.org")?;
/// conn.set_time_window(
///     Some(Timestamp::parse("2024,1,15,0,0,0")?),
///     Some(Timestamp::parse("2024,1,15,1,0,0")?),
/// );
/// conn.add_stream("GE", "WLF", "", "BHZ");
///
/// while let Some(record) = conn.next().await {
///     println!("{} {} bytes", record.stream_key(), record.len());
/// }
/// println!("finished: {:?}", conn.end_reason());
/// # Ok(())
/// # }
/// ```
pub struct ArclinkConnection {
    config: ConnectionConfig,
    streams: StreamSelection,
    window: TimeWindow,
    decoder: Box<dyn RecordDecoder>,
    close_handle: CloseHandle,
    connection: Option<Connection>,
    dump: Option<File>,
    session: Option<SessionState>,
    server_info: Option<ServerInfo>,
    reading_data: bool,
    end_reason: Option<EndReason>,
}

impl ArclinkConnection {
    /// Create a connection from a source string
    /// (`host:port?user=<u>&pwd=<p>&dump=<path>`).
    pub fn new(source: &str) -> Result<Self> {
        let config = ConnectionConfig {
            source: SourceLocation::parse(source)?,
            ..ConnectionConfig::default()
        };
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        Self::with_decoder(config, MiniSeedDecoder)
    }

    /// Create a connection that detects and decodes records with `decoder`.
    pub fn with_decoder(config: ConnectionConfig, decoder: impl RecordDecoder + 'static) -> Self {
        Self {
            config,
            streams: StreamSelection::new(),
            window: TimeWindow::default(),
            decoder: Box::new(decoder),
            close_handle: CloseHandle::new(),
            connection: None,
            dump: None,
            session: None,
            server_info: None,
            reading_data: false,
            end_reason: None,
        }
    }

    // -- Accessors --

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn streams(&self) -> &StreamSelection {
        &self.streams
    }

    /// Current transfer state, once the handshake has succeeded.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Greeting of the server, once connected.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Why the last [`next()`](Self::next) returned `None`.
    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Handle that closes this connection from another task or thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.close_handle.clone()
    }

    // -- Configuration --

    /// Request a stream over the connection-wide time window.
    ///
    /// Returns `false` if the stream was already requested.
    pub fn add_stream(
        &mut self,
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
    ) -> bool {
        self.streams.add(network, station, location, channel)
    }

    /// Request a stream over its own time window. Missing sides fall back to
    /// the connection-wide window.
    ///
    /// Returns `false` if the stream was already requested; the first
    /// window is kept.
    pub fn add_stream_window(
        &mut self,
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> bool {
        self.streams.add_window(network, station, location, channel, start, end)
    }

    pub fn set_start_time(&mut self, start: Option<Timestamp>) {
        self.window.start = start;
    }

    /// Without an end time, requests run up to the moment of the handshake.
    pub fn set_end_time(&mut self, end: Option<Timestamp>) {
        self.window.end = end;
    }

    pub fn set_time_window(&mut self, start: Option<Timestamp>, end: Option<Timestamp>) {
        self.window = TimeWindow { start, end };
    }

    /// Replace server address, credentials and dump file. Takes effect on
    /// the next handshake.
    pub fn set_source(&mut self, source: &str) -> Result<()> {
        self.config.source = SourceLocation::parse(source)?;
        Ok(())
    }

    /// Per-operation I/O timeout, applied immediately if connected.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.read_timeout = timeout;
        if let Some(conn) = self.connection.as_mut() {
            conn.set_read_timeout(timeout);
        }
    }

    // -- Lifecycle --

    /// Next record of the transfer, or `None` once it has ended.
    ///
    /// After returning `None`, every later call returns `None` until
    /// [`reconnect()`](Self::reconnect) or [`clear()`](Self::clear).
    pub async fn next(&mut self) -> Option<Record> {
        if self.end_reason.is_some() {
            return None;
        }
        match self.advance().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "closing connection");
                self.finish(EndReason::Failed(e.to_string())).await;
                None
            }
        }
    }

    /// Close the transport and the dump file.
    ///
    /// Later calls to [`next()`](Self::next) return `None`.
    pub async fn close(&mut self) {
        self.close_handle.close();
        self.close_transport().await;
    }

    /// Drop the current transfer so the next call to [`next()`](Self::next)
    /// repeats the handshake with the same streams.
    pub async fn reconnect(&mut self) {
        debug!("reconnect requested");
        self.close_transport().await;
        self.reset_transfer();
    }

    /// Forget streams, time window and transfer state, keeping the source
    /// and timeouts.
    pub async fn clear(&mut self) {
        self.close_transport().await;
        self.reset_transfer();
        self.streams.clear();
        self.window = TimeWindow::default();
        self.server_info = None;
    }

    /// Consume this connection and return a [`Stream`] of records.
    pub fn into_stream(self) -> impl Stream<Item = Record> {
        crate::stream::record_stream(self)
    }

    // -- Private helpers --

    async fn advance(&mut self) -> Result<Option<Record>> {
        if self.close_handle.is_closed() {
            return Err(ClientError::Interrupted);
        }

        if !self.reading_data {
            // Set before the attempt so a failed handshake is not retried.
            self.reading_data = true;
            self.open().await?;
            if self.session.as_ref().is_some_and(|s| s.remaining_bytes <= 0) {
                info!("no data for this request");
                self.finish(EndReason::SessionEmpty).await;
                return Ok(None);
            }
        }

        let (Some(conn), Some(session)) = (self.connection.as_mut(), self.session.as_mut()) else {
            self.finish(EndReason::EndOfStream).await;
            return Ok(None);
        };
        let record =
            reader::next_record(conn, session, &*self.decoder, self.dump.as_mut()).await?;
        if !session.is_open {
            self.finish(EndReason::EndOfStream).await;
        }
        Ok(record)
    }

    async fn open(&mut self) -> Result<()> {
        let addr = self.config.source.addr();
        info!(%addr, streams = self.streams.len(), "connecting");
        let mut conn = Connection::connect(
            &addr,
            self.config.connect_timeout,
            self.config.read_timeout,
            self.close_handle.subscribe(),
        )
        .await?;

        let negotiated =
            negotiate::negotiate(&mut conn, &self.config, &self.streams, self.window).await;
        let (session, server_info) = match negotiated {
            Ok(negotiated) => negotiated,
            Err(e) => {
                conn.shutdown().await.ok();
                return Err(e);
            }
        };

        if let Some(path) = &self.config.source.dump {
            match OpenOptions::new().create(true).append(true).open(path).await {
                Ok(file) => self.dump = Some(file),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot open dump file"),
            }
        }

        self.connection = Some(conn);
        self.session = Some(session);
        self.server_info = Some(server_info);
        Ok(())
    }

    async fn finish(&mut self, reason: EndReason) {
        debug!(reason = reason.as_str(), "end of records");
        self.close_transport().await;
        self.end_reason = Some(reason);
    }

    async fn close_transport(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.shutdown().await.ok();
            info!("connection closed");
        }
        if let Some(mut dump) = self.dump.take()
            && let Err(e) = dump.flush().await
        {
            warn!(error = %e, "dump flush failed");
        }
        if let Some(session) = self.session.as_mut() {
            session.is_open = false;
        }
    }

    fn reset_transfer(&mut self) {
        self.close_handle.reset();
        self.reading_data = false;
        self.end_reason = None;
        self.session = None;
    }
}
