use std::future::Future;
use std::time::Duration;

use arclink_rs_protocol::{Command, response};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// Line-oriented TCP transport with per-operation timeouts.
///
/// Every I/O operation also watches the close flag so that a
/// [`CloseHandle`](crate::CloseHandle) can abort a blocked read.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Duration,
    closed: watch::Receiver<bool>,
}

impl Connection {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
        mut closed: watch::Receiver<bool>,
    ) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = interruptible(&mut closed, connect_timeout, TcpStream::connect(addr)).await?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            read_timeout,
            closed,
        })
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Send a command without waiting for any reply.
    pub async fn send_line(&mut self, cmd: &Command) -> Result<()> {
        trace!(command = cmd.name(), "sending");
        self.send_raw(&cmd.to_bytes()).await
    }

    /// Send a command and read its reply line, failing on `ERROR`.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<String> {
        self.send_line(cmd).await?;
        let reply = self.read_line().await?;
        if response::is_error(&reply) {
            warn!(command = cmd.name(), "command rejected");
            return Err(ClientError::CommandRejected(cmd.name()));
        }
        trace!(command = cmd.name(), %reply, "reply");
        Ok(reply)
    }

    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let writer = &mut self.writer;
        interruptible(&mut self.closed, self.read_timeout, async move {
            writer.write_all(data).await?;
            writer.flush().await
        })
        .await
    }

    /// Read one line with its terminator stripped.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; status lines are free text.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = interruptible(
            &mut self.closed,
            self.read_timeout,
            self.reader.read_until(b'\n', &mut buf),
        )
        .await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        let mut line = String::from_utf8_lossy(&buf).into_owned();
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(line)
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = interruptible(
            &mut self.closed,
            self.read_timeout,
            self.reader.read_exact(buf),
        )
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ClientError::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(ClientError::Io)?;
        Ok(())
    }
}

/// Run `fut` under `timeout`, giving up early if the close flag is raised.
async fn interruptible<T>(
    closed: &mut watch::Receiver<bool>,
    timeout: Duration,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = close_requested(closed) => Err(ClientError::Interrupted),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(io) => io.map_err(ClientError::Io),
            Err(_) => {
                warn!(?timeout, "I/O timeout");
                Err(ClientError::Timeout(timeout))
            }
        },
    }
}

async fn close_requested(closed: &mut watch::Receiver<bool>) {
    if closed.wait_for(|&c| c).await.is_err() {
        // Sender gone: nobody can close us any more.
        std::future::pending::<()>().await;
    }
}
