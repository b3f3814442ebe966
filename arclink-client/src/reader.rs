//! Record reassembly from the raw payload byte stream.

use arclink_rs_protocol::record::MIN_RECORD_LEN;
use arclink_rs_protocol::{Command, Record, RecordDecoder, response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::state::SessionState;

/// Pull the next decodable record from an open session.
///
/// Returns `Ok(None)` once the byte budget is exhausted and the request has
/// been purged; `session.is_open` is cleared at that point, possibly in the
/// same call that returns the last record. Undecodable records are skipped
/// but still count against the budget.
pub async fn next_record(
    conn: &mut Connection,
    session: &mut SessionState,
    decoder: &dyn RecordDecoder,
    mut dump: Option<&mut File>,
) -> Result<Option<Record>> {
    while session.is_open {
        let mut buf = vec![0u8; MIN_RECORD_LEN];
        conn.read_exact(&mut buf).await?;

        match decoder.detect_length(&buf) {
            Some(len) if len > MIN_RECORD_LEN => {
                buf.resize(len, 0);
                conn.read_exact(&mut buf[MIN_RECORD_LEN..]).await?;
            }
            Some(_) => {}
            None => warn!(
                probe = MIN_RECORD_LEN,
                "cannot detect record length, assuming probe size"
            ),
        }

        let consumed = buf.len();
        if let Some(file) = dump.as_deref_mut()
            && let Err(e) = file.write_all(&buf).await
        {
            warn!(error = %e, "dump write failed");
        }

        let record = match decoder.decode(buf) {
            Ok(record) => {
                trace!(stream = %record.stream_key(), len = consumed, "record");
                Some(record)
            }
            Err(e) => {
                debug!(error = %e, len = consumed, "skipping undecodable record");
                None
            }
        };

        session.remaining_bytes -= consumed as i64;
        if session.remaining_bytes <= 0 {
            finish_budget(conn, session).await?;
        }

        if record.is_some() {
            return Ok(record);
        }
    }
    Ok(None)
}

/// Re-arm a chunked transfer or purge the request when nothing is left.
async fn finish_budget(conn: &mut Connection, session: &mut SessionState) -> Result<()> {
    if session.chunk_mode {
        let line = conn.read_line().await?;
        match response::parse_chunk_header(&line, "CHUNK")? {
            Some(size) => {
                session.remaining_bytes = i64::try_from(size).unwrap_or(i64::MAX);
                debug!(size, "next chunk");
            }
            None => info!(status = %line, "server status"),
        }
    }

    if session.remaining_bytes <= 0 {
        debug!(request_id = %session.request_id, "transfer complete, purging");
        conn.send_line(&Command::Purge {
            request_id: session.request_id.clone(),
        })
        .await?;
        session.is_open = false;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ClientError;
    use crate::mock::make_record;
    use arclink_rs_protocol::{ArclinkError, MiniSeedDecoder};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::sync::watch;

    /// Connection whose peer writes `payload` and then keeps the socket open.
    async fn serve(payload: Vec<u8>) -> (Connection, watch::Sender<bool>, OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (close_tx, close_rx) = watch::channel(false);

        let (conn, (stream, _)) = tokio::join!(
            async {
                Connection::connect(
                    &addr.to_string(),
                    Duration::from_secs(5),
                    Duration::from_secs(5),
                    close_rx,
                )
                .await
                .unwrap()
            },
            async { listener.accept().await.unwrap() }
        );
        let (server_read, mut server_write) = stream.into_split();
        tokio::spawn(async move {
            server_write.write_all(&payload).await.unwrap();
            server_write.flush().await.unwrap();
            // Keep the write half alive until the test ends.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        (conn, close_tx, server_read)
    }

    async fn read_sent(server_read: &mut OwnedReadHalf) -> String {
        let mut buf = vec![0u8; 256];
        let n = server_read.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn session(remaining: i64, chunk_mode: bool) -> SessionState {
        SessionState::new("77".into(), remaining, chunk_mode)
    }

    /// Treats every buffer as a record of fixed length; rejects buffers
    /// starting with 0xFF.
    struct FixedLengthDecoder(usize);

    impl RecordDecoder for FixedLengthDecoder {
        fn detect_length(&self, _probe: &[u8]) -> Option<usize> {
            Some(self.0)
        }

        fn decode(&self, raw: Vec<u8>) -> arclink_rs_protocol::Result<Record> {
            if raw.first() == Some(&0xFF) {
                return Err(ArclinkError::InvalidHeader("fake".into()));
            }
            MiniSeedDecoder.decode(raw)
        }
    }

    #[tokio::test]
    async fn budget_counts_every_byte() {
        let mut payload = make_record("GE", "WLF", "", "BHZ", 9);
        payload.extend(make_record("GE", "WLF", "", "BHZ", 9));
        let (mut conn, _close, mut server_read) = serve(payload).await;
        let mut s = session(1024, false);

        let first = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert_eq!(first.unwrap().len(), 512);
        assert_eq!(s.remaining_bytes, 512);
        assert!(s.is_open);

        let second = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert_eq!(second.unwrap().channel(), "BHZ");
        assert_eq!(s.remaining_bytes, 0);
        assert!(!s.is_open);
        assert_eq!(read_sent(&mut server_read).await, "PURGE 77\r\n");

        let third = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn large_record_reads_remainder() {
        let payload = make_record("IU", "ANMO", "00", "LHZ", 12);
        let (mut conn, _close, _server_read) = serve(payload.clone()).await;
        let mut s = session(4096, false);

        let record = next_record(&mut conn, &mut s, &MiniSeedDecoder, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.raw(), &payload[..]);
        assert_eq!(s.remaining_bytes, 0);
    }

    #[tokio::test]
    async fn undecodable_record_still_consumes_budget() {
        let (mut conn, _close, mut server_read) = serve(vec![0xFF; 512]).await;
        let mut s = session(512, false);

        let result = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert!(result.is_none());
        assert_eq!(s.remaining_bytes, 0);
        assert!(!s.is_open);
        assert_eq!(read_sent(&mut server_read).await, "PURGE 77\r\n");
    }

    #[tokio::test]
    async fn skips_bad_record_and_returns_next() {
        let mut payload = vec![0xFF; 512];
        payload.extend(make_record("GE", "WLF", "", "BHE", 9));
        let (mut conn, _close, _server_read) = serve(payload).await;
        let mut s = session(1024, false);

        let record = next_record(&mut conn, &mut s, &FixedLengthDecoder(512), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.channel(), "BHE");
        assert_eq!(s.remaining_bytes, 0);
    }

    #[tokio::test]
    async fn short_detected_length_consumes_whole_probe() {
        let mut payload = make_record("GE", "WLF", "", "BHZ", 9);
        payload.extend(make_record("GE", "WLF", "", "BHN", 9));
        let (mut conn, _close, _server_read) = serve(payload).await;
        let mut s = session(1024, false);

        let decoder = FixedLengthDecoder(256);
        let first = next_record(&mut conn, &mut s, &decoder, None).await.unwrap().unwrap();
        assert_eq!(first.len(), 512);
        assert_eq!(first.channel(), "BHZ");
        let second = next_record(&mut conn, &mut s, &decoder, None).await.unwrap().unwrap();
        assert_eq!(second.channel(), "BHN");
    }

    #[tokio::test]
    async fn chunk_header_rearms_budget() {
        let mut payload = make_record("GE", "WLF", "", "BHZ", 9);
        payload.extend_from_slice(b"CHUNK 512\r\n");
        payload.extend(make_record("GE", "WLF", "", "BHN", 9));
        payload.extend_from_slice(b"END\r\n");
        let (mut conn, _close, mut server_read) = serve(payload).await;
        let mut s = session(512, true);

        let first = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert_eq!(first.unwrap().channel(), "BHZ");
        assert_eq!(s.remaining_bytes, 512);
        assert!(s.is_open);

        let second = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert_eq!(second.unwrap().channel(), "BHN");
        assert!(!s.is_open);
        assert_eq!(read_sent(&mut server_read).await, "PURGE 77\r\n");
    }

    #[tokio::test]
    async fn binary_status_line_still_purges() {
        let mut payload = make_record("GE", "WLF", "", "BHZ", 9);
        payload.extend_from_slice(b"done \xc3\x28\r\n");
        let (mut conn, _close, mut server_read) = serve(payload).await;
        let mut s = session(512, true);

        let record = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await.unwrap();
        assert_eq!(record.unwrap().channel(), "BHZ");
        assert!(!s.is_open);
        assert_eq!(read_sent(&mut server_read).await, "PURGE 77\r\n");
    }

    #[tokio::test]
    async fn malformed_chunk_header_is_fatal() {
        let mut payload = make_record("GE", "WLF", "", "BHZ", 9);
        payload.extend_from_slice(b"CHUNK 100x\r\n");
        let (mut conn, _close, _server_read) = serve(payload).await;
        let mut s = session(512, true);

        let result = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ArclinkError::MalformedSize { .. }))
        ));
    }

    #[tokio::test]
    async fn dump_receives_raw_bytes() {
        let mut payload = vec![0xFF; 512];
        payload.extend(make_record("GE", "WLF", "", "BHZ", 9));
        let (mut conn, _close, _server_read) = serve(payload.clone()).await;
        let mut s = session(1024, false);

        let path = std::env::temp_dir().join(format!("arclink-dump-{}.mseed", std::process::id()));
        let mut file = File::create(&path).await.unwrap();
        next_record(&mut conn, &mut s, &MiniSeedDecoder, Some(&mut file))
            .await
            .unwrap()
            .unwrap();
        file.flush().await.unwrap();
        drop(file);

        let written = tokio::fs::read(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();
        assert_eq!(written, payload);
    }

    #[tokio::test]
    async fn interrupted_mid_record() {
        // Half a record, then silence.
        let payload = make_record("GE", "WLF", "", "BHZ", 9)[..300].to_vec();
        let (mut conn, close, _server_read) = serve(payload).await;
        let mut s = session(512, false);

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            close.send_replace(true);
            close
        });

        let result = next_record(&mut conn, &mut s, &MiniSeedDecoder, None).await;
        assert!(matches!(result, Err(ClientError::Interrupted)));
        assert_eq!(s.remaining_bytes, 512);
        closer.await.unwrap();
    }
}
