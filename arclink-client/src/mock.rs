use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arclink_rs_protocol::Command;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Scripted replies of the mock ArcLink server.
pub struct MockConfig {
    pub software: String,
    pub organization: String,
    pub reject_hello: bool,
    pub user_reply: String,
    pub institution_reply: String,
    pub request_reply: String,
    pub end_reply: String,
    pub bcdownload_reply: String,
    pub bdownload_reply: String,
    /// Written right after a download reply that announces data.
    pub payload: Vec<u8>,
    pub close_after_payload: bool,
    pub max_connections: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            software: "ArcLink v1.2 (mock)".to_owned(),
            organization: "Mock Archive".to_owned(),
            reject_hello: false,
            user_reply: "OK".to_owned(),
            institution_reply: "OK".to_owned(),
            request_reply: "OK".to_owned(),
            end_reply: "1042".to_owned(),
            bcdownload_reply: "END".to_owned(),
            bdownload_reply: "END".to_owned(),
            payload: Vec::new(),
            close_after_payload: false,
            max_connections: 1,
        }
    }
}

impl MockConfig {
    /// Answer `BCDOWNLOAD` with `reply` followed by `payload`.
    pub fn transfer(reply: &str, payload: Vec<u8>) -> Self {
        Self {
            bcdownload_reply: reply.to_owned(),
            payload,
            ..Self::default()
        }
    }
}

/// Lines received by the mock server, one list per accepted connection.
#[derive(Clone, Debug, Default)]
pub struct Captured {
    connections: Vec<Vec<String>>,
}

impl Captured {
    pub fn connection(&self, index: usize) -> Vec<String> {
        self.connections[index].clone()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

type Log = Arc<Mutex<Vec<Vec<String>>>>;

pub struct MockServer {
    addr: SocketAddr,
    log: Log,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log: Log = Arc::default();

        let accept_log = log.clone();
        tokio::spawn(async move {
            let config = Arc::new(config);
            for _ in 0..config.max_connections {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let index = {
                    let mut log = accept_log.lock().unwrap();
                    log.push(Vec::new());
                    log.len() - 1
                };
                tokio::spawn(handle_connection(
                    stream,
                    config.clone(),
                    accept_log.clone(),
                    index,
                ));
            }
        });

        Self { addr, log }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn captured(&self) -> Captured {
        Captured {
            connections: self.log.lock().unwrap().clone(),
        }
    }

    /// Wait until connection `index` has received `line`.
    ///
    /// Needed for fire-and-forget lines such as `PURGE`, which the client
    /// sends without waiting for the server to read them.
    pub async fn wait_for_line(&self, index: usize, line: &str) -> bool {
        for _ in 0..200 {
            let seen = self
                .log
                .lock()
                .unwrap()
                .get(index)
                .is_some_and(|lines| lines.iter().any(|l| l == line));
            if seen {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn handle_connection(stream: TcpStream, config: Arc<MockConfig>, log: Log, index: usize) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let received = line.trim_end_matches(['\r', '\n']).to_owned();
        log.lock().unwrap()[index].push(received.clone());

        let Ok(cmd) = Command::parse(&received) else {
            continue;
        };

        let mut out = Vec::new();
        let mut transfer = false;
        match cmd {
            Command::Hello if config.reject_hello => push_line(&mut out, "ERROR"),
            Command::Hello => {
                push_line(&mut out, &config.software);
                push_line(&mut out, &config.organization);
            }
            Command::User { .. } => push_line(&mut out, &config.user_reply),
            Command::Institution { .. } => push_line(&mut out, &config.institution_reply),
            Command::Request { .. } => push_line(&mut out, &config.request_reply),
            Command::End => push_line(&mut out, &config.end_reply),
            Command::BcDownload { .. } => {
                push_line(&mut out, &config.bcdownload_reply);
                transfer = announces_data(&config.bcdownload_reply);
            }
            Command::BDownload { .. } => {
                push_line(&mut out, &config.bdownload_reply);
                transfer = announces_data(&config.bdownload_reply);
            }
            Command::StreamLine(_) | Command::Purge { .. } => {}
        }

        if transfer {
            out.extend_from_slice(&config.payload);
        }
        if !out.is_empty() {
            if write_half.write_all(&out).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
        if transfer && config.close_after_payload {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn announces_data(reply: &str) -> bool {
    reply != "ERROR" && reply != "END"
}

/// Build a big-endian miniSEED v2 record of `2^exponent` bytes carrying a
/// blockette 1000.
pub fn make_record(
    network: &str,
    station: &str,
    location: &str,
    channel: &str,
    exponent: u8,
) -> Vec<u8> {
    let mut rec = vec![0u8; 1usize << exponent];
    rec[0..6].copy_from_slice(b"000001");
    rec[6] = b'D';
    rec[7] = b' ';
    put_padded(&mut rec[8..13], station);
    put_padded(&mut rec[13..15], location);
    put_padded(&mut rec[15..18], channel);
    put_padded(&mut rec[18..20], network);
    rec[20..22].copy_from_slice(&2024u16.to_be_bytes());
    rec[22..24].copy_from_slice(&15u16.to_be_bytes());
    rec[30..32].copy_from_slice(&0u16.to_be_bytes());
    rec[32..34].copy_from_slice(&20i16.to_be_bytes());
    rec[34..36].copy_from_slice(&1i16.to_be_bytes());
    rec[39] = 1;
    rec[44..46].copy_from_slice(&64u16.to_be_bytes());
    rec[46..48].copy_from_slice(&48u16.to_be_bytes());
    rec[48..50].copy_from_slice(&1000u16.to_be_bytes());
    rec[52] = 10;
    rec[53] = 1;
    rec[54] = exponent;
    rec
}

fn put_padded(dst: &mut [u8], s: &str) {
    dst.fill(b' ');
    dst[..s.len()].copy_from_slice(s.as_bytes());
}
