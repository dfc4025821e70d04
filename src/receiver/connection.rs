//! Requested connections of a topic receiver
//!
//! Every known remote publisher is one entry keyed `address:port`. An entry
//! owns at most one connection task (dial, preamble, read loop); aborting that
//! task force-closes the socket.
//!
//! ```text
//!               dial ok                 socket closed / read error
//! Unconnected ─────────► Dialing ──► Connected ─────────────────────► Unconnected
//!      ▲                    │
//!      └── dial failed ─────┘   (retried on the next reconnect tick)
//! ```

use std::sync::Weak;
use std::time::SystemTime;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::{Error, HandshakeError, Result};
use crate::protocol::{connection_key, handshake, FrameDecoder, WireMessage};
use crate::receiver::ReceiverShared;

/// Connection state of one requested remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unconnected,
    Dialing,
    Connected,
}

/// One remote publisher this receiver wants to be connected to
#[derive(Debug)]
pub struct RequestedConnection {
    pub address: String,
    pub port: u16,
    pub state: LinkState,
    /// Consecutive failed dials
    pub retry_count: u32,
    /// Configured statically rather than discovered
    pub statically: bool,
    /// Receiver-wide dial generation; stale task callbacks carry an older one
    pub(crate) generation: u64,
    pub(crate) link: Option<AbortHandle>,
}

impl RequestedConnection {
    pub fn new(address: impl Into<String>, port: u16, statically: bool) -> Self {
        Self {
            address: address.into(),
            port,
            state: LinkState::Unconnected,
            retry_count: 0,
            statically,
            generation: 0,
            link: None,
        }
    }

    pub fn key(&self) -> String {
        connection_key(&self.address, self.port)
    }

    /// `address:port` plus a ` (static)` marker
    pub fn describe(&self) -> String {
        if self.statically {
            format!("{} (static)", self.key())
        } else {
            self.key()
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort();
        }
        self.state = LinkState::Unconnected;
    }
}

/// A frame taken off the socket, waiting for dispatch
#[derive(Debug)]
pub struct ReceivedFrame {
    pub message: WireMessage,
    pub received_at: SystemTime,
}

/// Parse a space separated `host:port` list
///
/// Tokens without a colon are skipped; an invalid or non-positive port is
/// logged and skipped.
pub fn parse_static_urls(urls: &str) -> Vec<(String, u16)> {
    let mut parsed = Vec::new();
    for token in urls.split_whitespace() {
        let Some((host, port)) = token.rsplit_once(':') else {
            tracing::debug!(url = token, "Skipping static url without port");
            continue;
        };
        match port.parse::<i64>() {
            Ok(port) if port > 0 && port <= u16::MAX as i64 => {
                parsed.push((host.to_string(), port as u16));
            }
            _ => {
                tracing::warn!(url = token, "Invalid port in static url");
            }
        }
    }
    parsed
}

/// Connection task: dial, preamble, then read frames until the socket closes
pub(crate) async fn run_connection(
    shared: Weak<ReceiverShared>,
    key: String,
    generation: u64,
    address: String,
    port: u16,
) {
    let Some(strong) = shared.upgrade() else {
        return;
    };
    let settings = strong.settings.clone();
    let uri = strong.uri.clone();
    let frames = strong.frames.clone();
    drop(strong);

    let dialed = dial(&address, port, &uri, &settings).await;
    let (mut stream, mut buf) = match dialed {
        Ok(dialed) => dialed,
        Err(e) => {
            if let Some(shared) = shared.upgrade() {
                shared.on_dial_failed(&key, generation, &e);
            }
            return;
        }
    };

    match shared.upgrade() {
        Some(shared) if shared.on_connected(&key, generation) => {}
        _ => return,
    }

    let decoder = FrameDecoder::new(settings.max_payload_size);
    let reason = loop {
        match decoder.decode(&mut buf) {
            Ok(Some(message)) => {
                let frame = ReceivedFrame {
                    message,
                    received_at: SystemTime::now(),
                };
                if frames.send(frame).is_err() {
                    break "receiver stopped".to_string();
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => break e.to_string(),
        }

        match stream.read_buf(&mut buf).await {
            Ok(0) => break "closed by peer".to_string(),
            Ok(_) => {}
            Err(e) => break e.to_string(),
        }
    };

    if let Some(shared) = shared.upgrade() {
        shared.on_disconnected(&key, generation, &reason);
    }
}

async fn dial(
    address: &str,
    port: u16,
    uri: &str,
    settings: &super::ReceiverSettings,
) -> Result<(TcpStream, BytesMut)> {
    let mut stream = tokio::time::timeout(
        settings.connect_timeout,
        TcpStream::connect((address, port)),
    )
    .await
    .map_err(|_| Error::Handshake(HandshakeError::Timeout))??;
    stream.set_nodelay(true)?;

    let leftover = handshake::dial(&mut stream, uri, settings.handshake_timeout).await?;
    Ok((stream, leftover))
}

/// Sender side used by a connection task
pub(crate) type FrameSender = mpsc::UnboundedSender<ReceivedFrame>;
