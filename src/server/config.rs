//! Side-channel configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Side-channel server and socket options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to; port 0 picks an ephemeral port
    pub bind_addr: SocketAddr,

    /// Address published in endpoints (defaults to the bind ip)
    pub advertised_address: Option<String>,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Preamble must complete within this time
    pub handshake_timeout: Duration,

    /// Receiver dial timeout
    pub connect_timeout: Duration,

    /// Largest accepted frame payload
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            advertised_address: None,
            tcp_nodelay: true, // Small frames, latency matters
            handshake_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn advertised_address(mut self, address: impl Into<String>) -> Self {
        self.advertised_address = Some(address.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }
}
