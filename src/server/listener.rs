//! Side-channel endpoint server
//!
//! One TCP listener per admin. Topic senders register the URI they serve;
//! dialing receivers name a URI in the connection preamble and the connection
//! is handed to the matching sender through its [`SocketHandler`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{Result, SetupError};
use crate::protocol::handshake;
use crate::server::config::ServerConfig;
use crate::sync::{LockRank, RankedMutex};

/// Connection callbacks for one served URI
pub trait SocketHandler: Send + Sync {
    /// A dialer completed the preamble for this URI
    fn ready(&self, connection: ConnectionHandle);

    /// The connection with this id is gone
    fn close(&self, connection_id: u64);
}

/// Write side of one accepted connection
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    peer: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one complete frame; concurrent writers never interleave
    pub async fn write_frame(&self, frame: &Bytes) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await
    }

    async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

struct Route {
    handler: Arc<dyn SocketHandler>,
    /// Flipped to `true` on unregister; closes every connection of the route
    closed: watch::Sender<bool>,
}

struct ServerShared {
    config: ServerConfig,
    routes: RankedMutex<HashMap<String, Route>>,
    next_connection_id: AtomicU64,
}

/// Side-channel server
pub struct EndpointServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl EndpointServer {
    /// Bind and start accepting
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Endpoint server listening");

        let shared = Arc::new(ServerShared {
            config,
            routes: RankedMutex::new(LockRank::Entity, "server.routes", HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        });

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));

        Ok(Self {
            shared,
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address to publish in endpoints
    pub fn advertised_address(&self) -> String {
        match &self.shared.config.advertised_address {
            Some(address) => address.clone(),
            None => self.local_addr.ip().to_string(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Serve `uri` with `handler`
    pub fn register(&self, uri: &str, handler: Arc<dyn SocketHandler>) -> std::result::Result<(), SetupError> {
        let mut routes = self.shared.routes.lock();
        if routes.contains_key(uri) {
            return Err(SetupError::UriInUse(uri.to_string()));
        }
        let (closed, _) = watch::channel(false);
        routes.insert(uri.to_string(), Route { handler, closed });
        tracing::debug!(uri = uri, "Uri registered");
        Ok(())
    }

    /// Stop serving `uri` and close its live connections
    pub fn unregister(&self, uri: &str) -> bool {
        let route = self.shared.routes.lock().remove(uri);
        match route {
            Some(route) => {
                let _ = route.closed.send(true);
                tracing::debug!(uri = uri, "Uri unregistered");
                true
            }
            None => false,
        }
    }

    pub fn uri_count(&self) -> usize {
        self.shared.routes.lock().len()
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let routes: Vec<Route> = self.shared.routes.lock().drain().map(|(_, r)| r).collect();
        for route in routes {
            let _ = route.closed.send(true);
        }
        tracing::info!(addr = %self.local_addr, "Endpoint server stopped");
    }
}

impl Drop for EndpointServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<ServerShared>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    handle_connection(shared, socket, peer).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

async fn handle_connection(shared: Arc<ServerShared>, mut socket: TcpStream, peer: SocketAddr) {
    let connection_id = shared.next_connection_id.fetch_add(1, Ordering::Relaxed);

    if shared.config.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }
    }

    let mut handshake =
        match handshake::read_request(&mut socket, shared.config.handshake_timeout).await {
            Ok(handshake) => handshake,
            Err(e) => {
                tracing::debug!(connection_id, peer = %peer, error = %e, "Handshake failed");
                return;
            }
        };
    let uri = handshake.uri().unwrap_or_default().to_string();

    let route = shared
        .routes
        .lock()
        .get(&uri)
        .map(|r| (Arc::clone(&r.handler), r.closed.subscribe()));

    let status = handshake.respond(route.is_some());
    if let Some(status) = status {
        if let Err(e) = socket.write_all(&status).await {
            tracing::debug!(connection_id, error = %e, "Failed to answer handshake");
            return;
        }
    }

    let Some((handler, mut closed)) = route else {
        tracing::debug!(connection_id, peer = %peer, uri = %uri, "Rejected unknown uri");
        return;
    };

    let (mut reader, writer) = socket.into_split();
    let connection = ConnectionHandle {
        id: connection_id,
        peer,
        writer: Arc::new(Mutex::new(writer)),
    };

    tracing::debug!(connection_id, peer = %peer, uri = %uri, "Connection ready");
    handler.ready(connection.clone());

    // Dialers never send after the preamble; reading only detects the close
    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }

    handler.close(connection_id);
    connection.shutdown().await;
    tracing::debug!(connection_id, uri = %uri, "Connection closed");
}
