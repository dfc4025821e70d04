//! Topic sender
//!
//! One sender per (scope, topic). It serves the topic URI on the side channel
//! and fans messages from any number of publishing components into the
//! connection of the receiver that dialed in.
//!
//! # Architecture
//!
//! ```text
//!   component A ──► PublisherHandle ─┐
//!   component B ──► PublisherHandle ─┼─► SenderShared ──► ConnectionHandle ──► TCP
//!   component A ──► (clone, same     │    bound: component -> BoundState
//!                    bound entry)  ──┘    connection: Option<ConnectionHandle>
//!                                              ▲
//!                       EndpointServer ────────┘ ready / close
//! ```
//!
//! Sends are at-most-once: without a live connection the message is dropped
//! and the caller gets [`ServiceError::NotConnected`](crate::error::ServiceError::NotConnected).

pub mod gate;
pub mod publisher;

pub use gate::FirstSendGate;
pub use publisher::PublisherHandle;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::error::SetupError;
use crate::matching::ComponentId;
use crate::protocol::create_uri;
use crate::serializer::SerializerRegistry;
use crate::server::{ConnectionHandle, EndpointServer, SocketHandler};
use crate::stats::SenderMetricsSnapshot;
use crate::sync::{LockRank, RankedMutex};

use publisher::BoundState;

struct BoundEntry {
    usage_count: usize,
    state: Arc<BoundState>,
}

pub(crate) struct SenderShared {
    scope: Option<String>,
    topic: String,
    serialization_type: String,
    uri: String,
    origin: Uuid,
    registry: Arc<SerializerRegistry>,
    gate: Arc<FirstSendGate>,
    metrics_enabled: bool,
    connection: RankedMutex<Option<ConnectionHandle>>,
    bound: RankedMutex<HashMap<ComponentId, BoundEntry>>,
    closed: AtomicBool,
}

impl SenderShared {
    fn get(&self, component: ComponentId) -> Arc<BoundState> {
        // Handles taken after shutdown stay detached from the bound map
        if self.closed.load(Ordering::Acquire) {
            return Arc::new(BoundState::new(component));
        }
        let mut bound = self.bound.lock();
        let entry = bound.entry(component).or_insert_with(|| BoundEntry {
            usage_count: 0,
            state: Arc::new(BoundState::new(component)),
        });
        entry.usage_count += 1;
        Arc::clone(&entry.state)
    }

    fn unget(&self, component: ComponentId) {
        let mut bound = self.bound.lock();
        if let Some(entry) = bound.get_mut(&component) {
            entry.usage_count -= 1;
            if entry.usage_count == 0 {
                bound.remove(&component);
                tracing::debug!(uri = %self.uri, component, "Publisher released");
            }
        }
    }
}

/// Routes side-channel callbacks to a sender without keeping it alive
struct SenderSocket(Weak<SenderShared>);

impl SocketHandler for SenderSocket {
    fn ready(&self, connection: ConnectionHandle) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        tracing::info!(
            uri = %shared.uri,
            peer = %connection.peer(),
            connection_id = connection.id(),
            "Receiver connected"
        );
        *shared.connection.lock() = Some(connection);
    }

    fn close(&self, connection_id: u64) {
        let Some(shared) = self.0.upgrade() else {
            return;
        };
        let mut connection = shared.connection.lock();
        if connection.as_ref().map(|c| c.id()) == Some(connection_id) {
            *connection = None;
            tracing::info!(uri = %shared.uri, connection_id, "Receiver disconnected");
        }
    }
}

/// Sender for one (scope, topic)
pub struct TopicSender {
    shared: Arc<SenderShared>,
    server: Arc<EndpointServer>,
}

impl TopicSender {
    /// Create the sender and serve its URI on `server`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server: Arc<EndpointServer>,
        registry: Arc<SerializerRegistry>,
        gate: Arc<FirstSendGate>,
        origin: Uuid,
        scope: Option<&str>,
        topic: &str,
        serialization_type: &str,
        metrics_enabled: bool,
    ) -> Result<Self, SetupError> {
        let uri = create_uri(scope, topic);
        let shared = Arc::new(SenderShared {
            scope: scope.map(str::to_string),
            topic: topic.to_string(),
            serialization_type: serialization_type.to_string(),
            uri: uri.clone(),
            origin,
            registry,
            gate,
            metrics_enabled,
            connection: RankedMutex::new(LockRank::Entity, "sender.connection", None),
            bound: RankedMutex::new(LockRank::Entity, "sender.bound", HashMap::new()),
            closed: AtomicBool::new(false),
        });

        server.register(&uri, Arc::new(SenderSocket(Arc::downgrade(&shared))))?;

        Ok(Self { shared, server })
    }

    pub fn scope(&self) -> Option<&str> {
        self.shared.scope.as_deref()
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn serialization_type(&self) -> &str {
        &self.shared.serialization_type
    }

    pub fn uri(&self) -> &str {
        &self.shared.uri
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connection.lock().is_some()
    }

    /// Publisher for `component`; every handle of the same component shares
    /// one bound entry
    pub fn publisher(&self, component: ComponentId) -> PublisherHandle {
        let state = self.shared.get(component);
        PublisherHandle::new(Arc::clone(&self.shared), state)
    }

    /// Number of components holding a publisher
    pub fn bound_count(&self) -> usize {
        self.shared.bound.lock().len()
    }

    pub fn metrics(&self) -> Vec<SenderMetricsSnapshot> {
        let states: Vec<Arc<BoundState>> = self
            .shared
            .bound
            .lock()
            .values()
            .map(|e| Arc::clone(&e.state))
            .collect();

        states
            .iter()
            .flat_map(|state| state.snapshots(&self.shared))
            .collect()
    }

    /// Unregister the URI and release every bound entry
    ///
    /// A send already past its connection lookup may still complete.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.server.unregister(&self.shared.uri);
        self.shared.bound.lock().clear();
        *self.shared.connection.lock() = None;
        tracing::info!(uri = %self.shared.uri, "Topic sender destroyed");
    }
}
