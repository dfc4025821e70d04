//! Topic receiver
//!
//! One receiver per (scope, topic). It dials every known remote publisher,
//! decodes frames and fans them out to the local subscribers of the topic.
//!
//! # Architecture
//!
//! ```text
//!   connection task ─┐  (dial, preamble,       ┌──────────── worker ─────────────┐
//!   connection task ─┼─ read loop)  ─── mpsc ─►│ select!                         │
//!   connection task ─┘     ReceivedFrame       │   shutdown                      │
//!                                              │   init requested   ─► init()    │
//!   connect_to / disconnect_from ─ Notify ───► │   connect requested ─► dial     │
//!                                              │   reconnect tick   ─► both      │
//!                                              │   frame            ─► dispatch  │
//!                                              └─────────────────────────────────┘
//! ```
//!
//! Connection tasks never block on dispatch; they only push into the channel
//! with the receive timestamp. Version checks, deserialization and subscriber
//! callbacks all run on the worker.

pub mod connection;
pub mod subscriber;

pub use connection::{parse_static_urls, LinkState, ReceivedFrame, RequestedConnection};
pub use subscriber::Subscriber;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::endpoint::{self, Properties};
use crate::error::Error;
use crate::matching::ComponentId;
use crate::protocol::{connection_key, create_uri, is_version_compatible, CONNECT_RETRY_WARN_EVERY};
use crate::serializer::{SerializerEntry, SerializerRegistry};
use crate::stats::ReceiverMetricsSnapshot;
use crate::sync::{LockRank, RankedMutex};

use connection::FrameSender;
use subscriber::{SubscriberEntry, SubscriberMap};

/// Receiver tuning, taken from the admin configuration
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub metrics_enabled: bool,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_payload_size: usize,
}

#[derive(Default)]
struct ConnectionMap {
    entries: HashMap<String, RequestedConnection>,
    /// Cached; only recomputed while `false`
    all_connected: bool,
}

/// Remote publishers split by state, `address:port` with markers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionListing {
    pub connected: Vec<String>,
    pub unconnected: Vec<String>,
}

pub(crate) struct ReceiverShared {
    scope: Option<String>,
    topic: String,
    serialization_type: String,
    uri: String,
    settings: ReceiverSettings,
    registry: Arc<SerializerRegistry>,
    connections: RankedMutex<ConnectionMap>,
    subscribers: RankedMutex<SubscriberMap>,
    frames: FrameSender,
    connect_requested: Notify,
    init_requested: Notify,
    /// Dial generations are unique across all entries, even re-added ones
    next_generation: AtomicU64,
}

impl ReceiverShared {
    /// Start a dial for every unconnected entry
    fn connect_pending(self: &Arc<Self>) {
        let mut connections = self.connections.lock();
        if connections.all_connected {
            return;
        }

        let mut all_connected = true;
        for (key, conn) in connections.entries.iter_mut() {
            match conn.state {
                LinkState::Connected => {}
                LinkState::Dialing => all_connected = false,
                LinkState::Unconnected => {
                    all_connected = false;
                    conn.generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                    conn.state = LinkState::Dialing;
                    let task = tokio::spawn(connection::run_connection(
                        Arc::downgrade(self),
                        key.clone(),
                        conn.generation,
                        conn.address.clone(),
                        conn.port,
                    ));
                    conn.link = Some(task.abort_handle());
                }
            }
        }
        connections.all_connected = all_connected;
    }

    fn on_dial_failed(&self, key: &str, generation: u64, error: &Error) {
        let mut connections = self.connections.lock();
        let Some(conn) = connections.entries.get_mut(key) else {
            return;
        };
        if conn.generation != generation {
            return;
        }

        conn.state = LinkState::Unconnected;
        conn.link = None;
        conn.retry_count += 1;
        if conn.retry_count % CONNECT_RETRY_WARN_EVERY == 0 {
            tracing::warn!(
                uri = %self.uri,
                remote = %key,
                retries = conn.retry_count,
                error = %error,
                "Still unable to connect to publisher"
            );
        } else {
            tracing::debug!(uri = %self.uri, remote = %key, error = %error, "Dial failed");
        }
        connections.all_connected = false;
    }

    fn on_connected(&self, key: &str, generation: u64) -> bool {
        let mut connections = self.connections.lock();
        let Some(conn) = connections.entries.get_mut(key) else {
            return false;
        };
        if conn.generation != generation {
            return false;
        }

        conn.state = LinkState::Connected;
        conn.retry_count = 0;
        tracing::info!(uri = %self.uri, remote = %key, "Connected to publisher");
        true
    }

    fn on_disconnected(&self, key: &str, generation: u64, reason: &str) {
        let mut connections = self.connections.lock();
        let Some(conn) = connections.entries.get_mut(key) else {
            return;
        };
        if conn.generation != generation {
            return;
        }

        conn.state = LinkState::Unconnected;
        conn.link = None;
        connections.all_connected = false;
        tracing::info!(uri = %self.uri, remote = %key, reason = reason, "Disconnected from publisher");
    }

    /// Call `init` on every subscriber that has not been initialized yet
    fn initialize_subscribers(&self) {
        let subscribers = self.subscribers.lock();
        if subscribers.all_initialized {
            return;
        }
        let pending: Vec<(ComponentId, Arc<dyn Subscriber>)> = subscribers
            .entries
            .iter()
            .filter(|(_, e)| !e.initialized)
            .map(|(id, e)| (*id, Arc::clone(&e.service)))
            .collect();
        drop(subscribers);

        // User code runs without the lock held
        let mut succeeded = Vec::with_capacity(pending.len());
        for (component, service) in pending {
            match service.init() {
                Ok(()) => succeeded.push(component),
                Err(e) => {
                    tracing::warn!(uri = %self.uri, component, error = %e, "Subscriber init failed");
                }
            }
        }

        let mut subscribers = self.subscribers.lock();
        for component in succeeded {
            if let Some(entry) = subscribers.entries.get_mut(&component) {
                entry.initialized = true;
            }
        }
        subscribers.all_initialized = subscribers.entries.values().all(|e| e.initialized);
    }

    fn dispatch(&self, frame: ReceivedFrame) {
        let header = &frame.message.header;
        let type_id = header.type_id;

        // Serializer lock before the subscriber lock
        let registered = self.registry.acquire(&self.serialization_type, type_id);

        let mut subscribers = self.subscribers.lock();
        let Some(registered) = registered else {
            for entry in subscribers.entries.values_mut() {
                entry.codecs.remove(&type_id);
            }
            drop(subscribers);
            tracing::trace!(uri = %self.uri, type_id, "No codec registered for message type");
            return;
        };
        // The registry is authoritative; the per-subscriber map only caches it
        let targets: Vec<(ComponentId, Arc<dyn Subscriber>, Arc<SerializerEntry>)> = subscribers
            .entries
            .iter_mut()
            .map(|(id, e)| {
                e.codecs.insert(type_id, Arc::clone(&registered));
                (*id, Arc::clone(&e.service), Arc::clone(&registered))
            })
            .collect();
        drop(subscribers);

        if targets.is_empty() {
            tracing::trace!(uri = %self.uri, type_id, "No subscriber for message type");
            return;
        }

        for (component, service, codec) in targets {
            if !is_version_compatible(header.major, header.minor, codec.info.version) {
                tracing::debug!(
                    uri = %self.uri,
                    msg = %codec.info.fqn,
                    remote_version = %format_args!("{}.{}", header.major, header.minor),
                    local_version = %codec.info.version,
                    "Dropping message with incompatible version"
                );
                self.update_metrics(component, type_id, header.origin, |m| m.record_version_mismatch());
                continue;
            }

            let started = Instant::now();
            match codec.codec.deserialize(&frame.message.payload) {
                Ok(msg) => {
                    let deserialization_time = started.elapsed();
                    service.receive(&codec.info.fqn, type_id, msg);
                    let now = Instant::now();
                    self.update_metrics(component, type_id, header.origin, |m| {
                        m.record_received(
                            header.seq_nr,
                            header.send_time,
                            frame.received_at,
                            deserialization_time,
                            now,
                        )
                    });
                }
                Err(e) => {
                    tracing::warn!(uri = %self.uri, msg = %codec.info.fqn, error = %e, "Deserialization failed");
                    self.update_metrics(component, type_id, header.origin, |m| {
                        m.record_serialization_error()
                    });
                }
            }
        }
    }

    fn update_metrics(
        &self,
        component: ComponentId,
        type_id: u32,
        origin: uuid::Uuid,
        update: impl FnOnce(&mut crate::stats::ReceiveMetrics),
    ) {
        if !self.settings.metrics_enabled {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        if let Some(entry) = subscribers.entries.get_mut(&component) {
            update(entry.metrics_for(type_id, origin));
        }
    }
}

async fn run_worker(
    shared: Arc<ReceiverShared>,
    mut frames: mpsc::UnboundedReceiver<ReceivedFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut reconnect = tokio::time::interval(shared.settings.retry_interval);
    reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            // Polled before frames so a new subscriber's init runs first
            _ = shared.init_requested.notified() => shared.initialize_subscribers(),
            _ = shared.connect_requested.notified() => shared.connect_pending(),
            _ = reconnect.tick() => {
                shared.connect_pending();
                shared.initialize_subscribers();
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                shared.dispatch(frame);
                while let Ok(frame) = frames.try_recv() {
                    shared.dispatch(frame);
                }
            }
        }
    }

    tracing::debug!(uri = %shared.uri, "Receiver worker stopped");
}

/// Receiver for one (scope, topic)
pub struct TopicReceiver {
    shared: Arc<ReceiverShared>,
    shutdown: watch::Sender<bool>,
    worker: RankedMutex<Option<JoinHandle<()>>>,
}

impl TopicReceiver {
    /// Create the receiver, seed static connections and start its worker
    pub fn new(
        registry: Arc<SerializerRegistry>,
        settings: ReceiverSettings,
        scope: Option<&str>,
        topic: &str,
        serialization_type: &str,
        static_urls: Option<&str>,
    ) -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut connections = ConnectionMap::default();
        for (address, port) in static_urls.map(parse_static_urls).unwrap_or_default() {
            let conn = RequestedConnection::new(address, port, true);
            connections.entries.insert(conn.key(), conn);
        }

        let shared = Arc::new(ReceiverShared {
            scope: scope.map(str::to_string),
            topic: topic.to_string(),
            serialization_type: serialization_type.to_string(),
            uri: create_uri(scope, topic),
            settings,
            registry,
            connections: RankedMutex::new(LockRank::Entity, "receiver.connections", connections),
            subscribers: RankedMutex::new(
                LockRank::Entity,
                "receiver.subscribers",
                SubscriberMap::default(),
            ),
            frames: frames_tx,
            connect_requested: Notify::new(),
            init_requested: Notify::new(),
            next_generation: AtomicU64::new(0),
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), frames_rx, shutdown_rx));
        tracing::info!(uri = %shared.uri, "Topic receiver created");

        Self {
            shared,
            shutdown,
            worker: RankedMutex::new(LockRank::Entity, "receiver.worker", Some(worker)),
        }
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

    /// Request a connection to a remote publisher; idempotent
    pub fn connect_to(&self, address: &str, port: u16) {
        let key = connection_key(address, port);
        {
            let mut connections = self.shared.connections.lock();
            if connections.entries.contains_key(&key) {
                return;
            }
            connections
                .entries
                .insert(key.clone(), RequestedConnection::new(address, port, false));
            connections.all_connected = false;
        }
        tracing::debug!(uri = %self.shared.uri, remote = %key, "Connection requested");
        self.shared.connect_requested.notify_one();
    }

    /// Drop a remote publisher, closing its socket if connected; idempotent
    pub fn disconnect_from(&self, address: &str, port: u16) -> bool {
        let key = connection_key(address, port);
        let removed = self.shared.connections.lock().entries.remove(&key);
        match removed {
            Some(mut conn) => {
                conn.close();
                tracing::debug!(uri = %self.shared.uri, remote = %key, "Connection removed");
                true
            }
            None => false,
        }
    }

    pub fn link_state(&self, address: &str, port: u16) -> Option<LinkState> {
        let key = connection_key(address, port);
        self.shared.connections.lock().entries.get(&key).map(|c| c.state)
    }

    pub fn list_connections(&self) -> ConnectionListing {
        let connections = self.shared.connections.lock();
        let mut listing = ConnectionListing::default();
        for conn in connections.entries.values() {
            if conn.state == LinkState::Connected {
                listing.connected.push(conn.describe());
            } else {
                listing.unconnected.push(conn.describe());
            }
        }
        listing.connected.sort();
        listing.unconnected.sort();
        listing
    }

    /// Register a subscriber service of `component`
    ///
    /// Subscribers whose scope differs from the receiver's are ignored.
    /// Repeated registrations of one component share an entry.
    pub fn add_subscriber(
        &self,
        component: ComponentId,
        props: &Properties,
        service: Arc<dyn Subscriber>,
    ) -> bool {
        if endpoint::scope(props) != self.scope() {
            tracing::debug!(uri = %self.shared.uri, component, "Ignoring subscriber of other scope");
            return false;
        }

        let codecs = self.shared.registry.entries_for(&self.shared.serialization_type);
        {
            let mut subscribers = self.shared.subscribers.lock();
            match subscribers.entries.get_mut(&component) {
                Some(entry) => entry.usage_count += 1,
                None => {
                    subscribers
                        .entries
                        .insert(component, SubscriberEntry::new(service, codecs));
                    subscribers.all_initialized = false;
                }
            }
        }
        self.shared.init_requested.notify_one();
        true
    }

    pub fn remove_subscriber(&self, component: ComponentId, props: &Properties) -> bool {
        if endpoint::scope(props) != self.scope() {
            return false;
        }

        let mut subscribers = self.shared.subscribers.lock();
        let Some(entry) = subscribers.entries.get_mut(&component) else {
            return false;
        };
        entry.usage_count -= 1;
        if entry.usage_count == 0 {
            subscribers.entries.remove(&component);
            tracing::debug!(uri = %self.shared.uri, component, "Subscriber removed");
        }
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().entries.len()
    }

    pub fn metrics(&self) -> Vec<ReceiverMetricsSnapshot> {
        let subscribers = self.shared.subscribers.lock();
        let mut snapshots = Vec::new();
        for (component, entry) in subscribers.entries.iter() {
            for ((type_id, _), metrics) in entry.metrics.iter() {
                let msg_fqn = entry
                    .codecs
                    .get(type_id)
                    .map(|c| c.info.fqn.clone())
                    .unwrap_or_default();
                snapshots.push(ReceiverMetricsSnapshot {
                    scope: self.shared.scope.clone(),
                    topic: self.shared.topic.clone(),
                    component: *component,
                    msg_fqn,
                    metrics: metrics.clone(),
                });
            }
        }
        snapshots
    }

    /// Stop and join the worker, then release subscribers and connections
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(uri = %self.shared.uri, error = %e, "Receiver worker failed");
            }
        }

        self.shared.subscribers.lock().entries.clear();
        let connections: Vec<RequestedConnection> = self
            .shared
            .connections
            .lock()
            .entries
            .drain()
            .map(|(_, c)| c)
            .collect();
        for mut conn in connections {
            conn.close();
        }
        tracing::info!(uri = %self.shared.uri, "Topic receiver destroyed");
    }
}

impl Drop for TopicReceiver {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for conn in self.shared.connections.lock().entries.values_mut() {
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    use bytes::Bytes;
    use parking_lot::Mutex;
    use uuid::Uuid;

    use crate::endpoint::TOPIC_SCOPE;
    use crate::error::SubscriberError;
    use crate::protocol::{MessageHeader, WireMessage, DEFAULT_MAX_PAYLOAD_SIZE};
    use crate::serializer::{Message, MessageVersion, RawSerializer, SerializerInfo};

    #[derive(Default)]
    struct Collector {
        received: Mutex<Vec<(String, u32, Bytes)>>,
        init_calls: Mutex<u32>,
        fail_init: Mutex<bool>,
    }

    impl Subscriber for Collector {
        fn init(&self) -> Result<(), SubscriberError> {
            *self.init_calls.lock() += 1;
            if *self.fail_init.lock() {
                return Err(SubscriberError("not yet".to_string()));
            }
            Ok(())
        }

        fn receive(&self, msg_fqn: &str, msg_type_id: u32, msg: Message) {
            let bytes = *msg.downcast::<Bytes>().unwrap();
            self.received.lock().push((msg_fqn.to_string(), msg_type_id, bytes));
        }
    }

    fn settings() -> ReceiverSettings {
        ReceiverSettings {
            metrics_enabled: true,
            retry_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(200),
            handshake_timeout: Duration::from_millis(200),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    fn receiver(version: MessageVersion, static_urls: Option<&str>) -> TopicReceiver {
        let registry = Arc::new(SerializerRegistry::new());
        registry.insert(
            SerializerInfo::new("raw", 7, "example.Blob", version),
            Arc::new(RawSerializer),
        );
        TopicReceiver::new(registry, settings(), Some("s"), "t", "raw", static_urls)
    }

    fn frame(seq_nr: u32, major: u8, minor: u8, origin: Uuid, payload: &'static [u8]) -> ReceivedFrame {
        ReceivedFrame {
            message: WireMessage::new(
                MessageHeader {
                    type_id: 7,
                    major,
                    minor,
                    origin,
                    seq_nr,
                    send_time: UNIX_EPOCH,
                },
                Bytes::from_static(payload),
            ),
            received_at: SystemTime::now(),
        }
    }

    fn scoped() -> Properties {
        Properties::new().with(TOPIC_SCOPE, "s")
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_scope_filter_and_usage() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        let collector = Arc::new(Collector::default());

        assert!(!receiver.add_subscriber(1, &Properties::new(), collector.clone()));
        assert!(receiver.add_subscriber(1, &scoped(), collector.clone()));
        assert!(receiver.add_subscriber(1, &scoped(), collector.clone()));
        assert_eq!(receiver.subscriber_count(), 1);

        receiver.remove_subscriber(1, &scoped());
        assert_eq!(receiver.subscriber_count(), 1);
        receiver.remove_subscriber(1, &scoped());
        assert_eq!(receiver.subscriber_count(), 0);

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_init_called_once_and_retried_on_failure() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        let collector = Arc::new(Collector::default());
        *collector.fail_init.lock() = true;

        receiver.add_subscriber(1, &scoped(), collector.clone());
        wait_for(|| *collector.init_calls.lock() >= 2).await;

        *collector.fail_init.lock() = false;
        let shared = Arc::clone(&receiver.shared);
        wait_for(|| *collector.init_calls.lock() >= 3 && shared.subscribers.lock().all_initialized).await;

        let calls = *collector.init_calls.lock();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*collector.init_calls.lock(), calls);

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_version_and_sequence_metrics() {
        let receiver = receiver(MessageVersion::new(1, 1), None);
        let collector = Arc::new(Collector::default());
        receiver.add_subscriber(1, &scoped(), collector.clone());
        receiver.shared.initialize_subscribers();

        let origin = Uuid::new_v4();
        receiver.shared.dispatch(frame(1, 1, 0, origin, b"a"));
        receiver.shared.dispatch(frame(2, 1, 1, origin, b"b"));
        // Newer minor than the local codec
        receiver.shared.dispatch(frame(3, 1, 2, origin, b"dropped"));
        receiver.shared.dispatch(frame(4, 1, 0, origin, b"c"));

        let received = collector.received.lock().clone();
        let payloads: Vec<&[u8]> = received.iter().map(|(_, _, b)| b.as_ref()).collect();
        assert_eq!(payloads, vec![&b"a"[..], b"b", b"c"]);
        assert_eq!(received[0].0, "example.Blob");
        assert_eq!(received[0].1, 7);

        let metrics = receiver.metrics();
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0].metrics;
        assert_eq!(m.nr_of_messages_received, 3);
        assert_eq!(m.nr_of_version_mismatches, 1);
        // 1, 2, 4 delivered
        assert_eq!(m.nr_of_missing_seq_numbers, 1);
        assert_eq!(m.origin, origin);

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_type_not_dispatched() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        let collector = Arc::new(Collector::default());
        receiver.add_subscriber(1, &scoped(), collector.clone());
        receiver.shared.initialize_subscribers();

        let mut unknown = frame(1, 1, 0, Uuid::new_v4(), b"x");
        unknown.message.header.type_id = 8;
        receiver.shared.dispatch(unknown);

        assert!(collector.received.lock().is_empty());
        assert!(receiver.metrics().is_empty());
    }

    #[tokio::test]
    async fn test_failed_init_does_not_block_delivery() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        let collector = Arc::new(Collector::default());
        *collector.fail_init.lock() = true;
        receiver.add_subscriber(1, &scoped(), collector.clone());
        receiver.shared.initialize_subscribers();
        assert!(!receiver.shared.subscribers.lock().all_initialized);

        receiver.shared.dispatch(frame(1, 1, 0, Uuid::new_v4(), b"a"));

        let received = collector.received.lock().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].2, Bytes::from_static(b"a"));

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_withdrawn_codec_stops_delivery() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        receiver.shared.registry.insert(
            SerializerInfo::new("raw", 8, "example.Other", MessageVersion::new(1, 0)),
            Arc::new(RawSerializer),
        );
        let collector = Arc::new(Collector::default());
        receiver.add_subscriber(1, &scoped(), collector.clone());
        receiver.shared.initialize_subscribers();

        let other = |seq_nr: u32, payload: &'static [u8]| {
            let mut f = frame(seq_nr, 1, 0, Uuid::new_v4(), payload);
            f.message.header.type_id = 8;
            f
        };
        receiver.shared.dispatch(other(1, b"first"));
        assert_eq!(collector.received.lock().len(), 1);
        assert_eq!(collector.received.lock()[0].0, "example.Other");

        assert!(receiver.shared.registry.remove("raw", 8).removed);
        receiver.shared.dispatch(other(2, b"after removal"));
        assert_eq!(collector.received.lock().len(), 1);
        assert!(receiver
            .shared
            .subscribers
            .lock()
            .entries
            .values()
            .all(|e| !e.codecs.contains_key(&8)));

        // Other types are unaffected
        receiver.shared.dispatch(frame(1, 1, 0, Uuid::new_v4(), b"blob"));
        assert_eq!(collector.received.lock().len(), 2);
        assert_eq!(collector.received.lock()[1].1, 7);

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_readded_connection_ignores_stale_callbacks() {
        let receiver = receiver(MessageVersion::new(1, 0), None);
        let key = connection_key("127.0.0.1", 1);
        let generation = |r: &TopicReceiver| r.shared.connections.lock().entries[&key].generation;

        receiver.connect_to("127.0.0.1", 1);
        receiver.shared.connect_pending();
        let first = generation(&receiver);

        assert!(receiver.disconnect_from("127.0.0.1", 1));
        receiver.connect_to("127.0.0.1", 1);
        receiver.shared.connect_pending();
        let second = generation(&receiver);
        assert_ne!(first, second);

        // A callback from the first dial must not touch the new entry
        assert!(!receiver.shared.on_connected(&key, first));
        assert_eq!(receiver.link_state("127.0.0.1", 1), Some(LinkState::Dialing));

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_static_and_dynamic_connections_listed() {
        let receiver = receiver(MessageVersion::new(1, 0), Some("127.0.0.1:1 nohost"));

        receiver.connect_to("127.0.0.1", 2);
        receiver.connect_to("127.0.0.1", 2);

        let listing = receiver.list_connections();
        assert!(listing.connected.is_empty());
        assert_eq!(
            listing.unconnected,
            vec!["127.0.0.1:1 (static)".to_string(), "127.0.0.1:2".to_string()]
        );

        assert!(receiver.disconnect_from("127.0.0.1", 2));
        assert!(!receiver.disconnect_from("127.0.0.1", 2));
        assert_eq!(receiver.list_connections().unconnected.len(), 1);

        receiver.shutdown().await;
        assert_eq!(receiver.list_connections(), ConnectionListing::default());
    }
}
