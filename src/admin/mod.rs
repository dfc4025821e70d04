//! Transport admin
//!
//! Top-level orchestrator for the socket transport. The host framework calls
//! into it to score publishers and subscribers, to create and destroy the
//! per-topic senders and receivers, and to report endpoints discovered
//! elsewhere.
//!
//! # Architecture
//!
//! ```text
//!                          TransportAdmin
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │ SerializerRegistry (rank 0)                                   │
//!   │ senders    "scope:topic" -> TopicSender   ──► EndpointServer  │
//!   │ receivers  "scope:topic" -> TopicReceiver ──► dial tasks      │
//!   │ discovered uuid -> Properties                                 │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every map has its own lock and no lock spans two maps. When both are
//! needed the serializer lock is taken first. Setup and teardown of one kind
//! are serialized by a lifecycle lock so a teardown always completes before a
//! setup of the same key can observe the map.

pub mod command;
pub mod config;

pub use command::{ReceiverSummary, SenderSummary};
pub use config::AdminConfig;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use uuid::Uuid;

use crate::endpoint::{
    self, create_endpoint, EndpointRole, Properties, CONTAINER_NAME, ENDPOINT_ADMIN_TYPE,
    ENDPOINT_VISIBILITY, SOCKET_ADDRESS, SOCKET_PORT, SOCKET_URI, VISIBILITY_LOCAL,
};
use crate::error::{ProtocolError, Result, SetupError};
use crate::matching::{self, ComponentId, MatchOutcome, NoTopicProperties, TopicPropertiesProvider};
use crate::protocol::{scope_topic_key, ADMIN_TYPE};
use crate::receiver::{ReceiverSettings, Subscriber, TopicReceiver};
use crate::sender::{FirstSendGate, PublisherHandle, TopicSender};
use crate::serializer::{MessageSerializer, SerializerInfo, SerializerRegistry};
use crate::server::EndpointServer;
use crate::stats::AdminMetrics;
use crate::sync::{LockRank, RankedMutex};

/// Socket transport admin
pub struct TransportAdmin {
    config: AdminConfig,
    framework_uuid: Uuid,
    server: Arc<EndpointServer>,
    registry: Arc<SerializerRegistry>,
    gate: Arc<FirstSendGate>,
    topic_properties: Arc<dyn TopicPropertiesProvider>,
    senders: RankedMutex<HashMap<String, Arc<TopicSender>>>,
    receivers: RankedMutex<HashMap<String, Arc<TopicReceiver>>>,
    discovered: RankedMutex<HashMap<String, Properties>>,
    sender_lifecycle: tokio::sync::Mutex<()>,
    receiver_lifecycle: tokio::sync::Mutex<()>,
}

impl TransportAdmin {
    /// Create the admin and bind its side-channel server
    pub async fn new(config: AdminConfig) -> Result<Self> {
        let server = EndpointServer::bind(config.server.clone()).await?;
        let framework_uuid = config.framework_uuid.unwrap_or_else(Uuid::new_v4);

        tracing::info!(
            framework = %framework_uuid,
            addr = %server.local_addr(),
            metrics = config.metrics_enabled,
            "Transport admin started"
        );

        Ok(Self {
            gate: Arc::new(FirstSendGate::new(config.first_send_delay)),
            framework_uuid,
            server: Arc::new(server),
            registry: Arc::new(SerializerRegistry::new()),
            topic_properties: Arc::new(NoTopicProperties),
            senders: RankedMutex::new(LockRank::AdminMap, "admin.senders", HashMap::new()),
            receivers: RankedMutex::new(LockRank::AdminMap, "admin.receivers", HashMap::new()),
            discovered: RankedMutex::new(LockRank::AdminMap, "admin.discovered", HashMap::new()),
            sender_lifecycle: tokio::sync::Mutex::new(()),
            receiver_lifecycle: tokio::sync::Mutex::new(()),
            config,
        })
    }

    /// Use `provider` for per-component topic properties when scoring
    pub fn with_topic_properties_provider(mut self, provider: Arc<dyn TopicPropertiesProvider>) -> Self {
        self.topic_properties = provider;
        self
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn framework_uuid(&self) -> Uuid {
        self.framework_uuid
    }

    /// Bound address of the side-channel server
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn match_publisher(&self, requester: ComponentId, request: &Properties) -> MatchOutcome {
        self.score(requester, request, true)
    }

    pub fn match_subscriber(&self, provider: ComponentId, request: &Properties) -> MatchOutcome {
        self.score(provider, request, false)
    }

    fn score(&self, component: ComponentId, request: &Properties, publisher: bool) -> MatchOutcome {
        let outcome = matching::score(
            component,
            request,
            publisher,
            ADMIN_TYPE,
            &self.config.scores,
            &self.registry,
            self.topic_properties.as_ref(),
        );
        tracing::debug!(
            component,
            publisher,
            topic = endpoint::topic(request).unwrap_or_default(),
            score = outcome.score,
            serializer = outcome.serializer.as_deref().unwrap_or_default(),
            "Scored request"
        );
        outcome
    }

    /// True when the endpoint was published by a socket transport admin
    pub fn match_discovered_endpoint(&self, ep: &Properties) -> bool {
        ep.get(ENDPOINT_ADMIN_TYPE) == Some(ADMIN_TYPE)
    }

    /// Create the sender for `(scope, topic)` and return its endpoint
    pub async fn setup_topic_sender(
        &self,
        scope: Option<&str>,
        topic: &str,
        topic_properties: &Properties,
        serialization_type: &str,
    ) -> Result<Properties> {
        let key = scope_topic_key(scope, topic);
        let _lifecycle = self.sender_lifecycle.lock().await;

        if !self.registry.has_type(serialization_type) {
            tracing::error!(key = %key, serializer = serialization_type, "Cannot create topic sender");
            return Err(SetupError::UnknownSerializer(serialization_type.to_string()).into());
        }
        if self.senders.lock().contains_key(&key) {
            tracing::error!(key = %key, "Topic sender already exists");
            return Err(SetupError::SenderExists { key }.into());
        }

        let sender = TopicSender::new(
            Arc::clone(&self.server),
            Arc::clone(&self.registry),
            Arc::clone(&self.gate),
            self.framework_uuid,
            scope,
            topic,
            serialization_type,
            self.config.metrics_enabled,
        )?;

        let mut ep = self.local_endpoint(
            scope,
            topic,
            EndpointRole::Publisher,
            serialization_type,
            topic_properties,
        );
        ep.set(SOCKET_ADDRESS, self.server.advertised_address());
        ep.set(SOCKET_PORT, self.server.local_addr().port().to_string());
        ep.set(SOCKET_URI, sender.uri());

        self.senders.lock().insert(key.clone(), Arc::new(sender));
        tracing::info!(key = %key, serializer = serialization_type, "Topic sender set up");
        Ok(ep)
    }

    pub async fn teardown_topic_sender(&self, scope: Option<&str>, topic: &str) -> Result<()> {
        let key = scope_topic_key(scope, topic);
        let _lifecycle = self.sender_lifecycle.lock().await;

        let removed = self.senders.lock().remove(&key);
        match removed {
            Some(sender) => {
                sender.shutdown();
                tracing::info!(key = %key, "Topic sender torn down");
                Ok(())
            }
            None => {
                tracing::error!(key = %key, "Cannot tear down unknown topic sender");
                Err(SetupError::SenderNotFound { key }.into())
            }
        }
    }

    /// Create the receiver for `(scope, topic)` and return its endpoint
    ///
    /// Publishers discovered before this call are connected right away.
    pub async fn setup_topic_receiver(
        &self,
        scope: Option<&str>,
        topic: &str,
        topic_properties: &Properties,
        serialization_type: &str,
    ) -> Result<Properties> {
        let key = scope_topic_key(scope, topic);
        let _lifecycle = self.receiver_lifecycle.lock().await;

        if !self.registry.has_type(serialization_type) {
            tracing::error!(key = %key, serializer = serialization_type, "Cannot create topic receiver");
            return Err(SetupError::UnknownSerializer(serialization_type.to_string()).into());
        }
        if self.receivers.lock().contains_key(&key) {
            tracing::error!(key = %key, "Topic receiver already exists");
            return Err(SetupError::ReceiverExists { key }.into());
        }

        let static_urls = self.config.static_urls_for(scope, topic, topic_properties);
        let receiver = Arc::new(TopicReceiver::new(
            Arc::clone(&self.registry),
            self.receiver_settings(),
            scope,
            topic,
            serialization_type,
            static_urls.as_deref(),
        ));

        let ep = self.local_endpoint(
            scope,
            topic,
            EndpointRole::Subscriber,
            serialization_type,
            topic_properties,
        );

        self.receivers.lock().insert(key.clone(), Arc::clone(&receiver));

        let publishers: Vec<Properties> = self
            .discovered
            .lock()
            .values()
            .filter(|ep| EndpointRole::from_properties(ep) == Some(EndpointRole::Publisher))
            .filter(|ep| endpoint::matches_topic_and_scope(ep, topic, scope))
            .cloned()
            .collect();
        for publisher in &publishers {
            if let Err(e) = self.connect_endpoint_to_receiver(&receiver, publisher) {
                tracing::warn!(key = %key, error = %e, "Skipping discovered publisher");
            }
        }

        tracing::info!(
            key = %key,
            serializer = serialization_type,
            replayed = publishers.len(),
            "Topic receiver set up"
        );
        Ok(ep)
    }

    pub async fn teardown_topic_receiver(&self, scope: Option<&str>, topic: &str) -> Result<()> {
        let key = scope_topic_key(scope, topic);
        let _lifecycle = self.receiver_lifecycle.lock().await;

        let removed = self.receivers.lock().remove(&key);
        match removed {
            Some(receiver) => {
                receiver.shutdown().await;
                tracing::info!(key = %key, "Topic receiver torn down");
                Ok(())
            }
            None => {
                tracing::error!(key = %key, "Cannot tear down unknown topic receiver");
                Err(SetupError::ReceiverNotFound { key }.into())
            }
        }
    }

    /// Record a remote endpoint and connect matching receivers to it
    ///
    /// A malformed publisher is still stored; the first connect error is
    /// returned after every matching receiver was tried.
    pub fn add_discovered_endpoint(&self, ep: &Properties) -> Result<()> {
        self.log_discovery("Endpoint discovered", ep);

        let mut result = Ok(());
        if EndpointRole::from_properties(ep) == Some(EndpointRole::Publisher) {
            for receiver in self.receivers_snapshot() {
                if let Err(e) = self.connect_endpoint_to_receiver(&receiver, ep) {
                    if result.is_ok() {
                        result = Err(e.into());
                    }
                }
            }
        }

        match endpoint::uuid(ep) {
            Some(uuid) => {
                self.discovered.lock().insert(uuid.to_string(), ep.clone());
            }
            None => {
                tracing::warn!("Discovered endpoint without uuid is not stored");
                if result.is_ok() {
                    result = Err(ProtocolError::MissingEndpointUuid.into());
                }
            }
        }
        result
    }

    /// Forget a remote endpoint and disconnect receivers from it
    pub fn remove_discovered_endpoint(&self, ep: &Properties) -> Result<()> {
        self.log_discovery("Endpoint removed", ep);

        let mut result = Ok(());
        if EndpointRole::from_properties(ep) == Some(EndpointRole::Publisher) {
            for receiver in self.receivers_snapshot() {
                if let Err(e) = self.disconnect_endpoint_from_receiver(&receiver, ep) {
                    if result.is_ok() {
                        result = Err(e.into());
                    }
                }
            }
        }

        if let Some(uuid) = endpoint::uuid(ep) {
            self.discovered.lock().remove(uuid);
        }
        result
    }

    /// Register a codec; returns `false` if `(type, msg id)` is already taken
    pub fn add_serializer(&self, info: SerializerInfo, codec: Arc<dyn MessageSerializer>) -> bool {
        let (serialization_type, msg_id, fqn) =
            (info.serialization_type.clone(), info.msg_id, info.fqn.clone());
        let added = self.registry.insert(info, codec);
        if added {
            tracing::debug!(serializer = %serialization_type, msg_id, msg = %fqn, "Serializer added");
        } else {
            tracing::warn!(serializer = %serialization_type, msg_id, msg = %fqn, "Serializer already registered");
        }
        added
    }

    /// Register a codec described by service properties
    pub fn add_serializer_service(&self, props: &Properties, codec: Arc<dyn MessageSerializer>) -> bool {
        match SerializerInfo::from_properties(props) {
            Some(info) => self.add_serializer(info, codec),
            None => {
                tracing::warn!("Ignoring serializer service without type or message fqn");
                false
            }
        }
    }

    /// Withdraw a codec
    ///
    /// When the last codec of a serialization type goes, every sender and
    /// receiver of that type is torn down.
    pub async fn remove_serializer(&self, serialization_type: &str, msg_id: u32) {
        let _senders_lifecycle = self.sender_lifecycle.lock().await;
        let _receivers_lifecycle = self.receiver_lifecycle.lock().await;

        let (senders, receivers) = {
            let mut serializers = self.registry.write();
            let removal = serializers.remove(serialization_type, msg_id);
            if !removal.removed {
                tracing::debug!(serializer = serialization_type, msg_id, "Unknown serializer removed");
            }
            if !removal.type_exhausted {
                return;
            }

            let senders = take_matching(&self.senders, |s| s.serialization_type() == serialization_type);
            let receivers =
                take_matching(&self.receivers, |r| r.serialization_type() == serialization_type);
            drop(serializers);
            (senders, receivers)
        };

        for sender in senders {
            sender.shutdown();
            tracing::info!(uri = %sender.uri(), serializer = serialization_type, "Topic sender removed with its serializer");
        }
        for receiver in receivers {
            receiver.shutdown().await;
            tracing::info!(uri = %receiver.uri(), serializer = serialization_type, "Topic receiver removed with its serializer");
        }
    }

    /// Publisher service of `(scope, topic)` for `component`
    ///
    /// Handles of one component share per-type state; it is released when the
    /// last handle drops.
    pub fn publisher(&self, scope: Option<&str>, topic: &str, component: ComponentId) -> Option<PublisherHandle> {
        let sender = self.senders.lock().get(&scope_topic_key(scope, topic)).cloned()?;
        Some(sender.publisher(component))
    }

    /// Route a subscriber service to the receivers of its topic
    ///
    /// Returns the number of receivers that took it.
    pub fn add_subscriber(&self, component: ComponentId, props: &Properties, service: Arc<dyn Subscriber>) -> usize {
        let Some(topic) = endpoint::topic(props) else {
            tracing::warn!(component, "Subscriber service without topic");
            return 0;
        };
        self.receivers_snapshot()
            .iter()
            .filter(|r| r.topic() == topic)
            .filter(|r| r.add_subscriber(component, props, Arc::clone(&service)))
            .count()
    }

    pub fn remove_subscriber(&self, component: ComponentId, props: &Properties) -> usize {
        let Some(topic) = endpoint::topic(props) else {
            return 0;
        };
        self.receivers_snapshot()
            .iter()
            .filter(|r| r.topic() == topic)
            .filter(|r| r.remove_subscriber(component, props))
            .count()
    }

    pub fn sender_count(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.lock().len()
    }

    pub fn topic_sender(&self, scope: Option<&str>, topic: &str) -> Option<Arc<TopicSender>> {
        self.senders.lock().get(&scope_topic_key(scope, topic)).cloned()
    }

    pub fn topic_receiver(&self, scope: Option<&str>, topic: &str) -> Option<Arc<TopicReceiver>> {
        self.receivers.lock().get(&scope_topic_key(scope, topic)).cloned()
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.lock().len()
    }

    /// Textual dump of every sender and receiver
    pub fn execute_command(&self) -> String {
        let serialization_types = self.registry.read().types();

        let mut senders: Vec<SenderSummary> = self
            .senders_snapshot()
            .iter()
            .map(|s| SenderSummary {
                scope: s.scope().map(str::to_string),
                topic: s.topic().to_string(),
                serialization_type: s.serialization_type().to_string(),
                uri: s.uri().to_string(),
                connected: s.is_connected(),
            })
            .collect();
        senders.sort_by(|a, b| a.uri.cmp(&b.uri));

        let mut receivers: Vec<ReceiverSummary> = self
            .receivers_snapshot()
            .iter()
            .map(|r| ReceiverSummary {
                scope: r.scope().map(str::to_string),
                topic: r.topic().to_string(),
                serialization_type: r.serialization_type().to_string(),
                uri: r.uri().to_string(),
                connections: r.list_connections(),
            })
            .collect();
        receivers.sort_by(|a, b| a.uri.cmp(&b.uri));

        let metrics = self.config.metrics_enabled.then(|| self.metrics());
        command::render(&serialization_types, &senders, &receivers, metrics.as_ref())
    }

    pub fn metrics(&self) -> AdminMetrics {
        AdminMetrics {
            senders: self.senders_snapshot().iter().flat_map(|s| s.metrics()).collect(),
            receivers: self.receivers_snapshot().iter().flat_map(|r| r.metrics()).collect(),
        }
    }

    /// Tear down every sender and receiver and stop the side channel
    pub async fn shutdown(&self) {
        {
            let _lifecycle = self.sender_lifecycle.lock().await;
            let senders: Vec<Arc<TopicSender>> =
                self.senders.lock().drain().map(|(_, s)| s).collect();
            for sender in senders {
                sender.shutdown();
            }
        }
        {
            let _lifecycle = self.receiver_lifecycle.lock().await;
            let receivers: Vec<Arc<TopicReceiver>> =
                self.receivers.lock().drain().map(|(_, r)| r).collect();
            for receiver in receivers {
                receiver.shutdown().await;
            }
        }
        self.discovered.lock().clear();
        self.server.shutdown();
        tracing::info!(framework = %self.framework_uuid, "Transport admin stopped");
    }

    fn local_endpoint(
        &self,
        scope: Option<&str>,
        topic: &str,
        role: EndpointRole,
        serialization_type: &str,
        topic_properties: &Properties,
    ) -> Properties {
        let mut ep = create_endpoint(
            &self.framework_uuid,
            scope,
            topic,
            role,
            ADMIN_TYPE,
            serialization_type,
            Some(topic_properties),
        );
        // Announced through the side channel, not the discovery layer
        ep.set(ENDPOINT_VISIBILITY, VISIBILITY_LOCAL);
        if let Some(name) = &self.config.container_name {
            ep.set(CONTAINER_NAME, name.as_str());
        }
        ep
    }

    fn receiver_settings(&self) -> ReceiverSettings {
        let server = self.server.config();
        ReceiverSettings {
            metrics_enabled: self.config.metrics_enabled,
            retry_interval: self.config.connect_retry_interval,
            connect_timeout: server.connect_timeout,
            handshake_timeout: server.handshake_timeout,
            max_payload_size: server.max_payload_size,
        }
    }

    fn senders_snapshot(&self) -> Vec<Arc<TopicSender>> {
        self.senders.lock().values().cloned().collect()
    }

    fn receivers_snapshot(&self) -> Vec<Arc<TopicReceiver>> {
        self.receivers.lock().values().cloned().collect()
    }

    fn log_discovery(&self, message: &str, ep: &Properties) {
        let uuid = endpoint::uuid(ep).unwrap_or_default();
        let topic = endpoint::topic(ep).unwrap_or_default();
        let role = EndpointRole::from_properties(ep).map(|r| r.as_str()).unwrap_or_default();
        if self.config.verbose {
            tracing::info!(uuid, topic, role, "{message}");
        } else {
            tracing::debug!(uuid, topic, role, "{message}");
        }
    }

    fn connect_endpoint_to_receiver(
        &self,
        receiver: &TopicReceiver,
        ep: &Properties,
    ) -> std::result::Result<(), ProtocolError> {
        if !endpoint::matches_topic_and_scope(ep, receiver.topic(), receiver.scope()) {
            return Ok(());
        }
        let (address, port) = socket_address(ep)?;
        receiver.connect_to(&address, port);
        Ok(())
    }

    fn disconnect_endpoint_from_receiver(
        &self,
        receiver: &TopicReceiver,
        ep: &Properties,
    ) -> std::result::Result<(), ProtocolError> {
        if !endpoint::matches_topic_and_scope(ep, receiver.topic(), receiver.scope()) {
            return Ok(());
        }
        let (address, port) = socket_address(ep)?;
        receiver.disconnect_from(&address, port);
        Ok(())
    }
}

/// Address and port a publisher endpoint is reachable on
fn socket_address(ep: &Properties) -> std::result::Result<(String, u16), ProtocolError> {
    let uuid = endpoint::uuid(ep).unwrap_or_default().to_string();

    let Some(address) = ep.get(SOCKET_ADDRESS) else {
        tracing::warn!(uuid = %uuid, "Publisher endpoint without socket address:\n{ep}");
        return Err(ProtocolError::MissingSocketAddress { uuid });
    };
    let port = ep
        .get_as_i64(SOCKET_PORT)
        .filter(|port| *port > 0)
        .and_then(|port| u16::try_from(port).ok());
    let Some(port) = port else {
        tracing::warn!(uuid = %uuid, "Publisher endpoint with invalid socket port:\n{ep}");
        return Err(ProtocolError::InvalidSocketPort {
            uuid,
            port: ep.get(SOCKET_PORT).map(str::to_string),
        });
    };

    Ok((address.to_string(), port))
}

/// Remove and return every map value matching `pred`
fn take_matching<T>(map: &RankedMutex<HashMap<String, Arc<T>>>, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
    let mut map = map.lock();
    let keys: Vec<String> = map
        .iter()
        .filter(|(_, v)| pred(v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.iter().filter_map(|k| map.remove(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::endpoint::{ENDPOINT_TYPE, ENDPOINT_UUID, TOPIC_NAME, TOPIC_SCOPE};
    use crate::error::Error;
    use crate::serializer::{JsonSerializer, MessageVersion, RawSerializer};

    async fn admin() -> TransportAdmin {
        let config = AdminConfig::default()
            .first_send_delay(Duration::ZERO)
            .connect_retry_interval(Duration::from_millis(20))
            .container_name("node-a");
        let admin = TransportAdmin::new(config).await.unwrap();
        admin.add_serializer(
            SerializerInfo::new("raw", 1, "example.Blob", MessageVersion::new(1, 0)),
            Arc::new(RawSerializer),
        );
        admin
    }

    fn publisher_ep(uuid: &str, topic: &str, address: Option<&str>, port: Option<&str>) -> Properties {
        let mut ep = Properties::new()
            .with(ENDPOINT_UUID, uuid)
            .with(ENDPOINT_TYPE, "publisher")
            .with(TOPIC_NAME, topic)
            .with(TOPIC_SCOPE, "s");
        if let Some(address) = address {
            ep.set(SOCKET_ADDRESS, address);
        }
        if let Some(port) = port {
            ep.set(SOCKET_PORT, port);
        }
        ep
    }

    #[tokio::test]
    async fn test_match_discovered_endpoint() {
        let admin = admin().await;
        assert!(admin.match_discovered_endpoint(&Properties::new().with(ENDPOINT_ADMIN_TYPE, "socket")));
        assert!(!admin.match_discovered_endpoint(&Properties::new().with(ENDPOINT_ADMIN_TYPE, "zmq")));
        assert!(!admin.match_discovered_endpoint(&Properties::new()));
    }

    #[tokio::test]
    async fn test_sender_endpoint_and_duplicate() {
        let admin = admin().await;

        let ep = admin
            .setup_topic_sender(Some("s"), "t", &Properties::new(), "raw")
            .await
            .unwrap();
        assert_eq!(ep.get(ENDPOINT_VISIBILITY), Some(VISIBILITY_LOCAL));
        assert_eq!(ep.get(CONTAINER_NAME), Some("node-a"));
        assert_eq!(ep.get(SOCKET_URI), Some("/pubsub/s/t"));
        assert_eq!(ep.get_as_i64(SOCKET_PORT), Some(admin.local_addr().port() as i64));
        assert_eq!(EndpointRole::from_properties(&ep), Some(EndpointRole::Publisher));

        let err = admin
            .setup_topic_sender(Some("s"), "t", &Properties::new(), "raw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Setup(SetupError::SenderExists { .. })));
        assert_eq!(admin.sender_count(), 1);
        assert!(admin.publisher(Some("s"), "t", 1).is_some());
    }

    #[tokio::test]
    async fn test_unknown_serializer_rejected() {
        let admin = admin().await;
        let err = admin
            .setup_topic_receiver(None, "t", &Properties::new(), "json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Setup(SetupError::UnknownSerializer(_))));
        assert_eq!(admin.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_unknown_fails() {
        let admin = admin().await;
        assert!(matches!(
            admin.teardown_topic_sender(None, "t").await,
            Err(Error::Setup(SetupError::SenderNotFound { .. }))
        ));
        assert!(matches!(
            admin.teardown_topic_receiver(None, "t").await,
            Err(Error::Setup(SetupError::ReceiverNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_publisher_rejected_but_stored() {
        let admin = admin().await;
        admin
            .setup_topic_receiver(Some("s"), "t", &Properties::new(), "raw")
            .await
            .unwrap();

        let err = admin
            .add_discovered_endpoint(&publisher_ep("a", "t", None, Some("5000")))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::MissingSocketAddress { .. })));

        let err = admin
            .add_discovered_endpoint(&publisher_ep("b", "t", Some("127.0.0.1"), Some("0")))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidSocketPort { .. })));

        // Other topics are not affected by a malformed endpoint
        admin
            .add_discovered_endpoint(&publisher_ep("c", "other", None, None))
            .unwrap();

        assert_eq!(admin.discovered_count(), 3);
        let receiver = admin.topic_receiver(Some("s"), "t").unwrap();
        assert_eq!(receiver.list_connections(), Default::default());

        admin.shutdown().await;
        assert_eq!(admin.discovered_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_discovered_endpoint_disconnects() {
        let admin = admin().await;
        admin
            .setup_topic_receiver(Some("s"), "t", &Properties::new(), "raw")
            .await
            .unwrap();
        let ep = publisher_ep("a", "t", Some("127.0.0.1"), Some("1"));

        admin.add_discovered_endpoint(&ep).unwrap();
        let receiver = admin.topic_receiver(Some("s"), "t").unwrap();
        let listing = receiver.list_connections();
        assert_eq!(listing.connected.len() + listing.unconnected.len(), 1);

        admin.remove_discovered_endpoint(&ep).unwrap();
        assert_eq!(admin.discovered_count(), 0);
        assert_eq!(receiver.list_connections(), Default::default());

        admin.shutdown().await;
    }

    #[tokio::test]
    async fn test_serializer_cascade() {
        let admin = admin().await;
        admin.add_serializer(
            SerializerInfo::new("json", 2, "example.Point", MessageVersion::new(1, 0)),
            Arc::new(JsonSerializer::<serde_json::Value>::new()),
        );
        admin.add_serializer(
            SerializerInfo::new("json", 3, "example.Line", MessageVersion::new(1, 0)),
            Arc::new(JsonSerializer::<serde_json::Value>::new()),
        );
        admin.setup_topic_sender(None, "a", &Properties::new(), "json").await.unwrap();
        admin.setup_topic_receiver(None, "a", &Properties::new(), "json").await.unwrap();
        admin.setup_topic_sender(None, "b", &Properties::new(), "raw").await.unwrap();
        admin.setup_topic_receiver(None, "b", &Properties::new(), "raw").await.unwrap();

        // One json codec left
        admin.remove_serializer("json", 2).await;
        assert_eq!(admin.sender_count(), 2);
        assert_eq!(admin.receiver_count(), 2);

        admin.remove_serializer("json", 3).await;
        assert!(admin.topic_sender(None, "a").is_none());
        assert!(admin.topic_receiver(None, "a").is_none());
        assert!(admin.topic_sender(None, "b").is_some());
        assert!(admin.topic_receiver(None, "b").is_some());

        admin.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_command_dump() {
        let admin = admin().await;
        admin.setup_topic_sender(Some("s"), "t", &Properties::new(), "raw").await.unwrap();
        let topic_props = Properties::new().with(crate::endpoint::STATIC_CONNECT_URLS, "127.0.0.1:1");
        admin.setup_topic_receiver(Some("s"), "t", &topic_props, "raw").await.unwrap();

        let dump = admin.execute_command();
        assert!(dump.contains("|- Topic Sender s/t"));
        assert!(dump.contains("   |- serializer type = raw"));
        assert!(dump.contains("   |- uri = /pubsub/s/t"));
        assert!(dump.contains("|- Topic Receiver s/t"));
        assert!(dump.contains("127.0.0.1:1 (static)"));
        assert!(dump.contains("Sender Metrics:"));

        admin.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscriber_routing_by_topic() {
        struct Sink;
        impl Subscriber for Sink {
            fn receive(&self, _: &str, _: u32, _: crate::serializer::Message) {}
        }

        let admin = admin().await;
        admin.setup_topic_receiver(Some("s"), "t", &Properties::new(), "raw").await.unwrap();
        admin.setup_topic_receiver(Some("s"), "u", &Properties::new(), "raw").await.unwrap();

        let props = Properties::new().with(TOPIC_NAME, "t").with(TOPIC_SCOPE, "s");
        assert_eq!(admin.add_subscriber(7, &props, Arc::new(Sink)), 1);
        assert_eq!(admin.topic_receiver(Some("s"), "t").unwrap().subscriber_count(), 1);
        assert_eq!(admin.topic_receiver(Some("s"), "u").unwrap().subscriber_count(), 0);

        assert_eq!(admin.remove_subscriber(7, &props), 1);
        assert_eq!(admin.add_subscriber(7, &Properties::new(), Arc::new(Sink)), 0);

        admin.shutdown().await;
    }
}
