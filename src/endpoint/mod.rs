//! Endpoint descriptions
//!
//! An endpoint is an immutable [`Properties`] bag describing one publisher or
//! subscriber instance: role, scope, topic, transport address and port,
//! serialization type and visibility. The admin keeps its own deep copy of
//! every discovered endpoint.

pub mod properties;

pub use properties::Properties;

use std::fmt;

use uuid::Uuid;

use crate::protocol::DEFAULT_SCOPE;

pub const ENDPOINT_UUID: &str = "pubsub.endpoint.uuid";
pub const ENDPOINT_FRAMEWORK_UUID: &str = "pubsub.endpoint.framework.uuid";
pub const ENDPOINT_TYPE: &str = "pubsub.endpoint.type";
pub const ENDPOINT_VISIBILITY: &str = "pubsub.endpoint.visibility";
pub const ENDPOINT_ADMIN_TYPE: &str = "pubsub.config";
pub const ENDPOINT_SERIALIZER: &str = "pubsub.serializer";
pub const TOPIC_NAME: &str = "pubsub.topic.name";
pub const TOPIC_SCOPE: &str = "pubsub.topic.scope";
pub const SOCKET_ADDRESS: &str = "pubsub.socket.address";
pub const SOCKET_PORT: &str = "pubsub.socket.port";
pub const SOCKET_URI: &str = "pubsub.socket.uri";
pub const STATIC_CONNECT_URLS: &str = "pubsub.socket.static.connect.urls";
pub const CONTAINER_NAME: &str = "container_name";
pub const QOS: &str = "qos";

pub const VISIBILITY_LOCAL: &str = "local";
pub const VISIBILITY_SYSTEM: &str = "system";

/// Publisher or subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Publisher,
    Subscriber,
}

impl EndpointRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Publisher => "publisher",
            EndpointRole::Subscriber => "subscriber",
        }
    }

    /// Role declared by an endpoint, if any
    pub fn from_properties(props: &Properties) -> Option<Self> {
        match props.get(ENDPOINT_TYPE)? {
            "publisher" => Some(EndpointRole::Publisher),
            "subscriber" => Some(EndpointRole::Subscriber),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a fresh endpoint with a new uuid
///
/// `topic_properties` are copied first so the fixed keys always win.
pub fn create_endpoint(
    framework_uuid: &Uuid,
    scope: Option<&str>,
    topic: &str,
    role: EndpointRole,
    admin_type: &str,
    serializer: &str,
    topic_properties: Option<&Properties>,
) -> Properties {
    let mut props = topic_properties.cloned().unwrap_or_default();

    props.set(ENDPOINT_UUID, Uuid::new_v4().to_string());
    props.set(ENDPOINT_FRAMEWORK_UUID, framework_uuid.to_string());
    props.set(ENDPOINT_TYPE, role.as_str());
    props.set(TOPIC_NAME, topic);
    match scope {
        Some(scope) => props.set(TOPIC_SCOPE, scope),
        None => {
            props.remove(TOPIC_SCOPE);
        }
    }
    props.set(ENDPOINT_ADMIN_TYPE, admin_type);
    props.set(ENDPOINT_SERIALIZER, serializer);

    props
}

pub fn topic(props: &Properties) -> Option<&str> {
    props.get(TOPIC_NAME)
}

pub fn scope(props: &Properties) -> Option<&str> {
    props.get(TOPIC_SCOPE)
}

pub fn uuid(props: &Properties) -> Option<&str> {
    props.get(ENDPOINT_UUID)
}

/// True when the endpoint belongs to `(scope, topic)`
///
/// An absent scope only matches an absent scope.
pub fn matches_topic_and_scope(props: &Properties, topic: &str, scope: Option<&str>) -> bool {
    self::topic(props) == Some(topic) && self::scope(props) == scope
}

/// Scope with the reserved default substituted
pub fn scope_or_default(scope: Option<&str>) -> &str {
    scope.unwrap_or(DEFAULT_SCOPE)
}
