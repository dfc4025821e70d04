//! Topic URIs and map keys

use crate::protocol::constants::{DEFAULT_SCOPE, URI_PREFIX};

/// Side-channel URI for a topic: `/pubsub/<scope>/<topic>`
pub fn create_uri(scope: Option<&str>, topic: &str) -> String {
    format!("{}/{}/{}", URI_PREFIX, scope.unwrap_or(DEFAULT_SCOPE), topic)
}

/// Admin map key: `<scope>:<topic>`
pub fn scope_topic_key(scope: Option<&str>, topic: &str) -> String {
    format!("{}:{}", scope.unwrap_or(DEFAULT_SCOPE), topic)
}

/// Receiver connection key: `<address>:<port>`
pub fn connection_key(address: &str, port: u16) -> String {
    format!("{address}:{port}")
}
