//! Transport constants

use std::time::Duration;

/// Admin type id advertised in endpoints (`pubsub.config`)
pub const ADMIN_TYPE: &str = "socket";

/// Scope substituted when a topic has none
pub const DEFAULT_SCOPE: &str = "default";

/// Prefix of every topic URI served on the side channel
pub const URI_PREFIX: &str = "/pubsub";

/// Encoded size of [`MessageHeader`](super::header::MessageHeader)
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 16 + 4 + 8 + 4;

/// Size of the payload length prefix following the header
pub const LENGTH_SIZE: usize = 4;

/// Default upper bound on a single payload (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Connection preamble magic sent by the dialer
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"PSA1";

/// Longest URI accepted in a connection preamble
pub const MAX_URI_LENGTH: usize = 1024;

/// Handshake status: URI accepted
pub const HANDSHAKE_ACCEPTED: u8 = 0;

/// Handshake status: no topic sender serves the URI
pub const HANDSHAKE_UNKNOWN_URI: u8 = 1;

/// Score when the request names this admin explicitly
pub const FULL_MATCH_SCORE: f64 = 200.0;

/// Score when the request cannot be served
pub const NO_MATCH_SCORE: f64 = 0.0;

pub const DEFAULT_QOS_SAMPLE_SCORE: f64 = 70.0;
pub const DEFAULT_QOS_CONTROL_SCORE: f64 = 15.0;
pub const DEFAULT_SCORE: f64 = 30.0;

/// Grace period before the very first send
pub const DEFAULT_FIRST_SEND_DELAY: Duration = Duration::from_secs(2);

/// Reconnect tick of a topic receiver
pub const DEFAULT_CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// A failed dial is only logged on every n-th consecutive failure
pub const CONNECT_RETRY_WARN_EVERY: u32 = 10;

/// Qos value for high-rate, loss-tolerant topics
pub const QOS_SAMPLE: &str = "sample";

/// Qos value for low-rate control topics
pub const QOS_CONTROL: &str = "control";
