//! Wire protocol
//!
//! Fixed message header, frame codec, version compatibility, topic URI
//! derivation and the side-channel connection preamble.

pub mod constants;
pub mod handshake;
pub mod header;
pub mod uri;

pub use constants::*;
pub use handshake::{Handshake, HandshakeRole};
pub use header::{is_version_compatible, FrameDecoder, MessageHeader, WireMessage};
pub use uri::{connection_key, create_uri, scope_topic_key};
