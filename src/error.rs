//! Error types for the transport admin
//!
//! Setup and protocol errors are returned synchronously to the caller.
//! Connectivity and data errors never leave the background tasks; they are
//! logged and counted instead.

use std::io;

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Sender/receiver lifecycle errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("topic sender for {key} already exists")]
    SenderExists { key: String },

    #[error("topic receiver for {key} already exists")]
    ReceiverExists { key: String },

    #[error("no topic sender for {key}")]
    SenderNotFound { key: String },

    #[error("no topic receiver for {key}")]
    ReceiverNotFound { key: String },

    #[error("no serializer registered for serialization type {0:?}")]
    UnknownSerializer(String),

    #[error("uri {0} is already served")]
    UriInUse(String),
}

/// Malformed endpoints and wire frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("endpoint {uuid} has no socket address")]
    MissingSocketAddress { uuid: String },

    #[error("endpoint {uuid} has invalid socket port {port:?}")]
    InvalidSocketPort { uuid: String, port: Option<String> },

    #[error("endpoint has no uuid")]
    MissingEndpointUuid,

    #[error("frame payload of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid message header: {0}")]
    InvalidHeader(&'static str),
}

/// Side-channel connection preamble failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("bad handshake magic")]
    BadMagic,

    #[error("uri is not valid utf-8")]
    InvalidUri,

    #[error("uri of {0} bytes is too long")]
    UriTooLong(usize),

    #[error("peer rejected uri {0}")]
    Rejected(String),

    #[error("handshake timed out")]
    Timeout,
}

/// Failures reported by `PublisherHandle::send`
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no connection for {uri}, message dropped")]
    NotConnected { uri: String },

    #[error("no serializer for message type {type_id} ({serialization_type})")]
    NoSerializer {
        serialization_type: String,
        type_id: u32,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] CodecError),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("topic sender was torn down")]
    Closed,
}

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message is not a {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Returned from `Subscriber::init`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("subscriber init failed: {0}")]
pub struct SubscriberError(pub String);
