//! Message serializers
//!
//! Codecs are pluggable services identified by a serialization type name
//! (`"json"`, `"raw"`, ...) and a message type id. Each registered codec
//! carries the fully qualified message name and the message version used in
//! the wire header.

pub mod codecs;
pub mod registry;

pub use codecs::{JsonSerializer, RawSerializer};
pub use registry::{Removal, SerializerEntry, SerializerMap, SerializerRegistry};

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::endpoint::Properties;
use crate::error::CodecError;

/// A deserialized message handed to a subscriber
///
/// Moving the box into the subscriber callback transfers ownership.
pub type Message = Box<dyn Any + Send>;

/// Converts one message type to and from wire payloads
pub trait MessageSerializer: Send + Sync {
    fn serialize(&self, msg: &dyn Any) -> Result<Bytes, CodecError>;

    fn deserialize(&self, payload: &[u8]) -> Result<Message, CodecError>;
}

/// `major.minor[.micro]` message version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageVersion {
    pub major: u8,
    pub minor: u8,
}

impl MessageVersion {
    pub const UNVERSIONED: MessageVersion = MessageVersion { major: 0, minor: 0 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl FromStr for MessageVersion {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::Invalid(format!("bad message version {s:?}"));
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub const SERIALIZATION_TYPE: &str = "serialization.type";
pub const MSG_ID: &str = "msg.id";
pub const MSG_FQN: &str = "msg.fqn";
pub const MSG_VERSION: &str = "msg.version";

/// Description of one registered codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerInfo {
    pub serialization_type: String,
    pub msg_id: u32,
    pub fqn: String,
    pub version: MessageVersion,
}

impl SerializerInfo {
    pub fn new(
        serialization_type: impl Into<String>,
        msg_id: u32,
        fqn: impl Into<String>,
        version: MessageVersion,
    ) -> Self {
        Self {
            serialization_type: serialization_type.into(),
            msg_id,
            fqn: fqn.into(),
            version,
        }
    }

    /// Read a codec description from service properties
    ///
    /// The message id defaults to [`hash_fqn`] of the fqn and the version to
    /// `0.0`. Returns `None` when type or fqn is missing.
    pub fn from_properties(props: &Properties) -> Option<Self> {
        let serialization_type = props.get(SERIALIZATION_TYPE)?;
        let fqn = props.get(MSG_FQN)?;
        let msg_id = match props.get_as_i64(MSG_ID) {
            Some(id) => u32::try_from(id).ok()?,
            None => hash_fqn(fqn),
        };
        let version = match props.get(MSG_VERSION) {
            Some(v) => v.parse().ok()?,
            None => MessageVersion::UNVERSIONED,
        };
        Some(Self::new(serialization_type, msg_id, fqn, version))
    }
}

/// Stable message id for a fully qualified message name (djb2)
pub fn hash_fqn(fqn: &str) -> u32 {
    fqn.bytes()
        .fold(5381u32, |hash, b| hash.wrapping_mul(33).wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!("1.2.0".parse::<MessageVersion>().unwrap(), MessageVersion::new(1, 2));
        assert_eq!("3".parse::<MessageVersion>().unwrap(), MessageVersion::new(3, 0));
        assert!("x.1".parse::<MessageVersion>().is_err());
        assert!("1.300".parse::<MessageVersion>().is_err());
    }

    #[test]
    fn test_info_from_properties() {
        let props = Properties::new()
            .with(SERIALIZATION_TYPE, "json")
            .with(MSG_FQN, "example.Poi")
            .with(MSG_VERSION, "1.1.0");

        let info = SerializerInfo::from_properties(&props).unwrap();
        assert_eq!(info.serialization_type, "json");
        assert_eq!(info.msg_id, hash_fqn("example.Poi"));
        assert_eq!(info.version, MessageVersion::new(1, 1));

        let explicit = props.clone().with(MSG_ID, "7");
        assert_eq!(SerializerInfo::from_properties(&explicit).unwrap().msg_id, 7);

        let missing_fqn = Properties::new().with(SERIALIZATION_TYPE, "json");
        assert!(SerializerInfo::from_properties(&missing_fqn).is_none());
    }

    #[test]
    fn test_hash_fqn_stable() {
        assert_eq!(hash_fqn(""), 5381);
        assert_eq!(hash_fqn("a"), 5381 * 33 + 97);
        assert_ne!(hash_fqn("example.Poi"), hash_fqn("example.Poi2"));
    }
}
