//! Wire message framing
//!
//! ```text
//! +---------+-------+-------+-----------+--------+-----------+------------+--------+---------+
//! | type id | major | minor | origin    | seq nr | send secs | send nanos | length | payload |
//! | u32     | u8    | u8    | 16 bytes  | u32    | u64       | u32        | u32    | ...     |
//! +---------+-------+-------+-----------+--------+-----------+------------+--------+---------+
//! ```
//!
//! All integers are in host byte order. Peers on different architectures are
//! not supported.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::protocol::constants::{HEADER_SIZE, LENGTH_SIZE};
use crate::serializer::MessageVersion;

/// Fixed message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type id
    pub type_id: u32,
    /// Major version of the message definition
    pub major: u8,
    /// Minor version of the message definition
    pub minor: u8,
    /// Framework uuid of the sending process
    pub origin: Uuid,
    /// Per-type sequence number, starting at 1
    pub seq_nr: u32,
    /// Wall clock time the frame was written
    pub send_time: SystemTime,
}

impl MessageHeader {
    /// Header template for one message type; `seq_nr` and `send_time` are
    /// stamped per send
    pub fn template(type_id: u32, version: MessageVersion, origin: Uuid) -> Self {
        Self {
            type_id,
            major: version.major,
            minor: version.minor,
            origin,
            seq_nr: 0,
            send_time: UNIX_EPOCH,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let since_epoch = self
            .send_time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);

        buf.put_u32_ne(self.type_id);
        buf.put_u8(self.major);
        buf.put_u8(self.minor);
        buf.put_slice(self.origin.as_bytes());
        buf.put_u32_ne(self.seq_nr);
        buf.put_u64_ne(since_epoch.as_secs());
        buf.put_u32_ne(since_epoch.subsec_nanos());
    }

    /// Decode a header; `buf` must hold at least [`HEADER_SIZE`] bytes
    pub fn decode(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader("truncated header"));
        }

        let type_id = buf.get_u32_ne();
        let major = buf.get_u8();
        let minor = buf.get_u8();
        let mut origin = [0u8; 16];
        buf.copy_to_slice(&mut origin);
        let seq_nr = buf.get_u32_ne();
        let secs = buf.get_u64_ne();
        let nanos = buf.get_u32_ne();
        if nanos >= 1_000_000_000 {
            return Err(ProtocolError::InvalidHeader("send time nanos out of range"));
        }

        let send_time = UNIX_EPOCH
            .checked_add(Duration::new(secs, nanos))
            .ok_or(ProtocolError::InvalidHeader("send time out of range"))?;

        Ok(Self {
            type_id,
            major,
            minor,
            origin: Uuid::from_bytes(origin),
            seq_nr,
            send_time,
        })
    }
}

/// Header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub header: MessageHeader,
    pub payload: Bytes,
}

impl WireMessage {
    pub fn new(header: MessageHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Header, length and payload in one contiguous buffer
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let len = u32::try_from(self.payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + LENGTH_SIZE + self.payload.len());
        self.header.encode(&mut buf);
        buf.put_u32_ne(len);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Incremental frame decoder for a byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    max_payload_size: usize,
}

impl FrameDecoder {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Take one complete frame off the front of `buf`
    ///
    /// Returns `Ok(None)` until enough bytes are buffered. An oversized length
    /// is an error; the stream cannot be resynchronised after it.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<WireMessage>, ProtocolError> {
        if buf.len() < HEADER_SIZE + LENGTH_SIZE {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LENGTH_SIZE];
        len_bytes.copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + LENGTH_SIZE]);
        let len = u32::from_ne_bytes(len_bytes) as usize;
        if len > self.max_payload_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_payload_size,
            });
        }

        if buf.len() < HEADER_SIZE + LENGTH_SIZE + len {
            buf.reserve(HEADER_SIZE + LENGTH_SIZE + len - buf.len());
            return Ok(None);
        }

        let mut head = buf.split_to(HEADER_SIZE + LENGTH_SIZE);
        let header = MessageHeader::decode(&mut head)?;
        let payload = buf.split_to(len).freeze();

        Ok(Some(WireMessage { header, payload }))
    }
}

/// Accept a frame for a locally registered message version
///
/// Unversioned headers (0.0) are always accepted. Otherwise majors must match
/// and the local minor must be at least the sender's.
pub fn is_version_compatible(header_major: u8, header_minor: u8, local: MessageVersion) -> bool {
    if header_major == 0 && header_minor == 0 {
        return true;
    }
    header_major == local.major && local.minor >= header_minor
}
