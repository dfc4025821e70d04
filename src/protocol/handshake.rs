//! Side-channel connection preamble
//!
//! A topic receiver dials the publisher's side channel and names the topic it
//! wants; the listener routes the connection to the matching topic sender.
//!
//! ```text
//! Dialer (receiver)                        Listener (sender side)
//!   |                                        |
//!   |-- magic "PSA1" | u16 len | uri ------->|
//!   |                                        |  look up uri
//!   |<------------- status (1 byte) ---------|
//!   |                                        |
//!   |<============ frames only ==============|
//! ```
//!
//! The length is in host byte order like the rest of the wire format.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, HandshakeError, Result};
use crate::protocol::constants::{
    HANDSHAKE_ACCEPTED, HANDSHAKE_MAGIC, HANDSHAKE_UNKNOWN_URI, MAX_URI_LENGTH,
};

/// Handshake role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    Dialer,
    Listener,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Initial,
    /// Dialer sent its request; listener waits for one
    WaitingForRequest,
    WaitingForStatus,
    /// Listener parsed the request and owes a status byte
    NeedToSendStatus,
    Done,
}

/// Handshake state machine
#[derive(Debug)]
pub struct Handshake {
    role: HandshakeRole,
    state: HandshakeState,
    uri: Option<String>,
}

impl Handshake {
    /// Dialer side requesting `uri`
    pub fn dialer(uri: impl Into<String>) -> Self {
        Self {
            role: HandshakeRole::Dialer,
            state: HandshakeState::Initial,
            uri: Some(uri.into()),
        }
    }

    pub fn listener() -> Self {
        Self {
            role: HandshakeRole::Listener,
            state: HandshakeState::WaitingForRequest,
            uri: None,
        }
    }

    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// URI requested by the dialer (listener) or being requested (dialer)
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Request bytes for the dialer; `None` for the listener
    pub fn generate_initial(&mut self) -> Result<Option<Bytes>> {
        if self.role != HandshakeRole::Dialer || self.state != HandshakeState::Initial {
            return Ok(None);
        }

        let uri = self.uri.as_deref().unwrap_or_default();
        if uri.len() > MAX_URI_LENGTH {
            return Err(HandshakeError::UriTooLong(uri.len()).into());
        }

        let mut buf = BytesMut::with_capacity(HANDSHAKE_MAGIC.len() + 2 + uri.len());
        buf.put_slice(&HANDSHAKE_MAGIC);
        buf.put_u16_ne(uri.len() as u16);
        buf.put_slice(uri.as_bytes());

        self.state = HandshakeState::WaitingForStatus;
        Ok(Some(buf.freeze()))
    }

    /// Consume peer bytes; returns `true` once this step is complete
    ///
    /// Incomplete input is left in `data` untouched.
    pub fn process(&mut self, data: &mut BytesMut) -> Result<bool> {
        match self.state {
            HandshakeState::WaitingForRequest => self.process_request(data),
            HandshakeState::WaitingForStatus => self.process_status(data),
            _ => Ok(false),
        }
    }

    fn process_request(&mut self, data: &mut BytesMut) -> Result<bool> {
        if data.len() < HANDSHAKE_MAGIC.len() {
            return Ok(false);
        }
        if data[..HANDSHAKE_MAGIC.len()] != HANDSHAKE_MAGIC {
            return Err(HandshakeError::BadMagic.into());
        }
        if data.len() < HANDSHAKE_MAGIC.len() + 2 {
            return Ok(false);
        }

        let len = u16::from_ne_bytes([data[4], data[5]]) as usize;
        if len > MAX_URI_LENGTH {
            return Err(HandshakeError::UriTooLong(len).into());
        }
        if data.len() < HANDSHAKE_MAGIC.len() + 2 + len {
            return Ok(false);
        }

        data.advance(HANDSHAKE_MAGIC.len() + 2);
        let raw = data.split_to(len);
        let uri = std::str::from_utf8(&raw).map_err(|_| HandshakeError::InvalidUri)?;

        self.uri = Some(uri.to_string());
        self.state = HandshakeState::NeedToSendStatus;
        Ok(true)
    }

    fn process_status(&mut self, data: &mut BytesMut) -> Result<bool> {
        if data.is_empty() {
            return Ok(false);
        }

        match data.get_u8() {
            HANDSHAKE_ACCEPTED => {
                self.state = HandshakeState::Done;
                Ok(true)
            }
            _ => Err(HandshakeError::Rejected(self.uri.clone().unwrap_or_default()).into()),
        }
    }

    /// Listener's answer to a parsed request
    pub fn respond(&mut self, accepted: bool) -> Option<Bytes> {
        if self.state != HandshakeState::NeedToSendStatus {
            return None;
        }
        self.state = HandshakeState::Done;
        let status = if accepted {
            HANDSHAKE_ACCEPTED
        } else {
            HANDSHAKE_UNKNOWN_URI
        };
        Some(Bytes::copy_from_slice(&[status]))
    }
}

/// Run the dialer side over `stream`
///
/// Bytes read past the status byte are returned; they belong to the frame
/// stream.
pub async fn dial<S>(stream: &mut S, uri: &str, timeout: Duration) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = Handshake::dialer(uri);
    let fut = async {
        if let Some(request) = handshake.generate_initial()? {
            stream.write_all(&request).await?;
        }

        let mut buf = BytesMut::with_capacity(64);
        while !handshake.process(&mut buf)? {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
        Ok(buf)
    };

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| HandshakeError::Timeout)?
}

/// Read the dialer's request on the listener side
///
/// The returned handshake owes a [`Handshake::respond`].
pub async fn read_request<S>(stream: &mut S, timeout: Duration) -> Result<Handshake>
where
    S: AsyncRead + Unpin,
{
    let mut handshake = Handshake::listener();
    let fut = async {
        let mut buf = BytesMut::with_capacity(64);
        while !handshake.process(&mut buf)? {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
        Ok(())
    };

    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| HandshakeError::Timeout)??;
    Ok(handshake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialer_listener_exchange() {
        let mut dialer = Handshake::dialer("/pubsub/s/t");
        let mut listener = Handshake::listener();

        let request = dialer.generate_initial().unwrap().unwrap();
        assert_eq!(listener.generate_initial().unwrap(), None);

        // Request arrives in two pieces
        let mut buf = BytesMut::from(&request[..3]);
        assert!(!listener.process(&mut buf).unwrap());
        buf.extend_from_slice(&request[3..]);
        assert!(listener.process(&mut buf).unwrap());
        assert_eq!(listener.uri(), Some("/pubsub/s/t"));

        let status = listener.respond(true).unwrap();
        assert!(listener.is_done());

        let mut buf = BytesMut::from(&status[..]);
        assert!(dialer.process(&mut buf).unwrap());
        assert!(dialer.is_done());
    }

    #[test]
    fn test_rejected_uri() {
        let mut dialer = Handshake::dialer("/pubsub/s/missing");
        let mut listener = Handshake::listener();

        let mut buf = BytesMut::from(&dialer.generate_initial().unwrap().unwrap()[..]);
        listener.process(&mut buf).unwrap();
        let status = listener.respond(false).unwrap();

        let mut buf = BytesMut::from(&status[..]);
        let err = dialer.process(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Handshake(HandshakeError::Rejected(uri)) if uri == "/pubsub/s/missing"));
    }

    #[test]
    fn test_bad_magic() {
        let mut listener = Handshake::listener();
        let mut buf = BytesMut::from(&b"HTTP/1.1"[..]);
        assert!(matches!(
            listener.process(&mut buf),
            Err(Error::Handshake(HandshakeError::BadMagic))
        ));
    }

    #[tokio::test]
    async fn test_async_drivers_keep_trailing_bytes() {
        let (mut a, mut b) = tokio::io::duplex(256);

        let listener = tokio::spawn(async move {
            let mut handshake = read_request(&mut b, Duration::from_secs(1)).await.unwrap();
            let uri = handshake.uri().unwrap().to_string();
            let status = handshake.respond(true).unwrap();
            // Status and first frame bytes in one write
            let mut out = BytesMut::from(&status[..]);
            out.extend_from_slice(b"frame");
            b.write_all(&out).await.unwrap();
            uri
        });

        let rest = dial(&mut a, "/pubsub/default/t", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(listener.await.unwrap(), "/pubsub/default/t");

        let mut rest = rest;
        while rest.len() < 5 {
            a.read_buf(&mut rest).await.unwrap();
        }
        assert_eq!(&rest[..], b"frame");
    }
}
