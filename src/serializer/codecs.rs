//! Built-in codecs

use std::any::Any;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::serializer::{Message, MessageSerializer};

/// serde_json codec for one message type `T`
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageSerializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn serialize(&self, msg: &dyn Any) -> Result<Bytes, CodecError> {
        let msg = msg.downcast_ref::<T>().ok_or(CodecError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        Ok(Bytes::from(serde_json::to_vec(msg)?))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<Message, CodecError> {
        let msg: T = serde_json::from_slice(payload)?;
        Ok(Box::new(msg))
    }
}

/// Pass-through codec
///
/// Accepts `Bytes`, `Vec<u8>` or `&'static [u8]` and always delivers `Bytes`,
/// byte-identical to what was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSerializer;

impl MessageSerializer for RawSerializer {
    fn serialize(&self, msg: &dyn Any) -> Result<Bytes, CodecError> {
        if let Some(bytes) = msg.downcast_ref::<Bytes>() {
            Ok(bytes.clone())
        } else if let Some(vec) = msg.downcast_ref::<Vec<u8>>() {
            Ok(Bytes::copy_from_slice(vec))
        } else if let Some(slice) = msg.downcast_ref::<&'static [u8]>() {
            Ok(Bytes::from_static(slice))
        } else {
            Err(CodecError::TypeMismatch { expected: "bytes" })
        }
    }

    fn deserialize(&self, payload: &[u8]) -> Result<Message, CodecError> {
        Ok(Box::new(Bytes::copy_from_slice(payload)))
    }
}
