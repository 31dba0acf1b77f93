//! Opaque message payloads and the codec that carries them
//!
//! The proxy never needs the message types of the service it fronts. Both
//! legs move the encoded protobuf bytes as a [`Payload`]; hooks that care
//! about content decode it with any `prost::Message`.

use bytes::{Buf, BufMut, Bytes};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// One encoded gRPC message
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap already encoded bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Encode a protobuf message
    pub fn from_message<M: prost::Message>(message: &M) -> Self {
        Self(Bytes::from(message.encode_to_vec()))
    }

    /// Decode as protobuf message `M`
    pub fn decode<M: prost::Message + Default>(&self) -> Result<M, prost::DecodeError> {
        M::decode(self.0.clone())
    }

    /// Decode as `M`, reporting failures as an `INVALID_ARGUMENT` status
    pub fn decode_status<M: prost::Message + Default>(&self) -> Result<M, Status> {
        self.decode()
            .map_err(|e| Status::invalid_argument(format!("cannot decode {}: {}", std::any::type_name::<M>(), e)))
    }

    /// The encoded bytes
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consume into the encoded bytes
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Encoded length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the encoding is empty (a message with all fields at default)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

/// Pass-through codec for [`Payload`]
///
/// Used on the inbound server and the outbound client, so message bytes
/// reach the node exactly as the pre-hook returned them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl Codec for PayloadCodec {
    type Encode = Payload;
    type Decode = Payload;
    type Encoder = PayloadCodec;
    type Decoder = PayloadCodec;

    fn encoder(&mut self) -> Self::Encoder {
        *self
    }

    fn decoder(&mut self) -> Self::Decoder {
        *self
    }
}

impl Encoder for PayloadCodec {
    type Item = Payload;
    type Error = Status;

    fn encode(&mut self, item: Payload, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put(item.into_bytes());
        Ok(())
    }
}

impl Decoder for PayloadCodec {
    type Item = Payload;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Payload>, Status> {
        let len = src.remaining();
        Ok(Some(Payload::from(src.copy_to_bytes(len))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Greeting {
        #[prost(string, tag = "1")]
        value: String,
    }

    #[test]
    fn test_typed_access() {
        let payload = Payload::from_message(&Greeting { value: "ping".to_string() });
        assert_eq!(payload.as_bytes().as_ref(), b"\x0a\x04ping");

        let decoded: Greeting = payload.decode().unwrap();
        assert_eq!(decoded.value, "ping");
    }

    #[test]
    fn test_default_message_is_empty() {
        let payload = Payload::from_message(&Greeting::default());
        assert!(payload.is_empty());
        assert_eq!(payload.decode::<Greeting>().unwrap(), Greeting::default());
    }

    #[test]
    fn test_decode_status() {
        let payload = Payload::new(Bytes::from_static(b"\x0a\x20truncated"));
        let status = payload.decode_status::<Greeting>().unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
