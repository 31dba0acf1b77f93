//! Field-level protobuf surgery
//!
//! Replaces individual fields of an encoded message while every other field,
//! including ones no local type declares, is copied through byte for byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};
use tonic::Status;

/// One top-level field of an encoded message
#[derive(Debug)]
pub(super) struct Field {
    pub tag: u32,
    pub wire_type: WireType,
    /// Key and value as encoded
    pub raw: Bytes,
    /// Value without key (and without length prefix for length-delimited)
    pub value: Bytes,
}

/// Replacement value for a field
pub(super) enum Value {
    Varint(u64),
    Bytes(Bytes),
}

impl Value {
    fn wire_type(&self) -> WireType {
        match self {
            Value::Varint(_) => WireType::Varint,
            Value::Bytes(_) => WireType::LengthDelimited,
        }
    }

    // Default values are not encoded
    fn encode(&self, tag: u32, out: &mut BytesMut) {
        match self {
            Value::Varint(0) => {}
            Value::Varint(v) => {
                encode_key(tag, WireType::Varint, out);
                encode_varint(*v, out);
            }
            Value::Bytes(b) if b.is_empty() => {}
            Value::Bytes(b) => encode_bytes(tag, b, out),
        }
    }
}

/// Split `message` into its top-level fields
pub(super) fn fields(message: &Bytes) -> Result<Vec<Field>, Status> {
    let total = message.len();
    let mut buf = message.clone();
    let mut fields = Vec::new();

    while buf.has_remaining() {
        let start = total - buf.remaining();
        let (tag, wire_type) = decode_key(&mut buf).map_err(malformed)?;
        let mut value_start = total - buf.remaining();
        let len = match wire_type {
            WireType::Varint => {
                decode_varint(&mut buf).map_err(malformed)?;
                0
            }
            WireType::SixtyFourBit => 8,
            WireType::ThirtyTwoBit => 4,
            WireType::LengthDelimited => {
                let len = decode_varint(&mut buf).map_err(malformed)?;
                value_start = total - buf.remaining();
                usize::try_from(len).map_err(|_| truncated(tag))?
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Status::invalid_argument(format!("unsupported group field {}", tag)))
            }
        };
        if buf.remaining() < len {
            return Err(truncated(tag));
        }
        buf.advance(len);

        let end = total - buf.remaining();
        fields.push(Field {
            tag,
            wire_type,
            raw: message.slice(start..end),
            value: message.slice(value_start..end),
        });
    }

    Ok(fields)
}

/// Re-encode `message` with the fields named in `replacements` set to new values
///
/// A replaced field keeps the position of its first occurrence; one the
/// message did not carry is appended.
pub(super) fn replace_fields(message: &Bytes, replacements: &[(u32, Value)]) -> Result<Bytes, Status> {
    let mut out = BytesMut::with_capacity(message.len() + 16);
    let mut written = vec![false; replacements.len()];

    for field in fields(message)? {
        match replacements.iter().position(|(tag, _)| *tag == field.tag) {
            Some(i) => {
                let (tag, value) = &replacements[i];
                if field.wire_type != value.wire_type() {
                    return Err(Status::invalid_argument(format!(
                        "field {} has wire type {:?}, expected {:?}",
                        tag,
                        field.wire_type,
                        value.wire_type()
                    )));
                }
                if !written[i] {
                    value.encode(*tag, &mut out);
                    written[i] = true;
                }
            }
            None => out.put_slice(&field.raw),
        }
    }

    for ((tag, value), done) in replacements.iter().zip(written) {
        if !done {
            value.encode(*tag, &mut out);
        }
    }

    Ok(out.freeze())
}

/// Re-encode `message` passing every embedded message at `tag` through `f`
///
/// Returns the new encoding and how many embedded messages were visited.
pub(super) fn map_embedded(
    message: &Bytes,
    tag: u32,
    mut f: impl FnMut(&Bytes) -> Result<Bytes, Status>,
) -> Result<(Bytes, usize), Status> {
    let mut out = BytesMut::with_capacity(message.len() + 16);
    let mut visited = 0;

    for field in fields(message)? {
        if field.tag == tag && field.wire_type == WireType::LengthDelimited {
            encode_bytes(tag, &f(&field.value)?, &mut out);
            visited += 1;
        } else {
            out.put_slice(&field.raw);
        }
    }

    Ok((out.freeze(), visited))
}

fn encode_bytes(tag: u32, value: &[u8], out: &mut BytesMut) {
    encode_key(tag, WireType::LengthDelimited, out);
    encode_varint(value.len() as u64, out);
    out.put_slice(value);
}

fn malformed(err: prost::DecodeError) -> Status {
    Status::invalid_argument(format!("malformed message: {}", err))
}

fn truncated(tag: u32) -> Status {
    Status::invalid_argument(format!("malformed message: field {} is truncated", tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(build: impl FnOnce(&mut BytesMut)) -> Bytes {
        let mut buf = BytesMut::new();
        build(&mut buf);
        buf.freeze()
    }

    #[test]
    fn test_fields_split() {
        let message = encoded(|buf| {
            encode_key(1, WireType::Varint, buf);
            encode_varint(300, buf);
            encode_bytes(2, b"abc", buf);
            encode_key(3, WireType::ThirtyTwoBit, buf);
            buf.put_u32_le(7);
        });

        let fields = fields(&message).unwrap();
        let tags: Vec<u32> = fields.iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(&fields[1].value[..], b"abc");
        assert_eq!(fields[1].raw.len(), 5);
        assert_eq!(fields[2].value.len(), 4);
    }

    #[test]
    fn test_replace_keeps_unknown_fields() {
        let message = encoded(|buf| {
            encode_key(3, WireType::Varint, buf);
            encode_varint(50400, buf);
            encode_bytes(9, b"keep me", buf);
        });

        let out = replace_fields(&message, &[(3, Value::Varint(40400)), (4, Value::Varint(40404))]).unwrap();
        let expected = encoded(|buf| {
            encode_key(3, WireType::Varint, buf);
            encode_varint(40400, buf);
            encode_bytes(9, b"keep me", buf);
            encode_key(4, WireType::Varint, buf);
            encode_varint(40404, buf);
        });
        assert_eq!(out, expected);
    }

    #[test]
    fn test_replace_rejects_wire_type_mismatch() {
        let message = encoded(|buf| encode_bytes(3, b"oops", buf));
        assert!(replace_fields(&message, &[(3, Value::Varint(1))]).is_err());
    }

    #[test]
    fn test_truncated_field_is_error() {
        let message = Bytes::from_static(&[0x0a, 0x20, 0x01]);
        let err = fields(&message).unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
