//! Format negotiation at the document API boundary.
//!
//! Documents rest in the canonical MessagePack encoding; at the surface
//! they may arrive or leave in any of the supported formats. Text JSON
//! outputs are NUL-terminated, binary forms are not.

use crate::error::{Result, StoreError};

use super::bson;
use super::bytes::DecodeError;
use super::cbor;
use super::msgpack;
use super::ubjson;
use super::value::DocValue;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DocFormat {
    /// JSON text.
    Json,
    /// RFC 6902 patch carried as JSON text.
    JsonPatch,
    /// RFC 7396 merge patch carried as JSON text.
    JsonMergePatch,
    /// The canonical at-rest encoding.
    MsgPack,
    Bson,
    Cbor,
    UbJson,
    /// Raw bytes in, raw scalar bytes out.
    Binary,
}

/// The internal at-rest encoding.
pub const CANONICAL: DocFormat = DocFormat::MsgPack;

impl DocFormat {
    /// Patch formats mutate existing documents rather than replace them.
    pub fn is_patch(self) -> bool {
        matches!(self, DocFormat::JsonPatch | DocFormat::JsonMergePatch)
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            DocFormat::Json | DocFormat::JsonPatch | DocFormat::JsonMergePatch
        )
    }
}

impl From<DecodeError> for StoreError {
    fn from(err: DecodeError) -> Self {
        StoreError::Parse(err.to_string())
    }
}

/// Decodes `bytes` arriving in `format` into the document model.
pub fn parse_any(bytes: &[u8], format: DocFormat) -> Result<DocValue> {
    match format {
        DocFormat::Json | DocFormat::JsonPatch | DocFormat::JsonMergePatch => {
            // Accept our own NUL-terminated text output as input.
            let text = match bytes.last() {
                Some(0) => &bytes[..bytes.len() - 1],
                _ => bytes,
            };
            let value: serde_json::Value = serde_json::from_slice(text)
                .map_err(|err| StoreError::Parse(format!("JSON: {err}")))?;
            Ok(value.into())
        }
        DocFormat::MsgPack => Ok(msgpack::decode(bytes)?),
        DocFormat::Bson => Ok(bson::decode(bytes)?),
        DocFormat::Cbor => cbor::decode(bytes),
        DocFormat::UbJson => Ok(ubjson::decode(bytes)?),
        DocFormat::Binary => Ok(DocValue::Bytes(bytes.to_vec())),
    }
}

/// Serializes `value` into `format`, appending to `out`.
pub fn dump_any(value: &DocValue, format: DocFormat, out: &mut Vec<u8>) -> Result<()> {
    match format {
        DocFormat::Json | DocFormat::JsonPatch | DocFormat::JsonMergePatch => {
            let json = serde_json::Value::try_from(value)?;
            serde_json::to_writer(&mut *out, &json)
                .map_err(|err| StoreError::Parse(format!("JSON serialization failed: {err}")))?;
            out.push(0);
            Ok(())
        }
        DocFormat::MsgPack => {
            msgpack::encode(value, out);
            Ok(())
        }
        DocFormat::Bson => match value.as_object() {
            Some(map) => {
                bson::encode_document(map, out);
                Ok(())
            }
            None => Err(StoreError::Invalid("BSON top level must be a document")),
        },
        DocFormat::Cbor => cbor::encode(value, out),
        DocFormat::UbJson => {
            ubjson::encode(value, out);
            Ok(())
        }
        DocFormat::Binary => dump_binary(value, out),
    }
}

fn dump_binary(value: &DocValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        DocValue::Null => Ok(()),
        DocValue::Bytes(b) => {
            out.extend_from_slice(b);
            Ok(())
        }
        DocValue::Str(s) => {
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        DocValue::Bool(b) => {
            out.push(u8::from(*b));
            Ok(())
        }
        DocValue::Int(i) => {
            out.extend_from_slice(&i.to_le_bytes());
            Ok(())
        }
        DocValue::UInt(u) => {
            out.extend_from_slice(&u.to_le_bytes());
            Ok(())
        }
        DocValue::Float(f) => {
            out.extend_from_slice(&f.to_le_bytes());
            Ok(())
        }
        DocValue::Array(_) | DocValue::Object(_) => Err(StoreError::Invalid(
            "nested value has no raw binary form",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_roundtrips_an_object() {
        let doc: DocValue =
            serde_json::from_str::<serde_json::Value>(r#"{"k":[1,2],"s":"v","n":null}"#)
                .unwrap()
                .into();
        for format in [
            DocFormat::Json,
            DocFormat::MsgPack,
            DocFormat::Bson,
            DocFormat::Cbor,
            DocFormat::UbJson,
        ] {
            let mut buf = Vec::new();
            dump_any(&doc, format, &mut buf).unwrap();
            let back = parse_any(&buf, format).unwrap();
            assert_eq!(back, doc, "format {format:?}");
        }
    }

    #[test]
    fn text_json_is_nul_terminated() {
        let mut buf = Vec::new();
        dump_any(&DocValue::Int(5), DocFormat::Json, &mut buf).unwrap();
        assert_eq!(buf, b"5\0");
    }

    #[test]
    fn binary_dump_of_scalars() {
        let mut buf = Vec::new();
        dump_any(&DocValue::Int(1), DocFormat::Binary, &mut buf).unwrap();
        assert_eq!(buf, 1i64.to_le_bytes());

        buf.clear();
        dump_any(&DocValue::Str("raw".into()), DocFormat::Binary, &mut buf).unwrap();
        assert_eq!(buf, b"raw");

        buf.clear();
        assert!(dump_any(
            &DocValue::Array(vec![DocValue::Null]),
            DocFormat::Binary,
            &mut buf
        )
        .is_err());
    }

    #[test]
    fn bson_scalar_top_level_is_invalid() {
        let mut buf = Vec::new();
        assert!(dump_any(&DocValue::Int(1), DocFormat::Bson, &mut buf).is_err());
    }
}
