//! CBOR codec, bridged through `ciborium`'s value model.

use ciborium::value::Value as CborValue;

use crate::error::{Result, StoreError};

use super::value::DocValue;

pub fn encode(value: &DocValue, out: &mut Vec<u8>) -> Result<()> {
    let cbor = to_cbor(value);
    ciborium::ser::into_writer(&cbor, out)
        .map_err(|err| StoreError::Parse(format!("CBOR serialization failed: {err}")))
}

pub fn decode(input: &[u8]) -> Result<DocValue> {
    let cbor: CborValue = ciborium::de::from_reader(input)
        .map_err(|err| StoreError::Parse(format!("CBOR: {err}")))?;
    from_cbor(cbor)
}

fn to_cbor(value: &DocValue) -> CborValue {
    match value {
        DocValue::Null => CborValue::Null,
        DocValue::Bool(b) => CborValue::Bool(*b),
        DocValue::Int(i) => CborValue::Integer((*i).into()),
        DocValue::UInt(u) => CborValue::Integer((*u).into()),
        DocValue::Float(f) => CborValue::Float(*f),
        DocValue::Str(s) => CborValue::Text(s.clone()),
        DocValue::Bytes(b) => CborValue::Bytes(b.clone()),
        DocValue::Array(items) => CborValue::Array(items.iter().map(to_cbor).collect()),
        DocValue::Object(map) => CborValue::Map(
            map.iter()
                .map(|(k, v)| (CborValue::Text(k.clone()), to_cbor(v)))
                .collect(),
        ),
    }
}

fn from_cbor(value: CborValue) -> Result<DocValue> {
    Ok(match value {
        CborValue::Null => DocValue::Null,
        CborValue::Bool(b) => DocValue::Bool(b),
        CborValue::Integer(i) => {
            let wide: i128 = i.into();
            if let Ok(signed) = i64::try_from(wide) {
                DocValue::Int(signed)
            } else if let Ok(unsigned) = u64::try_from(wide) {
                DocValue::UInt(unsigned)
            } else {
                return Err(StoreError::Parse("CBOR integer exceeds 64 bits".into()));
            }
        }
        CborValue::Float(f) => DocValue::Float(f),
        CborValue::Text(s) => DocValue::Str(s),
        CborValue::Bytes(b) => DocValue::Bytes(b),
        CborValue::Array(items) => DocValue::Array(
            items
                .into_iter()
                .map(from_cbor)
                .collect::<Result<Vec<_>>>()?,
        ),
        CborValue::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, item) in entries {
                let key = match key {
                    CborValue::Text(s) => s,
                    _ => return Err(StoreError::Parse("CBOR map key is not text".into())),
                };
                map.insert(key, from_cbor(item)?);
            }
            DocValue::Object(map)
        }
        CborValue::Tag(_, _) => return Err(StoreError::Parse("CBOR tags unsupported".into())),
        _ => return Err(StoreError::Parse("unsupported CBOR construct".into())),
    })
}
