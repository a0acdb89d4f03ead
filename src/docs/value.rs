//! The canonical in-memory document model.
//!
//! Documents cross the API boundary in many encodings but live in one
//! shape here. Objects are key-sorted maps, which makes the canonical
//! serializer deterministic and value equality independent of member
//! order. Anything fitting `i64` parses as a signed integer; `UInt` is
//! reserved for magnitudes above `i64::MAX`.

use std::collections::BTreeMap;

/// JSON-family value extended with a first-class binary kind.
#[derive(Clone, Debug)]
pub enum DocValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<DocValue>),
    Object(BTreeMap<String, DocValue>),
}

/// Discriminant used by the gather decision table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DocKind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Str,
    Bytes,
    Array,
    Object,
}

impl DocValue {
    pub fn kind(&self) -> DocKind {
        match self {
            DocValue::Null => DocKind::Null,
            DocValue::Bool(_) => DocKind::Bool,
            DocValue::Int(_) => DocKind::Int,
            DocValue::UInt(_) => DocKind::UInt,
            DocValue::Float(_) => DocKind::Float,
            DocValue::Str(_) => DocKind::Str,
            DocValue::Bytes(_) => DocKind::Bytes,
            DocValue::Array(_) => DocKind::Array,
            DocValue::Object(_) => DocKind::Object,
        }
    }

    pub fn object(pairs: impl IntoIterator<Item = (String, DocValue)>) -> Self {
        DocValue::Object(pairs.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, DocValue>> {
        match self {
            DocValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, DocValue>> {
        match self {
            DocValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DocValue]> {
        match self {
            DocValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Signed reading of either integer kind, when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DocValue::Int(i) => Some(*i),
            DocValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Normalizes an unsigned magnitude into the preferred integer kind.
    pub fn integer(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(signed) => DocValue::Int(signed),
            Err(_) => DocValue::UInt(value),
        }
    }
}

impl PartialEq for DocValue {
    fn eq(&self, other: &Self) -> bool {
        use DocValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            // Numbers compare by value across kinds, mirroring the loose
            // numeric equality of JSON libraries.
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Int(a), UInt(b)) | (UInt(b), Int(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (UInt(a), Float(b)) | (Float(b), UInt(a)) => (*a as f64) == *b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for DocValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DocValue::Null,
            serde_json::Value::Bool(b) => DocValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DocValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    DocValue::UInt(u)
                } else {
                    DocValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => DocValue::Str(s),
            serde_json::Value::Array(items) => {
                DocValue::Array(items.into_iter().map(DocValue::from).collect())
            }
            serde_json::Value::Object(map) => DocValue::Object(
                map.into_iter().map(|(k, v)| (k, DocValue::from(v))).collect(),
            ),
        }
    }
}

impl TryFrom<&DocValue> for serde_json::Value {
    type Error = crate::StoreError;

    /// Text JSON has no binary kind, so `Bytes` refuses to convert.
    fn try_from(value: &DocValue) -> Result<Self, Self::Error> {
        Ok(match value {
            DocValue::Null => serde_json::Value::Null,
            DocValue::Bool(b) => serde_json::Value::Bool(*b),
            DocValue::Int(i) => serde_json::Value::from(*i),
            DocValue::UInt(u) => serde_json::Value::from(*u),
            DocValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(crate::StoreError::Invalid(
                    "non-finite float has no JSON text form",
                ))?,
            DocValue::Str(s) => serde_json::Value::String(s.clone()),
            DocValue::Bytes(_) => {
                return Err(crate::StoreError::Invalid(
                    "binary value has no JSON text form",
                ))
            }
            DocValue::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(serde_json::Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            DocValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), serde_json::Value::try_from(v)?)))
                    .collect::<Result<_, Self::Error>>()?,
            ),
        })
    }
}
