//! Field addressing: top-level member names and RFC 6901 JSON Pointers.
//!
//! A field string beginning with `/` is a pointer; anything else names a
//! top-level member. Absence of the whole feature is expressed with
//! `Option<FieldRef>` at the call sites, so no third "empty" variant
//! exists here.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

use super::value::DocValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRef {
    /// Top-level object member.
    Name(String),
    /// Parsed JSON Pointer segments, already unescaped.
    Pointer(Vec<String>),
}

impl FieldRef {
    pub fn parse(text: &str) -> Result<FieldRef> {
        if text.starts_with('/') {
            Ok(FieldRef::Pointer(parse_pointer(text)?))
        } else {
            Ok(FieldRef::Name(text.to_owned()))
        }
    }

    /// Resolves the field inside `doc`, if present.
    pub fn lookup<'a>(&self, doc: &'a DocValue) -> Option<&'a DocValue> {
        match self {
            FieldRef::Name(name) => doc.as_object()?.get(name),
            FieldRef::Pointer(segments) => {
                let mut current = doc;
                for segment in segments {
                    current = descend(current, segment)?;
                }
                Some(current)
            }
        }
    }

    pub fn lookup_mut<'a>(&self, doc: &'a mut DocValue) -> Option<&'a mut DocValue> {
        match self {
            FieldRef::Name(name) => doc.as_object_mut()?.get_mut(name),
            FieldRef::Pointer(segments) => {
                let mut current = doc;
                for segment in segments {
                    current = descend_mut(current, segment)?;
                }
                Some(current)
            }
        }
    }

    /// Places `value` at this field, materializing missing intermediate
    /// objects along a pointer path. The document root must be an object
    /// (a `Null` root becomes one).
    pub fn insert(&self, doc: &mut DocValue, value: DocValue) -> Result<()> {
        if doc.is_null() {
            *doc = DocValue::Object(BTreeMap::new());
        }
        match self {
            FieldRef::Name(name) => {
                let map = doc
                    .as_object_mut()
                    .ok_or(StoreError::Invalid("document root is not an object"))?;
                map.insert(name.clone(), value);
                Ok(())
            }
            FieldRef::Pointer(segments) => {
                let (last, ancestors) = segments
                    .split_last()
                    .ok_or(StoreError::Invalid("empty JSON Pointer has no target"))?;
                let mut current = doc;
                for segment in ancestors {
                    current = match current {
                        DocValue::Object(map) => map
                            .entry(segment.clone())
                            .or_insert_with(|| DocValue::Object(BTreeMap::new())),
                        DocValue::Array(items) => array_slot(items, segment)?,
                        _ => {
                            return Err(StoreError::Invalid(
                                "JSON Pointer crosses a scalar value",
                            ))
                        }
                    };
                }
                match current {
                    DocValue::Object(map) => {
                        map.insert(last.clone(), value);
                        Ok(())
                    }
                    DocValue::Array(items) => {
                        *array_slot(items, last)? = value;
                        Ok(())
                    }
                    _ => Err(StoreError::Invalid("JSON Pointer crosses a scalar value")),
                }
            }
        }
    }
}

fn descend<'a>(value: &'a DocValue, segment: &str) -> Option<&'a DocValue> {
    match value {
        DocValue::Object(map) => map.get(segment),
        DocValue::Array(items) => items.get(array_index(segment, items.len())?),
        _ => None,
    }
}

fn descend_mut<'a>(value: &'a mut DocValue, segment: &str) -> Option<&'a mut DocValue> {
    match value {
        DocValue::Object(map) => map.get_mut(segment),
        DocValue::Array(items) => {
            let index = array_index(segment, items.len())?;
            items.get_mut(index)
        }
        _ => None,
    }
}

fn array_slot<'a>(items: &'a mut Vec<DocValue>, segment: &str) -> Result<&'a mut DocValue> {
    let index = array_index(segment, items.len())
        .ok_or(StoreError::Invalid("array index out of bounds"))?;
    Ok(&mut items[index])
}

/// RFC 6901 array index: decimal digits without a leading zero.
pub(crate) fn array_index(segment: &str, len: usize) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    let index: usize = segment.parse().ok()?;
    (index < len).then_some(index)
}

/// Splits and unescapes an RFC 6901 pointer (`~0` → `~`, `~1` → `/`).
pub(crate) fn parse_pointer(text: &str) -> Result<Vec<String>> {
    debug_assert!(text.starts_with('/'));
    text.split('/').skip(1).map(unescape_segment).collect()
}

fn unescape_segment(raw: &str) -> Result<String> {
    if !raw.contains('~') {
        return Ok(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(StoreError::Invalid("malformed JSON Pointer escape")),
        }
    }
    Ok(out)
}

/// Escapes one path segment for rendering a pointer.
pub(crate) fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
