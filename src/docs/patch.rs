//! Document patching: RFC 6902 (JSON Patch) and RFC 7396 (Merge Patch),
//! applied against whatever subtree the caller's field locates.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

use super::field::{array_index, parse_pointer};
use super::value::DocValue;

/// RFC 7396. Nulls in the patch delete members; any non-object patch
/// replaces the target wholesale.
pub fn merge_patch(target: &mut DocValue, patch: &DocValue) {
    let DocValue::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !matches!(target, DocValue::Object(_)) {
        *target = DocValue::Object(BTreeMap::new());
    }
    let map = target.as_object_mut().expect("target coerced to object");
    for (key, patch_value) in patch_map {
        if patch_value.is_null() {
            map.remove(key);
        } else {
            let slot = map.entry(key.clone()).or_insert(DocValue::Null);
            merge_patch(slot, patch_value);
        }
    }
}

/// RFC 6902. `ops` is the parsed patch document (an array of operation
/// objects); the target is mutated in place and left untouched on error
/// only if the caller works on a scratch copy, as the pipelines do.
pub fn json_patch(target: &mut DocValue, ops: &DocValue) -> Result<()> {
    let ops = ops
        .as_array()
        .ok_or(StoreError::Invalid("JSON Patch must be an array"))?;
    for op in ops {
        apply_op(target, op)?;
    }
    Ok(())
}

fn apply_op(target: &mut DocValue, op: &DocValue) -> Result<()> {
    let map = op
        .as_object()
        .ok_or(StoreError::Invalid("JSON Patch operation must be an object"))?;
    let name = map
        .get("op")
        .and_then(DocValue::as_str)
        .ok_or(StoreError::Invalid("JSON Patch operation lacks an op"))?;
    let path = patch_path(map, "path")?;

    match name {
        "add" => {
            let value = required(map, "value")?.clone();
            add(target, &path, value)
        }
        "remove" => remove(target, &path).map(drop),
        "replace" => {
            let value = required(map, "value")?.clone();
            let slot = locate_mut(target, &path)
                .ok_or(StoreError::Invalid("replace path does not exist"))?;
            *slot = value;
            Ok(())
        }
        "move" => {
            let from = patch_path(map, "from")?;
            let value = remove(target, &from)?;
            add(target, &path, value)
        }
        "copy" => {
            let from = patch_path(map, "from")?;
            let value = locate(target, &from)
                .ok_or(StoreError::Invalid("copy source does not exist"))?
                .clone();
            add(target, &path, value)
        }
        "test" => {
            let expected = required(map, "value")?;
            let found =
                locate(target, &path).ok_or(StoreError::Invalid("test path does not exist"))?;
            if found == expected {
                Ok(())
            } else {
                Err(StoreError::Invalid("patch test failed"))
            }
        }
        _ => Err(StoreError::Invalid("unknown JSON Patch op")),
    }
}

fn required<'a>(map: &'a BTreeMap<String, DocValue>, key: &str) -> Result<&'a DocValue> {
    map.get(key)
        .ok_or(StoreError::Invalid("JSON Patch operation lacks a value"))
}

fn patch_path(map: &BTreeMap<String, DocValue>, key: &str) -> Result<Vec<String>> {
    let text = map
        .get(key)
        .and_then(DocValue::as_str)
        .ok_or(StoreError::Invalid("JSON Patch operation lacks a path"))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if !text.starts_with('/') {
        return Err(StoreError::Invalid("malformed JSON Pointer"));
    }
    parse_pointer(text)
}

fn locate<'a>(doc: &'a DocValue, segments: &[String]) -> Option<&'a DocValue> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            DocValue::Object(map) => map.get(segment)?,
            DocValue::Array(items) => items.get(array_index(segment, items.len())?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn locate_mut<'a>(doc: &'a mut DocValue, segments: &[String]) -> Option<&'a mut DocValue> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            DocValue::Object(map) => map.get_mut(segment)?,
            DocValue::Array(items) => {
                let index = array_index(segment, items.len())?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn add(target: &mut DocValue, segments: &[String], value: DocValue) -> Result<()> {
    let Some((last, ancestors)) = segments.split_last() else {
        *target = value;
        return Ok(());
    };
    let parent = locate_mut(target, ancestors)
        .ok_or(StoreError::Invalid("add path parent does not exist"))?;
    match parent {
        DocValue::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        DocValue::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                insertion_index(last, items.len())
                    .ok_or(StoreError::Invalid("add index out of bounds"))?
            };
            items.insert(index, value);
            Ok(())
        }
        _ => Err(StoreError::Invalid("add parent is not a container")),
    }
}

fn remove(target: &mut DocValue, segments: &[String]) -> Result<DocValue> {
    let Some((last, ancestors)) = segments.split_last() else {
        return Ok(std::mem::replace(target, DocValue::Null));
    };
    let parent = locate_mut(target, ancestors)
        .ok_or(StoreError::Invalid("remove path parent does not exist"))?;
    match parent {
        DocValue::Object(map) => map
            .remove(last)
            .ok_or(StoreError::Invalid("remove path does not exist")),
        DocValue::Array(items) => {
            let index = array_index(last, items.len())
                .ok_or(StoreError::Invalid("remove index out of bounds"))?;
            Ok(items.remove(index))
        }
        _ => Err(StoreError::Invalid("remove parent is not a container")),
    }
}

/// Like [`array_index`] but admitting the one-past-the-end position.
fn insertion_index(segment: &str, len: usize) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    let index: usize = segment.parse().ok()?;
    (index <= len).then_some(index)
}
