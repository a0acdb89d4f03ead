//! BSON codec. Little-endian throughout; the top level is always a
//! document, so scalar payloads cannot be exported in this format.

use std::collections::BTreeMap;

use super::bytes::{DecodeError, Reader};
use super::value::DocValue;

const T_DOUBLE: u8 = 0x01;
const T_STRING: u8 = 0x02;
const T_DOCUMENT: u8 = 0x03;
const T_ARRAY: u8 = 0x04;
const T_BINARY: u8 = 0x05;
const T_BOOL: u8 = 0x08;
const T_DATETIME: u8 = 0x09;
const T_NULL: u8 = 0x0a;
const T_INT32: u8 = 0x10;
const T_INT64: u8 = 0x12;

pub fn encode_document(map: &BTreeMap<String, DocValue>, out: &mut Vec<u8>) {
    let body_start = out.len();
    out.extend_from_slice(&[0u8; 4]); // size patched below
    for (key, value) in map {
        write_element(key, value, out);
    }
    out.push(0);
    let size = (out.len() - body_start) as i32;
    out[body_start..body_start + 4].copy_from_slice(&size.to_le_bytes());
}

fn write_element(key: &str, value: &DocValue, out: &mut Vec<u8>) {
    match value {
        DocValue::Null => {
            out.push(T_NULL);
            write_cstring(key, out);
        }
        DocValue::Bool(b) => {
            out.push(T_BOOL);
            write_cstring(key, out);
            out.push(u8::from(*b));
        }
        DocValue::Int(i) => write_integer(key, *i, out),
        DocValue::UInt(u) => match i64::try_from(*u) {
            Ok(i) => write_integer(key, i, out),
            // No unsigned 64-bit element kind; degrade to double.
            Err(_) => {
                out.push(T_DOUBLE);
                write_cstring(key, out);
                out.extend_from_slice(&(*u as f64).to_le_bytes());
            }
        },
        DocValue::Float(f) => {
            out.push(T_DOUBLE);
            write_cstring(key, out);
            out.extend_from_slice(&f.to_le_bytes());
        }
        DocValue::Str(s) => {
            out.push(T_STRING);
            write_cstring(key, out);
            write_string(s, out);
        }
        DocValue::Bytes(b) => {
            out.push(T_BINARY);
            write_cstring(key, out);
            out.extend_from_slice(&(b.len() as i32).to_le_bytes());
            out.push(0); // generic subtype
            out.extend_from_slice(b);
        }
        DocValue::Array(items) => {
            out.push(T_ARRAY);
            write_cstring(key, out);
            // Arrays are documents keyed by decimal indexes.
            let body_start = out.len();
            out.extend_from_slice(&[0u8; 4]);
            for (index, item) in items.iter().enumerate() {
                write_element(&index.to_string(), item, out);
            }
            out.push(0);
            let size = (out.len() - body_start) as i32;
            out[body_start..body_start + 4].copy_from_slice(&size.to_le_bytes());
        }
        DocValue::Object(map) => {
            out.push(T_DOCUMENT);
            write_cstring(key, out);
            encode_document(map, out);
        }
    }
}

fn write_integer(key: &str, int: i64, out: &mut Vec<u8>) {
    if let Ok(small) = i32::try_from(int) {
        out.push(T_INT32);
        write_cstring(key, out);
        out.extend_from_slice(&small.to_le_bytes());
    } else {
        out.push(T_INT64);
        write_cstring(key, out);
        out.extend_from_slice(&int.to_le_bytes());
    }
}

fn write_cstring(s: &str, out: &mut Vec<u8>) {
    // Element names cannot carry NUL; writable documents never do since
    // they come from UTF-8 JSON member names.
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

pub fn decode(input: &[u8]) -> Result<DocValue, DecodeError> {
    let mut reader = Reader::new(input);
    let value = read_document(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

fn read_document(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let mut map = BTreeMap::new();
    read_body(r, |key, value| {
        map.insert(key.to_owned(), value);
    })?;
    Ok(DocValue::Object(map))
}

fn read_array_document(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let mut items = Vec::new();
    read_body(r, |_key, value| items.push(value))?;
    Ok(DocValue::Array(items))
}

fn read_body(
    r: &mut Reader<'_>,
    mut sink: impl FnMut(&str, DocValue),
) -> Result<(), DecodeError> {
    let declared = r.i32_le()?;
    if declared < 5 {
        return Err(DecodeError::Unsupported("document size below minimum"));
    }
    loop {
        let at = r.pos();
        let tag = r.u8()?;
        if tag == 0 {
            return Ok(());
        }
        let key = r.cstring()?;
        let value = match tag {
            T_DOUBLE => DocValue::Float(r.f64_le()?),
            T_STRING => {
                let len = r.i32_le()?;
                if len < 1 {
                    return Err(DecodeError::Unsupported("string size below minimum"));
                }
                let s = r.utf8(len as usize - 1)?.to_owned();
                if r.u8()? != 0 {
                    return Err(DecodeError::UnexpectedByte(tag, at));
                }
                DocValue::Str(s)
            }
            T_DOCUMENT => read_document(r)?,
            T_ARRAY => read_array_document(r)?,
            T_BINARY => {
                let len = r.i32_le()?;
                if len < 0 {
                    return Err(DecodeError::Unsupported("negative binary size"));
                }
                let _subtype = r.u8()?;
                DocValue::Bytes(r.take(len as usize)?.to_vec())
            }
            T_BOOL => DocValue::Bool(r.u8()? != 0),
            T_DATETIME => DocValue::Int(r.i64_le()?),
            T_NULL => DocValue::Null,
            T_INT32 => DocValue::Int(r.i32_le()? as i64),
            T_INT64 => DocValue::Int(r.i64_le()?),
            _ => return Err(DecodeError::Unsupported("BSON element kind")),
        };
        sink(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> BTreeMap<String, DocValue> {
        match DocValue::from(serde_json::from_str::<serde_json::Value>(json).unwrap()) {
            DocValue::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn empty_document_is_five_bytes() {
        let mut buf = Vec::new();
        encode_document(&BTreeMap::new(), &mut buf);
        assert_eq!(buf, [5, 0, 0, 0, 0]);
    }

    #[test]
    fn document_roundtrip() {
        let map = doc(r#"{"a":1,"big":5000000000,"f":2.5,"s":"txt","t":true,"n":null,"nested":{"list":[1,2,3]}}"#);
        let mut buf = Vec::new();
        encode_document(&map, &mut buf);
        let back = decode(&buf).unwrap();
        assert_eq!(back, DocValue::Object(map));
    }

    #[test]
    fn binary_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("raw".to_owned(), DocValue::Bytes(vec![0, 255, 7]));
        let mut buf = Vec::new();
        encode_document(&map, &mut buf);
        assert_eq!(decode(&buf).unwrap(), DocValue::Object(map));
    }

    #[test]
    fn known_wire_layout() {
        // {"a": 1} => int32 element.
        let map = doc(r#"{"a":1}"#);
        let mut buf = Vec::new();
        encode_document(&map, &mut buf);
        assert_eq!(buf, [12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]);
    }
}
