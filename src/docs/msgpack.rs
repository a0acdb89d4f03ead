//! MessagePack codec — the canonical at-rest document encoding.
//!
//! The encoder always picks the smallest representation that preserves
//! the value exactly, which together with key-sorted objects makes the
//! output deterministic for a given document. Semantic stability is the
//! contract; byte stability across library versions is not.

use std::collections::BTreeMap;

use super::bytes::{DecodeError, Reader};
use super::value::DocValue;

pub fn encode(value: &DocValue, out: &mut Vec<u8>) {
    match value {
        DocValue::Null => out.push(0xc0),
        DocValue::Bool(b) => out.push(if *b { 0xc3 } else { 0xc2 }),
        DocValue::Int(i) => write_int(*i, out),
        DocValue::UInt(u) => write_uint(*u, out),
        DocValue::Float(f) => {
            out.push(0xcb);
            out.extend_from_slice(&f.to_be_bytes());
        }
        DocValue::Str(s) => {
            write_str_header(s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DocValue::Bytes(b) => {
            write_bin_header(b.len(), out);
            out.extend_from_slice(b);
        }
        DocValue::Array(items) => {
            write_array_header(items.len(), out);
            for item in items {
                encode(item, out);
            }
        }
        DocValue::Object(map) => {
            write_map_header(map.len(), out);
            for (key, item) in map {
                write_str_header(key.len(), out);
                out.extend_from_slice(key.as_bytes());
                encode(item, out);
            }
        }
    }
}

fn write_int(int: i64, out: &mut Vec<u8>) {
    if int >= 0 {
        return write_uint(int as u64, out);
    }
    if int >= -0x20 {
        out.push(int as u8); // negative fixint
    } else if int >= i8::MIN as i64 {
        out.push(0xd0);
        out.push(int as i8 as u8);
    } else if int >= i16::MIN as i64 {
        out.push(0xd1);
        out.extend_from_slice(&(int as i16).to_be_bytes());
    } else if int >= i32::MIN as i64 {
        out.push(0xd2);
        out.extend_from_slice(&(int as i32).to_be_bytes());
    } else {
        out.push(0xd3);
        out.extend_from_slice(&int.to_be_bytes());
    }
}

fn write_uint(uint: u64, out: &mut Vec<u8>) {
    if uint <= 0x7f {
        out.push(uint as u8); // positive fixint
    } else if uint <= u8::MAX as u64 {
        out.push(0xcc);
        out.push(uint as u8);
    } else if uint <= u16::MAX as u64 {
        out.push(0xcd);
        out.extend_from_slice(&(uint as u16).to_be_bytes());
    } else if uint <= u32::MAX as u64 {
        out.push(0xce);
        out.extend_from_slice(&(uint as u32).to_be_bytes());
    } else {
        out.push(0xcf);
        out.extend_from_slice(&uint.to_be_bytes());
    }
}

fn write_str_header(len: usize, out: &mut Vec<u8>) {
    if len <= 0x1f {
        out.push(0xa0 | len as u8);
    } else if len <= 0xff {
        out.push(0xd9);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xda);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xdb);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

fn write_bin_header(len: usize, out: &mut Vec<u8>) {
    if len <= 0xff {
        out.push(0xc4);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0xc5);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xc6);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

fn write_array_header(len: usize, out: &mut Vec<u8>) {
    if len <= 0xf {
        out.push(0x90 | len as u8);
    } else if len <= 0xffff {
        out.push(0xdc);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xdd);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

fn write_map_header(len: usize, out: &mut Vec<u8>) {
    if len <= 0xf {
        out.push(0x80 | len as u8);
    } else if len <= 0xffff {
        out.push(0xde);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xdf);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

pub fn decode(input: &[u8]) -> Result<DocValue, DecodeError> {
    let mut reader = Reader::new(input);
    let value = read_any(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

fn read_any(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let at = r.pos();
    let byte = r.u8()?;
    match byte {
        0x00..=0x7f => Ok(DocValue::Int(byte as i64)),
        0xe0..=0xff => Ok(DocValue::Int(byte as i8 as i64)),
        0x80..=0x8f => read_map((byte & 0xf) as usize, r),
        0x90..=0x9f => read_array((byte & 0xf) as usize, r),
        0xa0..=0xbf => Ok(DocValue::Str(r.utf8((byte & 0x1f) as usize)?.to_owned())),
        0xc0 => Ok(DocValue::Null),
        0xc2 => Ok(DocValue::Bool(false)),
        0xc3 => Ok(DocValue::Bool(true)),
        0xc4 => {
            let n = r.u8()? as usize;
            Ok(DocValue::Bytes(r.take(n)?.to_vec()))
        }
        0xc5 => {
            let n = r.u16_be()? as usize;
            Ok(DocValue::Bytes(r.take(n)?.to_vec()))
        }
        0xc6 => {
            let n = r.u32_be()? as usize;
            Ok(DocValue::Bytes(r.take(n)?.to_vec()))
        }
        0xca => Ok(DocValue::Float(r.f32_be()? as f64)),
        0xcb => Ok(DocValue::Float(r.f64_be()?)),
        0xcc => Ok(DocValue::Int(r.u8()? as i64)),
        0xcd => Ok(DocValue::Int(r.u16_be()? as i64)),
        0xce => Ok(DocValue::Int(r.u32_be()? as i64)),
        0xcf => Ok(DocValue::integer(r.u64_be()?)),
        0xd0 => Ok(DocValue::Int(r.i8()? as i64)),
        0xd1 => Ok(DocValue::Int(r.i16_be()? as i64)),
        0xd2 => Ok(DocValue::Int(r.i32_be()? as i64)),
        0xd3 => Ok(DocValue::Int(r.i64_be()?)),
        0xd9 => {
            let n = r.u8()? as usize;
            Ok(DocValue::Str(r.utf8(n)?.to_owned()))
        }
        0xda => {
            let n = r.u16_be()? as usize;
            Ok(DocValue::Str(r.utf8(n)?.to_owned()))
        }
        0xdb => {
            let n = r.u32_be()? as usize;
            Ok(DocValue::Str(r.utf8(n)?.to_owned()))
        }
        0xdc => {
            let n = r.u16_be()? as usize;
            read_array(n, r)
        }
        0xdd => {
            let n = r.u32_be()? as usize;
            read_array(n, r)
        }
        0xde => {
            let n = r.u16_be()? as usize;
            read_map(n, r)
        }
        0xdf => {
            let n = r.u32_be()? as usize;
            read_map(n, r)
        }
        0xc7..=0xc9 | 0xd4..=0xd8 => Err(DecodeError::Unsupported("msgpack extension")),
        _ => Err(DecodeError::UnexpectedByte(byte, at)),
    }
}

fn read_array(count: usize, r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(read_any(r)?);
    }
    Ok(DocValue::Array(items))
}

fn read_map(count: usize, r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = read_key(r)?;
        let value = read_any(r)?;
        map.insert(key, value);
    }
    Ok(DocValue::Object(map))
}

fn read_key(r: &mut Reader<'_>) -> Result<String, DecodeError> {
    let at = r.pos();
    let byte = r.u8()?;
    let len = match byte {
        0xa0..=0xbf => (byte & 0x1f) as usize,
        0xd9 => r.u8()? as usize,
        0xda => r.u16_be()? as usize,
        0xdb => r.u32_be()? as usize,
        _ => return Err(DecodeError::UnexpectedByte(byte, at)),
    };
    Ok(r.utf8(len)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: DocValue) -> DocValue {
        let mut buf = Vec::new();
        encode(&value, &mut buf);
        decode(&buf).unwrap()
    }

    #[test]
    fn scalar_wire_bytes() {
        let mut buf = Vec::new();
        encode(&DocValue::Int(5), &mut buf);
        assert_eq!(buf, [0x05]);

        buf.clear();
        encode(&DocValue::Int(-3), &mut buf);
        assert_eq!(buf, [0xfd]);

        buf.clear();
        encode(&DocValue::Str("hi".into()), &mut buf);
        assert_eq!(buf, [0xa2, b'h', b'i']);

        buf.clear();
        encode(&DocValue::Bytes(vec![1, 2]), &mut buf);
        assert_eq!(buf, [0xc4, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn integer_kind_survives() {
        assert_eq!(roundtrip(DocValue::Int(i64::MIN)), DocValue::Int(i64::MIN));
        assert_eq!(roundtrip(DocValue::Int(i64::MAX)), DocValue::Int(i64::MAX));
        let huge = DocValue::UInt(u64::MAX);
        assert_eq!(roundtrip(huge.clone()), huge);
    }

    #[test]
    fn nested_document_roundtrip() {
        let doc: DocValue = serde_json::from_str::<serde_json::Value>(
            r#"{"a":[1,2.5,null],"b":{"c":true,"d":"text"}}"#,
        )
        .unwrap()
        .into();
        assert_eq!(roundtrip(doc.clone()), doc);
    }

    #[test]
    fn sorted_keys_make_encoding_deterministic() {
        let a: DocValue = serde_json::from_str::<serde_json::Value>(r#"{"x":1,"a":2}"#)
            .unwrap()
            .into();
        let b: DocValue = serde_json::from_str::<serde_json::Value>(r#"{"a":2,"x":1}"#)
            .unwrap()
            .into();
        let mut left = Vec::new();
        let mut right = Vec::new();
        encode(&a, &mut left);
        encode(&b, &mut right);
        assert_eq!(left, right);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = Vec::new();
        encode(&DocValue::Null, &mut buf);
        buf.push(0x00);
        assert_eq!(decode(&buf), Err(DecodeError::Trailing));
    }

    #[test]
    fn extensions_are_unsupported() {
        assert!(matches!(
            decode(&[0xd4, 0x01, 0x00]),
            Err(DecodeError::Unsupported(_))
        ));
    }
}
