//! Universal Binary JSON codec.
//!
//! Wire markers: `Z` null, `T`/`F` booleans, `U`/`i`/`I`/`l`/`L` integers
//! of growing width (big-endian), `d`/`D` floats, `S` strings (type byte,
//! integer length, UTF-8), `[`/`]` arrays, `{`/`}` objects with
//! length-prefixed keys, and the strongly-typed array shorthand
//! `[$U#<count>` for binary payloads.

use std::collections::BTreeMap;

use super::bytes::{DecodeError, Reader};
use super::value::DocValue;

pub fn encode(value: &DocValue, out: &mut Vec<u8>) {
    match value {
        DocValue::Null => out.push(b'Z'),
        DocValue::Bool(b) => out.push(if *b { b'T' } else { b'F' }),
        DocValue::Int(i) => write_int(*i, out),
        DocValue::UInt(u) => match i64::try_from(*u) {
            Ok(i) => write_int(i, out),
            // UBJSON has no unsigned 64-bit kind; magnitudes beyond i64
            // degrade to float64.
            Err(_) => write_float(*u as f64, out),
        },
        DocValue::Float(f) => write_float(*f, out),
        DocValue::Str(s) => {
            out.push(b'S');
            write_length(s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DocValue::Bytes(b) => {
            out.extend_from_slice(b"[$U#");
            write_length(b.len(), out);
            out.extend_from_slice(b);
        }
        DocValue::Array(items) => {
            out.push(b'[');
            for item in items {
                encode(item, out);
            }
            out.push(b']');
        }
        DocValue::Object(map) => {
            out.push(b'{');
            for (key, item) in map {
                write_length(key.len(), out);
                out.extend_from_slice(key.as_bytes());
                encode(item, out);
            }
            out.push(b'}');
        }
    }
}

fn write_int(int: i64, out: &mut Vec<u8>) {
    if (0..=0xff).contains(&int) {
        out.push(b'U');
        out.push(int as u8);
    } else if (-128..=127).contains(&int) {
        out.push(b'i');
        out.push(int as i8 as u8);
    } else if (i16::MIN as i64..=i16::MAX as i64).contains(&int) {
        out.push(b'I');
        out.extend_from_slice(&(int as i16).to_be_bytes());
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&int) {
        out.push(b'l');
        out.extend_from_slice(&(int as i32).to_be_bytes());
    } else {
        out.push(b'L');
        out.extend_from_slice(&int.to_be_bytes());
    }
}

fn write_float(float: f64, out: &mut Vec<u8>) {
    out.push(b'D');
    out.extend_from_slice(&float.to_be_bytes());
}

fn write_length(len: usize, out: &mut Vec<u8>) {
    write_int(len as i64, out);
}

pub fn decode(input: &[u8]) -> Result<DocValue, DecodeError> {
    let mut reader = Reader::new(input);
    let value = read_any(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

fn read_any(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let at = r.pos();
    let marker = r.u8()?;
    match marker {
        b'Z' | b'N' => Ok(DocValue::Null),
        b'T' => Ok(DocValue::Bool(true)),
        b'F' => Ok(DocValue::Bool(false)),
        b'U' => Ok(DocValue::Int(r.u8()? as i64)),
        b'i' => Ok(DocValue::Int(r.i8()? as i64)),
        b'I' => Ok(DocValue::Int(r.i16_be()? as i64)),
        b'l' => Ok(DocValue::Int(r.i32_be()? as i64)),
        b'L' => Ok(DocValue::Int(r.i64_be()?)),
        b'd' => Ok(DocValue::Float(r.f32_be()? as f64)),
        b'D' => Ok(DocValue::Float(r.f64_be()?)),
        b'C' => Ok(DocValue::Str((r.u8()? as char).to_string())),
        b'S' => {
            let len = read_length(r)?;
            Ok(DocValue::Str(r.utf8(len)?.to_owned()))
        }
        b'[' => read_array(r),
        b'{' => read_object(r),
        _ => Err(DecodeError::UnexpectedByte(marker, at)),
    }
}

fn read_length(r: &mut Reader<'_>) -> Result<usize, DecodeError> {
    match read_any(r)? {
        DocValue::Int(i) if i >= 0 => Ok(i as usize),
        _ => Err(DecodeError::Unsupported("non-integer length")),
    }
}

fn read_array(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    // Binary shorthand: `[$U#<count>` then raw bytes.
    if r.peek()? == b'$' {
        let at = r.pos();
        r.u8()?;
        let ty = r.u8()?;
        if ty != b'U' {
            return Err(DecodeError::Unsupported("typed array element kind"));
        }
        if r.u8()? != b'#' {
            return Err(DecodeError::UnexpectedByte(ty, at));
        }
        let count = read_length(r)?;
        return Ok(DocValue::Bytes(r.take(count)?.to_vec()));
    }
    let mut items = Vec::new();
    while r.peek()? != b']' {
        items.push(read_any(r)?);
    }
    r.u8()?;
    Ok(DocValue::Array(items))
}

fn read_object(r: &mut Reader<'_>) -> Result<DocValue, DecodeError> {
    let mut map = BTreeMap::new();
    while r.peek()? != b'}' {
        let key_len = read_length(r)?;
        let key = r.utf8(key_len)?.to_owned();
        let value = read_any(r)?;
        map.insert(key, value);
    }
    r.u8()?;
    Ok(DocValue::Object(map))
}
