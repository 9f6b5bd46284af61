//! Length-prefixed field primitives shared by every wire type in this crate.
//!
//! Every field is `u32` little-endian length followed by that many bytes
//! (or, for fixed-size fields, just the raw bytes). Options are a leading
//! `u8` tag (`0` = absent, `1` = present) followed by the value.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum length we'll accept for a single length-prefixed field.
/// Guards against a corrupt/hostile length prefix forcing a huge allocation.
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

pub trait Encode {
    fn encode(&self, out: &mut BytesMut);
}

pub trait Decode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self>;
}

pub fn put_bytes(out: &mut BytesMut, bytes: &[u8]) {
    out.put_u32_le(bytes.len() as u32);
    out.put_slice(bytes);
}

pub fn get_bytes(buf: &mut Bytes, field: &'static str) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(Error::Underrun { field });
    }
    let len = buf.get_u32_le() as usize;
    if len > MAX_FIELD_LEN {
        return Err(Error::TooLong {
            field,
            max: MAX_FIELD_LEN,
        });
    }
    if buf.remaining() < len {
        return Err(Error::Underrun { field });
    }
    Ok(buf.copy_to_bytes(len))
}

pub fn put_u64(out: &mut BytesMut, v: u64) {
    out.put_u64_le(v);
}

pub fn get_u64(buf: &mut Bytes, field: &'static str) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::Underrun { field });
    }
    Ok(buf.get_u64_le())
}

pub fn put_f64(out: &mut BytesMut, v: f64) {
    out.put_f64_le(v);
}

pub fn get_f64(buf: &mut Bytes, field: &'static str) -> Result<f64> {
    if buf.remaining() < 8 {
        return Err(Error::Underrun { field });
    }
    Ok(buf.get_f64_le())
}

pub fn put_option<T>(out: &mut BytesMut, value: &Option<T>, write: impl FnOnce(&mut BytesMut, &T)) {
    match value {
        Some(v) => {
            out.put_u8(1);
            write(out, v);
        }
        None => out.put_u8(0),
    }
}

pub fn get_option<T>(
    buf: &mut Bytes,
    field: &'static str,
    read: impl FnOnce(&mut Bytes) -> Result<T>,
) -> Result<Option<T>> {
    if buf.remaining() < 1 {
        return Err(Error::Underrun { field });
    }
    match buf.get_u8() {
        0 => Ok(None),
        1 => Ok(Some(read(buf)?)),
        tag => Err(Error::InvalidTag { tag, what: field }),
    }
}

pub fn put_vec<T>(out: &mut BytesMut, items: &[T], write: impl Fn(&mut BytesMut, &T)) {
    out.put_u32_le(items.len() as u32);
    for item in items {
        write(out, item);
    }
}

pub fn get_vec<T>(
    buf: &mut Bytes,
    field: &'static str,
    read: impl Fn(&mut Bytes) -> Result<T>,
) -> Result<Vec<T>> {
    if buf.remaining() < 4 {
        return Err(Error::Underrun { field });
    }
    let count = buf.get_u32_le() as usize;
    if count > MAX_FIELD_LEN {
        return Err(Error::TooLong {
            field,
            max: MAX_FIELD_LEN,
        });
    }
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(read(buf)?);
    }
    Ok(items)
}
