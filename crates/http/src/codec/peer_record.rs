//! Binary codec of the peer telemetry record.
//!
//! The layout is protobuf-compatible so existing workers keep talking to the server:
//!
//! | field | number | wire type | tag byte |
//! |-------|--------|-----------|----------|
//! | `addr` | 1 | length-delimited (UTF-8) | `0x0A` |
//! | `age`  | 2 | varint | `0x10` |
//!
//! Fields at their default value are omitted on encode and defaulted on decode.
//! Unknown fields are skipped; when a field repeats, the last occurrence wins.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;

const ADDR_FIELD: u64 = 1;
const AGE_FIELD: u64 = 2;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

/// A varint never spans more than ten bytes.
const MAX_VARINT_BYTES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub addr: String,
    pub age: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerRecordError {
    #[error("record truncated")]
    Truncated,

    #[error("varint longer than {MAX_VARINT_BYTES} bytes")]
    VarintOverflow,

    #[error("invalid field number 0")]
    InvalidField,

    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u64, wire_type: u64 },

    #[error("addr is not valid utf-8")]
    InvalidUtf8,
}

impl PeerRecord {
    pub fn new<S: Into<String>>(addr: S, age: u64) -> Self {
        Self { addr: addr.into(), age }
    }

    pub fn decode(mut src: &[u8]) -> Result<Self, PeerRecordError> {
        let mut record = Self::default();

        while src.has_remaining() {
            let key = get_varint(&mut src)?;
            let (field, wire_type) = (key >> 3, key & 0x07);
            if field == 0 {
                return Err(PeerRecordError::InvalidField);
            }

            match (field, wire_type) {
                (ADDR_FIELD, WIRE_LEN) => {
                    let value = get_len_delimited(&mut src)?;
                    record.addr = String::from_utf8(value.to_vec()).map_err(|_e| PeerRecordError::InvalidUtf8)?;
                }
                (AGE_FIELD, WIRE_VARINT) => record.age = get_varint(&mut src)?,
                (_, WIRE_VARINT) => {
                    get_varint(&mut src)?;
                }
                (_, WIRE_FIXED64) => skip(&mut src, 8)?,
                (_, WIRE_LEN) => {
                    get_len_delimited(&mut src)?;
                }
                (_, WIRE_FIXED32) => skip(&mut src, 4)?,
                (field, wire_type) => return Err(PeerRecordError::UnsupportedWireType { field, wire_type }),
            }
        }

        Ok(record)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        if !self.addr.is_empty() {
            put_varint(dst, (ADDR_FIELD << 3) | WIRE_LEN);
            put_varint(dst, self.addr.len() as u64);
            dst.put_slice(self.addr.as_bytes());
        }
        if self.age != 0 {
            put_varint(dst, (AGE_FIELD << 3) | WIRE_VARINT);
            put_varint(dst, self.age);
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.addr.len() + 2 * MAX_VARINT_BYTES);
        self.encode(&mut dst);
        dst.freeze()
    }
}

fn get_varint(src: &mut &[u8]) -> Result<u64, PeerRecordError> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_BYTES {
        if !src.has_remaining() {
            return Err(PeerRecordError::Truncated);
        }
        let byte = src.get_u8();
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(PeerRecordError::VarintOverflow)
}

fn get_len_delimited<'a>(src: &mut &'a [u8]) -> Result<&'a [u8], PeerRecordError> {
    let len = usize::try_from(get_varint(src)?).map_err(|_e| PeerRecordError::Truncated)?;
    if src.len() < len {
        return Err(PeerRecordError::Truncated);
    }
    let (value, rest) = src.split_at(len);
    *src = rest;
    Ok(value)
}

fn skip(src: &mut &[u8], len: usize) -> Result<(), PeerRecordError> {
    if src.len() < len {
        return Err(PeerRecordError::Truncated);
    }
    src.advance(len);
    Ok(())
}

fn put_varint(dst: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        #[allow(clippy::cast_possible_truncation, reason = "masked to seven bits")]
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation, reason = "value is below 0x80")]
    dst.put_u8(value as u8);
}
