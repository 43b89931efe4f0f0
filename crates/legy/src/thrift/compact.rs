// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compact protocol (protocol id 4).
//!
//! Message header: `0x82 <(kind<<5)|version> <seq:varint> <nameLen:varint>
//! <name>`. Field headers pack a 4-bit id delta with a 4-bit compact type;
//! booleans are encoded inline in the field header. Integers are zig-zag
//! varints. Doubles are the 8 little-endian bytes the canonical
//! implementations emit.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

use super::{Field, Message, MessageKind, Struct, Ttype, Value};

const PROTOCOL_ID: u8 = 0x82;
const VERSION: u8 = 1;
const VERSION_MASK: u8 = 0x1f;
const KIND_SHIFT: u8 = 5;

// Compact type codes.
const CT_TRUE: u8 = 0x01;
const CT_FALSE: u8 = 0x02;
const CT_I8: u8 = 0x03;
const CT_I16: u8 = 0x04;
const CT_I32: u8 = 0x05;
const CT_I64: u8 = 0x06;
const CT_DOUBLE: u8 = 0x07;
const CT_BINARY: u8 = 0x08;
const CT_LIST: u8 = 0x09;
const CT_SET: u8 = 0x0a;
const CT_MAP: u8 = 0x0b;
const CT_STRUCT: u8 = 0x0c;

fn elem_code(ttype: Ttype) -> u8 {
    match ttype {
        Ttype::Bool => CT_TRUE,
        Ttype::I8 => CT_I8,
        Ttype::I16 => CT_I16,
        Ttype::I32 => CT_I32,
        Ttype::I64 => CT_I64,
        Ttype::Double => CT_DOUBLE,
        Ttype::Binary => CT_BINARY,
        Ttype::List => CT_LIST,
        Ttype::Set => CT_SET,
        Ttype::Map => CT_MAP,
        Ttype::Struct => CT_STRUCT,
    }
}

fn elem_type(code: u8) -> Result<Ttype> {
    match code {
        CT_TRUE | CT_FALSE => Ok(Ttype::Bool),
        CT_I8 => Ok(Ttype::I8),
        CT_I16 => Ok(Ttype::I16),
        CT_I32 => Ok(Ttype::I32),
        CT_I64 => Ok(Ttype::I64),
        CT_DOUBLE => Ok(Ttype::Double),
        CT_BINARY => Ok(Ttype::Binary),
        CT_LIST => Ok(Ttype::List),
        CT_SET => Ok(Ttype::Set),
        CT_MAP => Ok(Ttype::Map),
        CT_STRUCT => Ok(Ttype::Struct),
        other => Err(Error::Codec(format!("unknown compact type code {other}"))),
    }
}

// -- Encoding -----------------------------------------------------------------

pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(PROTOCOL_ID);
    buf.put_u8((msg.kind.code() << KIND_SHIFT) | (VERSION & VERSION_MASK));
    write_varint(&mut buf, msg.seq as u32 as u64);
    write_varint(&mut buf, msg.name.len() as u64);
    buf.put_slice(msg.name.as_bytes());
    write_struct(&mut buf, &msg.body);
    buf.to_vec()
}

fn write_struct(buf: &mut BytesMut, s: &Struct) {
    let mut last_id: i16 = 0;
    for field in &s.fields {
        let ctype = match &field.value {
            Value::Bool(true) => CT_TRUE,
            Value::Bool(false) => CT_FALSE,
            other => elem_code(other.ttype()),
        };
        let delta = i32::from(field.id) - i32::from(last_id);
        if delta > 0 && delta <= 15 {
            buf.put_u8(((delta as u8) << 4) | ctype);
        } else {
            buf.put_u8(ctype);
            write_varint(buf, zigzag32(i32::from(field.id)));
        }
        if !matches!(field.value, Value::Bool(_)) {
            write_value(buf, &field.value);
        }
        last_id = field.id;
    }
    buf.put_u8(0); // STOP
}

fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        // Only reached inside collections; field-level bools live in the
        // field header.
        Value::Bool(b) => buf.put_u8(if *b { CT_TRUE } else { CT_FALSE }),
        Value::I8(v) => buf.put_i8(*v),
        Value::I16(v) => write_varint(buf, zigzag32(i32::from(*v))),
        Value::I32(v) => write_varint(buf, zigzag32(*v)),
        Value::I64(v) => write_varint(buf, zigzag64(*v)),
        Value::Double(v) => buf.put_f64_le(*v),
        Value::Binary(b) => {
            write_varint(buf, b.len() as u64);
            buf.put_slice(b);
        }
        Value::Struct(s) => write_struct(buf, s),
        Value::List(elem, items) | Value::Set(elem, items) => {
            let code = elem_code(*elem);
            if items.len() < 15 {
                buf.put_u8(((items.len() as u8) << 4) | code);
            } else {
                buf.put_u8(0xf0 | code);
                write_varint(buf, items.len() as u64);
            }
            for item in items {
                write_value(buf, item);
            }
        }
        Value::Map(kt, vt, entries) => {
            if entries.is_empty() {
                buf.put_u8(0);
                return;
            }
            write_varint(buf, entries.len() as u64);
            buf.put_u8((elem_code(*kt) << 4) | elem_code(*vt));
            for (k, v) in entries {
                write_value(buf, k);
                write_value(buf, v);
            }
        }
    }
}

fn write_varint(buf: &mut BytesMut, mut n: u64) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn zigzag32(n: i32) -> u64 {
    (((n << 1) ^ (n >> 31)) as u32) as u64
}

fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

// -- Decoding -----------------------------------------------------------------

pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let mut r = Reader::new(bytes);
    let pid = r.read_u8()?;
    if pid != PROTOCOL_ID {
        return Err(Error::Codec(format!("bad compact protocol id {pid:#04x}")));
    }
    let vk = r.read_u8()?;
    if vk & VERSION_MASK != VERSION {
        return Err(Error::Codec(format!("bad compact version {:#04x}", vk & VERSION_MASK)));
    }
    let kind = MessageKind::from_code(vk >> KIND_SHIFT);
    let seq = r.read_varint()? as u32 as i32;
    let name_len = r.read_varint()? as usize;
    let name = String::from_utf8(r.take(name_len)?.to_vec())
        .map_err(|_| Error::Codec("message name is not utf-8".to_owned()))?;
    let body = r.read_struct()?;
    Ok(Message { name, kind, seq, body })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| Error::Codec("truncated compact payload".to_owned()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut out: u64 = 0;
        for shift in 0..10u32 {
            let byte = self.read_u8()?;
            out |= u64::from(byte & 0x7f) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(out);
            }
        }
        Err(Error::Codec("malformed varint".to_owned()))
    }

    fn read_zigzag32(&mut self) -> Result<i32> {
        let n = self.read_varint()? as u32;
        Ok(((n >> 1) as i32) ^ -((n & 1) as i32))
    }

    fn read_zigzag64(&mut self) -> Result<i64> {
        let n = self.read_varint()?;
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    fn read_struct(&mut self) -> Result<Struct> {
        let mut fields = Vec::new();
        let mut last_id: i16 = 0;
        loop {
            let header = self.read_u8()?;
            if header == 0 {
                return Ok(Struct { fields });
            }
            let delta = header >> 4;
            let ctype = header & 0x0f;
            let id = if delta == 0 {
                let raw = self.read_zigzag32()?;
                i16::try_from(raw)
                    .map_err(|_| Error::Codec(format!("field id {raw} out of range")))?
            } else {
                last_id
                    .checked_add(i16::from(delta))
                    .ok_or_else(|| Error::Codec("field id overflow".to_owned()))?
            };
            let value = match ctype {
                CT_TRUE => Value::Bool(true),
                CT_FALSE => Value::Bool(false),
                other => self.read_value(elem_type(other)?)?,
            };
            fields.push(Field { id, value });
            last_id = id;
        }
    }

    fn read_value(&mut self, ttype: Ttype) -> Result<Value> {
        Ok(match ttype {
            Ttype::Bool => Value::Bool(self.read_u8()? == CT_TRUE),
            Ttype::I8 => Value::I8(self.read_u8()? as i8),
            Ttype::I16 => {
                let v = self.read_zigzag32()?;
                Value::I16(
                    i16::try_from(v).map_err(|_| Error::Codec(format!("i16 out of range: {v}")))?,
                )
            }
            Ttype::I32 => Value::I32(self.read_zigzag32()?),
            Ttype::I64 => Value::I64(self.read_zigzag64()?),
            Ttype::Double => {
                let b = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                Value::Double(f64::from_le_bytes(arr))
            }
            Ttype::Binary => {
                let len = self.read_varint()? as usize;
                Value::Binary(self.take(len)?.to_vec())
            }
            Ttype::Struct => Value::Struct(self.read_struct()?),
            Ttype::List | Ttype::Set => {
                let header = self.read_u8()?;
                let elem = elem_type(header & 0x0f)?;
                let count = if header >> 4 == 0x0f {
                    self.read_varint()? as usize
                } else {
                    (header >> 4) as usize
                };
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.read_value(elem)?);
                }
                if ttype == Ttype::List {
                    Value::List(elem, items)
                } else {
                    Value::Set(elem, items)
                }
            }
            Ttype::Map => {
                let count = self.read_varint()? as usize;
                if count == 0 {
                    // Declared key/value types are absent for empty maps;
                    // binary string pairs are the dominant shape on this wire.
                    return Ok(Value::Map(Ttype::Binary, Ttype::Binary, Vec::new()));
                }
                let kv = self.read_u8()?;
                let kt = elem_type(kv >> 4)?;
                let vt = elem_type(kv & 0x0f)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let k = self.read_value(kt)?;
                    let v = self.read_value(vt)?;
                    entries.push((k, v));
                }
                Value::Map(kt, vt, entries)
            }
        })
    }
}

#[cfg(test)]
#[path = "compact_tests.rs"]
mod tests;
