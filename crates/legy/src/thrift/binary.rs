// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strict binary protocol (protocol id 3).
//!
//! Message header: `0x80 0x01 0x00 <kind>  <nameLen:i32> <name> <seq:i32>`.
//! Struct fields: `<type:i8> <fid:i16> <value>`, terminated by a zero type
//! byte. All multi-byte integers are big-endian.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

use super::{Field, Message, MessageKind, Struct, Ttype, Value};

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

// -- Encoding -----------------------------------------------------------------

pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u32(VERSION_1 | u32::from(msg.kind.code()));
    write_bytes(&mut buf, msg.name.as_bytes());
    buf.put_i32(msg.seq);
    write_struct(&mut buf, &msg.body);
    buf.to_vec()
}

fn write_struct(buf: &mut BytesMut, s: &Struct) {
    for field in &s.fields {
        buf.put_u8(field.value.ttype().code());
        buf.put_i16(field.id);
        write_value(buf, &field.value);
    }
    buf.put_u8(0); // STOP
}

fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::Bool(b) => buf.put_u8(u8::from(*b)),
        Value::I8(v) => buf.put_i8(*v),
        Value::I16(v) => buf.put_i16(*v),
        Value::I32(v) => buf.put_i32(*v),
        Value::I64(v) => buf.put_i64(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::Binary(b) => write_bytes(buf, b),
        Value::Struct(s) => write_struct(buf, s),
        Value::List(elem, items) | Value::Set(elem, items) => {
            buf.put_u8(elem.code());
            buf.put_i32(items.len() as i32);
            for item in items {
                write_value(buf, item);
            }
        }
        Value::Map(kt, vt, entries) => {
            buf.put_u8(kt.code());
            buf.put_u8(vt.code());
            buf.put_i32(entries.len() as i32);
            for (k, v) in entries {
                write_value(buf, k);
                write_value(buf, v);
            }
        }
    }
}

fn write_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_i32(b.len() as i32);
    buf.put_slice(b);
}

// -- Decoding -----------------------------------------------------------------

pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let mut r = Reader::new(bytes);
    let header = r.read_u32()?;
    if header & VERSION_MASK != VERSION_1 {
        return Err(Error::Codec(format!("bad binary message header {header:#010x}")));
    }
    let kind = MessageKind::from_code((header & 0xff) as u8);
    let name_bytes = r.read_len_prefixed()?;
    let name = String::from_utf8(name_bytes.to_vec())
        .map_err(|_| Error::Codec("message name is not utf-8".to_owned()))?;
    let seq = r.read_i32()?;
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
            .ok_or_else(|| Error::Codec("truncated binary payload".to_owned()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::Codec(format!("negative length {len}")));
        }
        self.take(len as usize)
    }

    fn read_struct(&mut self) -> Result<Struct> {
        let mut fields = Vec::new();
        loop {
            let type_code = self.read_u8()?;
            if type_code == 0 {
                return Ok(Struct { fields });
            }
            let ttype = Ttype::from_code(type_code)?;
            let id = self.read_i16()?;
            let value = self.read_value(ttype)?;
            fields.push(Field { id, value });
        }
    }

    fn read_value(&mut self, ttype: Ttype) -> Result<Value> {
        Ok(match ttype {
            Ttype::Bool => Value::Bool(self.read_u8()? != 0),
            Ttype::I8 => Value::I8(self.read_u8()? as i8),
            Ttype::I16 => Value::I16(self.read_i16()?),
            Ttype::I32 => Value::I32(self.read_i32()?),
            Ttype::I64 => Value::I64(self.read_i64()?),
            Ttype::Double => Value::Double(f64::from_bits(self.read_i64()? as u64)),
            Ttype::Binary => Value::Binary(self.read_len_prefixed()?.to_vec()),
            Ttype::Struct => Value::Struct(self.read_struct()?),
            Ttype::List | Ttype::Set => {
                let elem = Ttype::from_code(self.read_u8()?)?;
                let count = self.read_i32()?;
                if count < 0 {
                    return Err(Error::Codec(format!("negative collection size {count}")));
                }
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
                let kt = Ttype::from_code(self.read_u8()?)?;
                let vt = Ttype::from_code(self.read_u8()?)?;
                let count = self.read_i32()?;
                if count < 0 {
                    return Err(Error::Codec(format!("negative map size {count}")));
                }
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
#[path = "binary_tests.rs"]
mod tests;
