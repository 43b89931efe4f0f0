// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thrift codec: the value model shared by both wire formats, plus the
//! message envelope and reply parsing.
//!
//! Responses are parsed structurally: the body is a struct whose field 0
//! carries the success payload and any other field a declared exception.
//! Unknown message kinds and unknown field ids decode into the same model
//! untouched, so forward-compatible additions never fail the codec.

pub mod binary;
pub mod compact;

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Wire format selector. The wire bytes differ; the semantics do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Strict binary, protocol id 3.
    Binary,
    /// Compact, protocol id 4.
    Compact,
}

/// Thrift type codes as used by the binary protocol and the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttype {
    Bool,
    I8,
    Double,
    I16,
    I32,
    I64,
    Binary,
    Struct,
    Map,
    Set,
    List,
}

impl Ttype {
    pub fn code(&self) -> u8 {
        match self {
            Self::Bool => 2,
            Self::I8 => 3,
            Self::Double => 4,
            Self::I16 => 6,
            Self::I32 => 8,
            Self::I64 => 10,
            Self::Binary => 11,
            Self::Struct => 12,
            Self::Map => 13,
            Self::Set => 14,
            Self::List => 15,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            2 => Ok(Self::Bool),
            3 => Ok(Self::I8),
            4 => Ok(Self::Double),
            6 => Ok(Self::I16),
            8 => Ok(Self::I32),
            10 => Ok(Self::I64),
            11 => Ok(Self::Binary),
            12 => Ok(Self::Struct),
            13 => Ok(Self::Map),
            14 => Ok(Self::Set),
            15 => Ok(Self::List),
            other => Err(Error::Codec(format!("unknown thrift type code {other}"))),
        }
    }
}

/// A dynamically typed Thrift value.
///
/// Collections carry their declared element types so empty collections
/// re-encode exactly as they arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    Binary(Vec<u8>),
    Struct(Struct),
    List(Ttype, Vec<Value>),
    Set(Ttype, Vec<Value>),
    Map(Ttype, Ttype, Vec<(Value, Value)>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Binary(s.into().into_bytes())
    }

    pub fn ttype(&self) -> Ttype {
        match self {
            Self::Bool(_) => Ttype::Bool,
            Self::I8(_) => Ttype::I8,
            Self::I16(_) => Ttype::I16,
            Self::I32(_) => Ttype::I32,
            Self::I64(_) => Ttype::I64,
            Self::Double(_) => Ttype::Double,
            Self::Binary(_) => Ttype::Binary,
            Self::Struct(_) => Ttype::Struct,
            Self::List(..) => Ttype::List,
            Self::Set(..) => Ttype::Set,
            Self::Map(..) => Ttype::Map,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Binary(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I8(v) => Some(i32::from(*v)),
            Self::I16(v) => Some(i32::from(*v)),
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_struct(self) -> Option<Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(_, items) | Self::Set(_, items) => Some(items),
            _ => None,
        }
    }

    /// Flatten a `map<string, string>` into a `HashMap`.
    pub fn as_string_map(&self) -> Option<HashMap<String, String>> {
        match self {
            Self::Map(_, _, entries) => {
                let mut out = HashMap::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.as_str()?.to_owned(), v.as_str()?.to_owned());
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// A struct field: positive id plus value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: i16,
    pub value: Value,
}

/// An ordered-by-insertion field map. Field ids are never reused within
/// one struct instance; id 0 is reserved for the message-level success
/// branch and never appears inside an encoded argument struct.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Struct {
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, id: i16, value: Value) -> Self {
        self.fields.push(Field { id, value });
        self
    }

    /// Append unless the value is `None`; optional wire fields are simply
    /// absent.
    pub fn with_opt(self, id: i16, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.with(id, v),
            None => self,
        }
    }

    pub fn push(&mut self, id: i16, value: Value) {
        self.fields.push(Field { id, value });
    }

    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    pub fn take(&mut self, id: i16) -> Option<Value> {
        let idx = self.fields.iter().position(|f| f.id == id)?;
        Some(self.fields.remove(idx).value)
    }

    pub fn str_at(&self, id: i16) -> Option<&str> {
        self.get(id).and_then(Value::as_str)
    }

    pub fn string_at(&self, id: i16) -> Option<String> {
        self.str_at(id).map(str::to_owned)
    }

    pub fn i32_at(&self, id: i16) -> Option<i32> {
        self.get(id).and_then(Value::as_i32)
    }

    pub fn i64_at(&self, id: i16) -> Option<i64> {
        self.get(id).and_then(Value::as_i64)
    }

    pub fn bool_at(&self, id: i16) -> Option<bool> {
        self.get(id).and_then(Value::as_bool)
    }

    pub fn struct_at(&self, id: i16) -> Option<&Struct> {
        self.get(id).and_then(Value::as_struct)
    }
}

/// Thrift message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Reply,
    Exception,
    Oneway,
    /// Preserved verbatim for forward compatibility.
    Other(u8),
}

impl MessageKind {
    pub fn code(&self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Reply => 2,
            Self::Exception => 3,
            Self::Oneway => 4,
            Self::Other(c) => *c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Call,
            2 => Self::Reply,
            3 => Self::Exception,
            4 => Self::Oneway,
            other => Self::Other(other),
        }
    }
}

/// A complete Thrift message: envelope plus body struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub name: String,
    pub kind: MessageKind,
    pub seq: i32,
    pub body: Struct,
}

impl Message {
    pub fn call(name: impl Into<String>, seq: i32, body: Struct) -> Self {
        Self { name: name.into(), kind: MessageKind::Call, seq, body }
    }
}

/// Encode a message in the selected wire format.
pub fn encode_message(protocol: Protocol, msg: &Message) -> Vec<u8> {
    match protocol {
        Protocol::Binary => binary::encode_message(msg),
        Protocol::Compact => compact::encode_message(msg),
    }
}

/// Decode a message in the selected wire format.
pub fn decode_message(protocol: Protocol, bytes: &[u8]) -> Result<Message> {
    match protocol {
        Protocol::Binary => binary::decode_message(bytes),
        Protocol::Compact => compact::decode_message(bytes),
    }
}

/// Shorthand for encoding an outgoing call.
pub fn encode_call(protocol: Protocol, method: &str, seq: i32, args: Struct) -> Vec<u8> {
    encode_message(protocol, &Message::call(method, seq, args))
}

/// The success branch of a reply: `None` for void methods.
pub type ReplyPayload = Option<Value>;

/// Parse a reply body: field 0 is the success payload, any other field a
/// declared exception surfaced as a structured server error.
pub fn parse_reply(protocol: Protocol, bytes: &[u8]) -> Result<ReplyPayload> {
    let mut msg = decode_message(protocol, bytes)?;

    if msg.kind == MessageKind::Exception {
        // TApplicationException: 1 = message, 2 = type.
        let message = msg.body.string_at(1).unwrap_or_else(|| "application exception".to_owned());
        let code = msg.body.i32_at(2).unwrap_or(-1);
        return Err(Error::Server { code, message, metadata: HashMap::new() });
    }

    if let Some(success) = msg.body.take(0) {
        return Ok(Some(success));
    }

    // Any remaining field is a declared exception branch.
    if let Some(field) = msg.body.fields.into_iter().next() {
        return Err(declared_exception(&field.value));
    }

    Ok(None)
}

/// Map a declared exception struct `{1: code, 2: reason, 3: parameterMap}`
/// into a structured error.
fn declared_exception(value: &Value) -> Error {
    let Some(s) = value.as_struct() else {
        return Error::Server { code: -1, message: "malformed exception branch".to_owned(), metadata: HashMap::new() };
    };
    let code = s.i32_at(1).unwrap_or(-1);
    let message = s.string_at(2).unwrap_or_else(|| "unknown error".to_owned());
    let metadata = s.get(3).and_then(Value::as_string_map).unwrap_or_default();
    Error::Server { code, message, metadata }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
