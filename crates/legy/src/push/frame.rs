// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framing for the push stream.
//!
//! Every frame is `u16 sizeAndFlags, u8 kind, payload`. The size field's
//! high bit is a reserved flag and is masked off on both sides.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

pub const FRAME_STATUS: u8 = 0;
pub const FRAME_PING: u8 = 1;
pub const FRAME_SIGN_ON_REQUEST: u8 = 2;
pub const FRAME_SIGN_ON_RESPONSE: u8 = 3;
pub const FRAME_PUSH: u8 = 4;

/// Ping sub-kinds / push kinds share the same tiny vocabulary.
pub const KIND_NONE: u8 = 0;
pub const KIND_ACK: u8 = 1;
pub const KIND_ACK_REQUIRED: u8 = 2;

const SIZE_MASK: u16 = 0x7fff;
const FIN_BIT: u16 = 0x8000;

/// Service kinds multiplexed over one stream.
pub const SERVICE_SQUARE: u8 = 3;
pub const SERVICE_TALK_FETCHOPS: u8 = 5;
pub const SERVICE_TALK_SYNC: u8 = 8;
pub const SERVICE_LIVETALK: u8 = 9;

/// Bitfield the subscribe path carries: bit `service - 1` per service.
pub fn service_mask(services: &[u8]) -> u32 {
    let mut mask = 0u32;
    for s in services {
        if *s > 0 {
            mask |= 1 << (s - 1);
        }
    }
    mask
}

/// A parsed (or to-be-encoded) push-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Foreground flag plus desired server-ping interval.
    Status { foreground: bool, ping_interval_secs: u16 },
    Ping { sub_kind: u8, id: u16 },
    SignOnRequest { request_id: u16, service: u8, payload: Vec<u8> },
    SignOnResponse { request_id: u16, fin: bool, payload: Vec<u8> },
    Push { kind: u8, service: u8, push_id: i32, payload: Vec<u8> },
    /// Unknown frame kind, preserved for forward compatibility.
    Unknown { frame_kind: u8, payload: Vec<u8> },
}

impl Frame {
    /// Ack for a server ping, echoing its id.
    pub fn ping_ack(id: u16) -> Self {
        Self::Ping { sub_kind: KIND_ACK, id }
    }

    /// Ack for an ack-required push.
    pub fn push_ack(service: u8, push_id: i32) -> Self {
        Self::Push { kind: KIND_ACK, service, push_id, payload: Vec::new() }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut payload = BytesMut::with_capacity(16);
        let kind = match self {
            Self::Status { foreground, ping_interval_secs } => {
                payload.put_u8(u8::from(*foreground));
                payload.put_u16(*ping_interval_secs);
                FRAME_STATUS
            }
            Self::Ping { sub_kind, id } => {
                payload.put_u8(*sub_kind);
                payload.put_u16(*id);
                FRAME_PING
            }
            Self::SignOnRequest { request_id, service, payload: body } => {
                payload.put_u16(*request_id);
                payload.put_u8(*service);
                payload.put_u8(0);
                payload.put_u16(body.len() as u16);
                payload.put_slice(body);
                FRAME_SIGN_ON_REQUEST
            }
            Self::SignOnResponse { request_id, fin, payload: body } => {
                payload.put_u16((request_id & SIZE_MASK) | if *fin { FIN_BIT } else { 0 });
                payload.put_slice(body);
                FRAME_SIGN_ON_RESPONSE
            }
            Self::Push { kind, service, push_id, payload: body } => {
                payload.put_u8(*kind);
                payload.put_u8(*service);
                payload.put_i32(*push_id);
                payload.put_slice(body);
                FRAME_PUSH
            }
            Self::Unknown { frame_kind, payload: body } => {
                payload.put_slice(body);
                *frame_kind
            }
        };

        let mut out = BytesMut::with_capacity(3 + payload.len());
        out.put_u16(payload.len() as u16 & SIZE_MASK);
        out.put_u8(kind);
        out.put_slice(&payload);
        out.to_vec()
    }
}

/// Incremental decoder over the raw stream bytes.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() < 3 {
            return Ok(None);
        }
        let size = (u16::from_be_bytes([self.buf[0], self.buf[1]]) & SIZE_MASK) as usize;
        let kind = self.buf[2];
        if self.buf.len() < 3 + size {
            return Ok(None);
        }
        self.buf.advance(3);
        let payload = self.buf.split_to(size);
        Ok(Some(parse_frame(kind, &payload)?))
    }
}

fn parse_frame(kind: u8, payload: &[u8]) -> Result<Frame> {
    match kind {
        FRAME_STATUS => {
            if payload.len() < 3 {
                return Err(truncated("status", payload.len()));
            }
            Ok(Frame::Status {
                foreground: payload[0] != 0,
                ping_interval_secs: u16::from_be_bytes([payload[1], payload[2]]),
            })
        }
        FRAME_PING => {
            if payload.is_empty() {
                return Err(truncated("ping", 0));
            }
            let id = if payload.len() >= 3 {
                u16::from_be_bytes([payload[1], payload[2]])
            } else {
                0
            };
            Ok(Frame::Ping { sub_kind: payload[0], id })
        }
        FRAME_SIGN_ON_REQUEST => {
            // The server echoes our sign-on; parse just the id and service.
            if payload.len() < 4 {
                return Err(truncated("sign-on request", payload.len()));
            }
            let request_id = u16::from_be_bytes([payload[0], payload[1]]);
            Ok(Frame::SignOnRequest {
                request_id,
                service: payload[2],
                payload: payload.get(6..).unwrap_or_default().to_vec(),
            })
        }
        FRAME_SIGN_ON_RESPONSE => {
            if payload.len() < 2 {
                return Err(truncated("sign-on response", payload.len()));
            }
            let raw = u16::from_be_bytes([payload[0], payload[1]]);
            Ok(Frame::SignOnResponse {
                request_id: raw & SIZE_MASK,
                fin: raw & FIN_BIT != 0,
                payload: payload[2..].to_vec(),
            })
        }
        FRAME_PUSH => {
            if payload.len() < 6 {
                return Err(truncated("push", payload.len()));
            }
            let push_id = i32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]);
            Ok(Frame::Push {
                kind: payload[0],
                service: payload[1],
                push_id,
                payload: payload[6..].to_vec(),
            })
        }
        other => Ok(Frame::Unknown { frame_kind: other, payload: payload.to_vec() }),
    }
}

fn truncated(what: &str, len: usize) -> Error {
    Error::Codec(format!("truncated {what} frame ({len} bytes)"))
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
