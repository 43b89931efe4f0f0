// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed records mapped from field-id structs at the facade edge.
//!
//! The codec hands back tagged maps; these constructors pick out the fields
//! a caller actually needs and leave unknown ids untouched underneath.

use crate::error::{Error, Result};
use crate::thrift::{ReplyPayload, Struct, Value};

/// Unwrap a reply payload into its struct, or fail as a codec error.
pub fn expect_struct(payload: ReplyPayload, method: &str) -> Result<Struct> {
    match payload {
        Some(Value::Struct(s)) => Ok(s),
        Some(other) => Err(Error::Codec(format!(
            "{method}: expected struct payload, got {:?}",
            other.ttype()
        ))),
        None => Err(Error::Codec(format!("{method}: empty reply"))),
    }
}

/// RSA public key material for the credential envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyInfo {
    pub keynm: String,
    pub nvalue: String,
    pub evalue: String,
    pub session_key: String,
}

impl RsaKeyInfo {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self {
            keynm: s.string_at(1).ok_or_else(|| missing("getRSAKeyInfo", 1))?,
            nvalue: s.string_at(2).ok_or_else(|| missing("getRSAKeyInfo", 2))?,
            evalue: s.string_at(3).ok_or_else(|| missing("getRSAKeyInfo", 3))?,
            session_key: s.string_at(4).unwrap_or_default(),
        })
    }
}

/// v3 token bundle: access + refresh token with issue/expiry arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_in: Option<i64>,
}

impl TokenInfo {
    pub fn from_struct(s: &Struct) -> Option<Self> {
        Some(Self {
            access_token: s.string_at(1)?,
            refresh_token: s.string_at(2),
            issued_at: s.i64_at(3),
            expires_in: s.i64_at(4),
        })
    }

    /// Absolute expiry in unix seconds, when the server told us enough.
    pub fn expiry_at(&self) -> Option<i64> {
        Some(self.issued_at? + self.expires_in?)
    }
}

/// Response of `loginZ` / `loginV2`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginResult {
    pub auth_token: Option<String>,
    pub certificate: Option<String>,
    pub verifier: Option<String>,
    pub pin_code: Option<String>,
    pub token_info: Option<TokenInfo>,
}

impl LoginResult {
    pub fn from_struct(s: &Struct) -> Self {
        Self {
            auth_token: s.string_at(1),
            certificate: s.string_at(2),
            verifier: s.string_at(3),
            pin_code: s.string_at(4),
            token_info: s.struct_at(9).and_then(TokenInfo::from_struct),
        }
    }
}

/// `createSession` response: the `sqr` session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrSession {
    pub sqr: String,
}

impl QrSession {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self { sqr: s.string_at(1).ok_or_else(|| missing("createSession", 1))? })
    }
}

/// `createQrCode` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub url: String,
}

impl QrCode {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self { url: s.string_at(1).ok_or_else(|| missing("createQrCode", 1))? })
    }
}

/// `createPinCode` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPinCode {
    pub pin_code: String,
}

impl QrPinCode {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self { pin_code: s.string_at(1).ok_or_else(|| missing("createPinCode", 1))? })
    }
}

/// `qrCodeLogin` (v1) response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QrLoginResult {
    pub certificate: Option<String>,
    pub auth_token: Option<String>,
    pub mid: Option<String>,
}

impl QrLoginResult {
    pub fn from_struct(s: &Struct) -> Self {
        Self {
            certificate: s.string_at(1),
            auth_token: s.string_at(2),
            mid: s.string_at(3),
        }
    }
}

/// `qrCodeLoginV2` response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QrLoginV2Result {
    pub certificate: Option<String>,
    pub mid: Option<String>,
    pub token_info: Option<TokenInfo>,
}

impl QrLoginV2Result {
    pub fn from_struct(s: &Struct) -> Self {
        Self {
            certificate: s.string_at(1),
            mid: s.string_at(2),
            token_info: s.struct_at(3).and_then(TokenInfo::from_struct),
        }
    }
}

/// `refresh` (token refresh) response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefreshResult {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_in: Option<i64>,
}

impl RefreshResult {
    pub fn from_struct(s: &Struct) -> Self {
        Self {
            access_token: s.string_at(1),
            refresh_token: s.string_at(3),
            issued_at: s.i64_at(4),
            expires_in: s.i64_at(5),
        }
    }

    pub fn expiry_at(&self) -> Option<i64> {
        Some(self.issued_at? + self.expires_in?)
    }
}

/// User profile (the subset the core needs).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    pub mid: String,
    pub display_name: String,
    pub picture_status: Option<String>,
    pub status_message: Option<String>,
}

impl Profile {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self {
            mid: s.string_at(1).ok_or_else(|| missing("getProfile", 1))?,
            display_name: s.string_at(20).unwrap_or_default(),
            picture_status: s.string_at(22),
            status_message: s.string_at(24),
        })
    }
}

/// A contact (friend) record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    pub mid: String,
    pub display_name: String,
    pub status_message: Option<String>,
}

impl Contact {
    pub fn from_struct(s: &Struct) -> Result<Self> {
        Ok(Self {
            mid: s.string_at(1).ok_or_else(|| missing("getContact", 1))?,
            display_name: s.string_at(22).unwrap_or_default(),
            status_message: s.string_at(24),
        })
    }
}

/// A single realtime chat event. The payload stays a tagged struct; helpers
/// pull the common message fields out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareEvent {
    pub created_time: i64,
    pub event_type: i32,
    pub payload: Struct,
}

impl SquareEvent {
    pub fn from_value(value: &Value) -> Option<Self> {
        let s = value.as_struct()?;
        Some(Self {
            created_time: s.i64_at(1).unwrap_or(0),
            event_type: s.i32_at(2).unwrap_or(-1),
            payload: s.struct_at(3).cloned().unwrap_or_default(),
        })
    }

    /// The received-message branch of the payload, when present.
    fn receive_message(&self) -> Option<&Struct> {
        self.payload.struct_at(1)
    }

    pub fn square_chat_mid(&self) -> Option<&str> {
        self.receive_message().and_then(|m| m.str_at(1))
    }

    fn message(&self) -> Option<&Struct> {
        self.receive_message().and_then(|m| m.struct_at(2)).and_then(|sm| sm.struct_at(1))
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message().and_then(|m| m.str_at(4))
    }

    pub fn message_text(&self) -> Option<&str> {
        self.message().and_then(|m| m.str_at(10))
    }

    pub fn sender_mid(&self) -> Option<&str> {
        self.message().and_then(|m| m.str_at(1))
    }
}

/// `fetchSquareChatEvents` response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchChatEvents {
    pub events: Vec<SquareEvent>,
    pub sync_token: Option<String>,
    pub continuation_token: Option<String>,
}

impl FetchChatEvents {
    pub fn from_struct(s: &Struct) -> Self {
        let events = s
            .get(1)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(SquareEvent::from_value).collect())
            .unwrap_or_default();
        Self {
            events,
            sync_token: s.string_at(2),
            continuation_token: s.string_at(3),
        }
    }
}

/// `fetchMyEvents` response (the push sign-on's first batch).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchMyEvents {
    pub events: Vec<SquareEvent>,
    pub sync_token: Option<String>,
    pub continuation_token: Option<String>,
}

impl FetchMyEvents {
    pub fn from_struct(s: &Struct) -> Self {
        let events = s
            .get(2)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(SquareEvent::from_value).collect())
            .unwrap_or_default();
        Self {
            events,
            sync_token: s.string_at(3),
            continuation_token: s.string_at(4),
        }
    }
}

/// Channel token issuance result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelToken {
    pub channel_access_token: Option<String>,
    pub obs_token: Option<String>,
    pub expiration: Option<i64>,
}

impl ChannelToken {
    pub fn from_struct(s: &Struct) -> Self {
        Self {
            // Newer servers put the token at field 5, older ones at 1.
            channel_access_token: s.string_at(5).or_else(|| s.string_at(1)),
            obs_token: s.string_at(2),
            expiration: s.i64_at(3),
        }
    }
}

fn missing(method: &str, field: i16) -> Error {
    Error::Codec(format!("{method}: missing field {field}"))
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
