// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed RPC facade over the transport and codec.
//!
//! Callers name services and methods; path and wire format are picked here
//! and never leak into the public surface. All session state lives in the
//! store; the facade itself is stateless apart from request sequence
//! counters.

pub mod auth;
pub mod channel;
pub mod model;
pub mod obs;
pub mod square;
pub mod talk;
pub mod timeline;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::thrift::{self, Protocol, ReplyPayload, Struct};
use crate::transport::HttpTransport;

// Gateway paths.
pub const TALK_PATH: &str = "/S4";
pub const SQUARE_PATH: &str = "/SQ1";
pub const CHANNEL_PATH: &str = "/CH4";
pub const LEGACY_TALK_PATH: &str = "/api/v3/TalkService.do";
pub const AUTH_RS_PATH: &str = "/api/v3p/rs";
pub const QR_PATH: &str = "/acct/lgn/sq/v1";
pub const QR_LONG_POLL_PATH: &str = "/acct/lp/lgn/sq/v1";
pub const TOKEN_REFRESH_PATH: &str = "/EXT/auth/tokenrefresh/v1";
pub const E2EE_VERIFY_PATH: &str = "/LF1";
pub const LEGACY_VERIFY_PATH: &str = "/Q";

/// Stateless RPC caller shared by every service.
pub struct ServiceClient {
    transport: Arc<HttpTransport>,
    reqseqs: Mutex<HashMap<&'static str, i32>>,
}

impl ServiceClient {
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self { transport, reqseqs: Mutex::new(HashMap::new()) }
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    /// Next request sequence number for a logical service.
    pub fn next_reqseq(&self, name: &'static str) -> i32 {
        let mut seqs = match self.reqseqs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = seqs.entry(name).or_insert(0);
        let out = *seq;
        *seq += 1;
        out
    }

    /// Encode, send, decode and classify one RPC.
    pub async fn call(
        &self,
        path: &str,
        protocol: Protocol,
        method: &str,
        args: Struct,
    ) -> Result<ReplyPayload> {
        self.call_with(path, protocol, method, args, None, &[]).await
    }

    pub async fn call_with(
        &self,
        path: &str,
        protocol: Protocol,
        method: &str,
        args: Struct,
        timeout: Option<Duration>,
        extra_headers: &[(String, String)],
    ) -> Result<ReplyPayload> {
        let bytes = thrift::encode_call(protocol, method, 0, args);
        tracing::debug!(path, method, len = bytes.len(), "thrift call");
        let body = self.transport.thrift_call(path, bytes, timeout, extra_headers).await?;
        thrift::parse_reply(protocol, &body).map_err(|e| classify(method, e))
    }
}

/// Normalise server-declared errors into the crate taxonomy. Rate
/// indicators become `RateLimit`; everything else stays structured.
fn classify(method: &str, err: Error) -> Error {
    match err {
        Error::Server { code, message, metadata } => {
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("rate") || lowered.contains("too many") || lowered.contains("429") {
                Error::RateLimit(format!("{method}: [{code}] {message}"))
            } else {
                Error::Server { code, message, metadata }
            }
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
