// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the client core.
#[derive(Debug, Clone)]
pub enum Error {
    /// Unsupported device kind, missing refresh token, bad local setup.
    Config(String),
    /// HTTP/2 dial, read or write failure, or a non-2xx where 2xx was expected.
    Transport(String),
    /// Malformed Thrift framing, truncated payload, unknown protocol id.
    Codec(String),
    /// Login rejected, certificate refused, verifier expired, refresh on a
    /// primary device.
    Auth(String),
    /// A QR/PIN/verification long-poll exceeded its outer deadline.
    FlowTimeout(String),
    /// Server asked us to back off.
    RateLimit(String),
    /// Any other server-declared Thrift exception.
    Server { code: i32, message: String, metadata: HashMap<String, String> },
    /// Bad lifecycle transition: session already running, cursor mismatch.
    State(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Transport(_) => "TRANSPORT",
            Self::Codec(_) => "CODEC",
            Self::Auth(_) => "AUTH",
            Self::FlowTimeout(_) => "FLOW_TIMEOUT",
            Self::RateLimit(_) => "RATE_LIMIT",
            Self::Server { .. } => "SERVER",
            Self::State(_) => "STATE",
        }
    }

    /// True when a fetch worker should pause briefly and retry in place.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(_))
    }

    /// True when the underlying long-poll request merely timed out and the
    /// poll should be reissued.
    pub fn is_poll_timeout(&self) -> bool {
        match self {
            Self::Transport(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timed out") || msg.contains("timeout")
            }
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg)
            | Self::Transport(msg)
            | Self::Codec(msg)
            | Self::Auth(msg)
            | Self::FlowTimeout(msg)
            | Self::RateLimit(msg)
            | Self::State(msg) => write!(f, "{}: {msg}", self.kind()),
            Self::Server { code, message, .. } => {
                write!(f, "SERVER: [{code}] {message}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<h2::Error> for Error {
    fn from(e: h2::Error) -> Self {
        Self::Transport(format!("h2: {e}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(format!("io: {e}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
