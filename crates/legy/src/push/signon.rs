// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sign-on request tracking and response reassembly.
//!
//! A sign-on response may arrive split across several frames for the same
//! request id; fragments accumulate until the fin bit. Fragments are
//! processed in arrival order; a response for an id we never issued (or
//! already completed) is a protocol error.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// One in-flight sign-on request.
#[derive(Debug, Clone)]
struct Pending {
    service: u8,
    method: String,
    partial: Vec<u8>,
}

/// A fully reassembled sign-on response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSignOn {
    pub request_id: u16,
    pub service: u8,
    pub method: String,
    pub payload: Vec<u8>,
}

/// Monotonic request-id allocator plus partial-buffer registry.
#[derive(Default)]
pub struct SignOnRegistry {
    next_id: u16,
    pending: HashMap<u16, Pending>,
}

impl SignOnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id for a call. Ids start at 1; 0 never
    /// appears on the wire.
    pub fn register(&mut self, service: u8, method: &str) -> u16 {
        self.next_id += 1;
        let id = self.next_id;
        self.pending
            .insert(id, Pending { service, method: method.to_owned(), partial: Vec::new() });
        id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Feed one response fragment. Returns the completed response once the
    /// fin fragment lands.
    pub fn on_fragment(
        &mut self,
        request_id: u16,
        fin: bool,
        bytes: &[u8],
    ) -> Result<Option<CompletedSignOn>> {
        let Some(entry) = self.pending.get_mut(&request_id) else {
            return Err(Error::State(format!(
                "sign-on response for unknown request id {request_id}"
            )));
        };
        entry.partial.extend_from_slice(bytes);
        if !fin {
            return Ok(None);
        }
        let Some(entry) = self.pending.remove(&request_id) else {
            return Err(Error::State(format!("sign-on request {request_id} vanished")));
        };
        Ok(Some(CompletedSignOn {
            request_id,
            service: entry.service,
            method: entry.method,
            payload: entry.partial,
        }))
    }

    /// Drop all in-flight requests (reconnect mints a fresh subscription).
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
#[path = "signon_tests.rs"]
mod tests;
