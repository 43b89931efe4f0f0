// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-chat event fetchers.
//!
//! Each watched chat drains its backlog with sync + continuation cursors.
//! Polling mode runs one worker task per chat; push-driven mode runs a
//! single cycle over all chats, serialized by a non-reentrant fetch lock so
//! a flood of pushes coalesces instead of overlapping.
//!
//! Delivery contract: events are enqueued to the dispatcher first, the
//! cursor pair is persisted after. A crash in between re-delivers the same
//! events on restart: duplicates are possible at the crash boundary, loss
//! is not, and the sync token never advances past undelivered events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::dispatch::QueuedEvent;
use crate::error::Result;
use crate::push::frame::SERVICE_SQUARE;
use crate::service::square::{FetchChatEventsRequest, SquareEvents};
use crate::storage;

/// Knobs for the fetch workers. Defaults follow the production cadence;
/// tests shrink the pauses.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Events per fetch.
    pub limit: i32,
    /// 2 asks the server to prefetch sender profile data.
    pub fetch_type: i32,
    /// Pause after a rate-limit classification.
    pub rate_limit_pause: Duration,
    /// Pause after a transient error.
    pub transient_pause: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            fetch_type: 2,
            rate_limit_pause: Duration::from_secs(2),
            transient_pause: Duration::from_millis(100),
        }
    }
}

/// The ordered set of chats a session watches. Mutation goes through the
/// session controller; workers read snapshots.
#[derive(Default)]
pub struct WatchedChats {
    chats: std::sync::RwLock<Vec<String>>,
}

impl WatchedChats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chat; returns false if it was already watched.
    pub fn add(&self, chat_mid: &str) -> bool {
        let mut chats = self.write();
        if chats.iter().any(|c| c == chat_mid) {
            return false;
        }
        chats.push(chat_mid.to_owned());
        true
    }

    /// Remove a chat; cursors in the store are preserved.
    pub fn remove(&self, chat_mid: &str) -> bool {
        let mut chats = self.write();
        let before = chats.len();
        chats.retain(|c| c != chat_mid);
        chats.len() != before
    }

    pub fn contains(&self, chat_mid: &str) -> bool {
        self.read().iter().any(|c| c == chat_mid)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
        match self.chats.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
        match self.chats.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// What one fetch step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No sync token existed; a unit probe established one without
    /// delivering history.
    Probed,
    /// A normal fetch; carries the number of delivered events.
    Fetched(usize),
}

/// Shared fetch machinery used by both trigger modes.
pub struct FetchWorker {
    source: Arc<dyn SquareEvents>,
    session: storage::Session,
    config: FetcherConfig,
    queue: mpsc::Sender<QueuedEvent>,
    cancel: CancellationToken,
}

impl FetchWorker {
    pub fn new(
        source: Arc<dyn SquareEvents>,
        session: storage::Session,
        config: FetcherConfig,
        queue: mpsc::Sender<QueuedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { source, session, config, queue, cancel }
    }

    /// One fetch step for one chat: probe when no sync token exists,
    /// otherwise drain a page, enqueue in order, then persist the cursor
    /// pair atomically.
    pub async fn drain_chat(&self, chat_mid: &str) -> Result<FetchOutcome> {
        let cursor = self.session.cursor(chat_mid);

        let Some(sync_token) = cursor.sync_token else {
            // First contact: learn the latest position without replaying
            // old history.
            let resp = self
                .source
                .fetch_chat_events(FetchChatEventsRequest {
                    chat_mid: chat_mid.to_owned(),
                    sync_token: None,
                    continuation_token: None,
                    limit: 1,
                    fetch_type: self.config.fetch_type,
                    subscription_id: 0,
                })
                .await?;
            if let Some(token) = resp.sync_token {
                self.session.set_cursor(chat_mid, &token, None)?;
                tracing::debug!(chat = %chat_mid, "initialized sync token");
            }
            return Ok(FetchOutcome::Probed);
        };

        let resp = self
            .source
            .fetch_chat_events(FetchChatEventsRequest {
                chat_mid: chat_mid.to_owned(),
                sync_token: Some(sync_token.clone()),
                continuation_token: cursor.continuation,
                limit: self.config.limit,
                fetch_type: self.config.fetch_type,
                subscription_id: 0,
            })
            .await?;

        let delivered = resp.events.len();
        for event in resp.events {
            let queued = QueuedEvent { service: SERVICE_SQUARE, event };
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(FetchOutcome::Fetched(0)),
                sent = self.queue.send(queued) => {
                    if sent.is_err() {
                        tracing::debug!(chat = %chat_mid, "dispatcher gone, dropping fetch");
                        return Ok(FetchOutcome::Fetched(0));
                    }
                }
            }
        }

        // Cursor advances only once every event of this page is queued; an
        // absent continuation clears the stored one in the same write.
        let new_sync = resp.sync_token.unwrap_or(sync_token);
        self.session.set_cursor(chat_mid, &new_sync, resp.continuation_token.as_deref())?;

        Ok(FetchOutcome::Fetched(delivered))
    }

    /// One step with the retry policy applied: rate limits pause and retry
    /// in place, transient errors pause briefly; the cursor never moves on
    /// an error.
    pub async fn step(&self, chat_mid: &str) -> Option<FetchOutcome> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match self.drain_chat(chat_mid).await {
                Ok(outcome) => return Some(outcome),
                Err(e) if e.is_rate_limit() => {
                    tracing::warn!(chat = %chat_mid, "rate limited, pausing fetch");
                    if self.pause(self.config.rate_limit_pause).await {
                        return None;
                    }
                }
                Err(e) => {
                    tracing::debug!(chat = %chat_mid, err = %e, "fetch error, retrying");
                    if self.pause(self.config.transient_pause).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Continuous polling loop for one chat (polling mode).
    pub async fn run_polling(&self, chat_mid: String) {
        tracing::info!(chat = %chat_mid, "chat worker started");
        while !self.cancel.is_cancelled() {
            if self.step(&chat_mid).await.is_none() {
                break;
            }
        }
        tracing::info!(chat = %chat_mid, "chat worker stopped");
    }

    /// Push-driven mode: wait for triggers and run single-shot cycles over
    /// all watched chats. The fetch lock serializes cycles; when it is
    /// already held the trigger has coalesced into the running cycle.
    pub async fn run_push_driven(
        &self,
        watched: Arc<WatchedChats>,
        trigger: Arc<Notify>,
        fetch_lock: Arc<tokio::sync::Mutex<()>>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = trigger.notified() => {}
            }
            let Ok(_guard) = fetch_lock.try_lock() else {
                tracing::trace!("fetch cycle already running, trigger coalesced");
                continue;
            };
            for chat_mid in watched.snapshot() {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.step(&chat_mid).await;
            }
        }
    }

    /// Sleep unless cancelled first; returns true when cancelled.
    async fn pause(&self, d: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(d) => false,
        }
    }
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
