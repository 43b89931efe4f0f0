// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-consumer event dispatcher.
//!
//! Fetch workers enqueue `(serviceKind, event)` pairs into a bounded FIFO;
//! one task drains it and invokes the user handler synchronously. A full
//! queue blocks the producers; that backpressure is the only throttle the
//! fetchers need. Handler panics are logged and swallowed; the next event
//! is processed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::service::model::SquareEvent;

/// One queued realtime event.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub service: u8,
    pub event: SquareEvent,
}

/// User-supplied handler, invoked on the dispatcher task.
pub type EventHandler = Arc<dyn Fn(u8, SquareEvent) + Send + Sync>;

/// Build the bounded queue between fetch workers and the dispatcher.
pub fn event_queue(capacity: usize) -> (mpsc::Sender<QueuedEvent>, mpsc::Receiver<QueuedEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Drain the queue until cancellation or every sender is gone.
pub async fn run_dispatcher(
    mut queue: mpsc::Receiver<QueuedEvent>,
    handler: EventHandler,
    cancel: CancellationToken,
) {
    tracing::debug!("dispatcher started");
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = queue.recv() => item,
        };
        let Some(QueuedEvent { service, event }) = item else {
            break;
        };
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(service, event)));
        if outcome.is_err() {
            tracing::error!(service, "event handler panicked; continuing");
        }
    }
    tracing::debug!("dispatcher stopped");
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
