// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push session management: connect, negotiate, reconnect.
//!
//! One manager owns the long-lived stream. Each (re)connect mints a fresh
//! subscription id, replays the sign-on calls and then forwards
//! server-initiated pushes to the fetch trigger. All cursor state lives in
//! the store; the manager itself only remembers the account-wide sync
//! token between reconnects.

pub mod frame;
pub mod keepalive;
pub mod session;
pub mod signon;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, DeviceProfile};
use crate::error::{Error, Result};
use crate::service::model::FetchMyEvents;
use crate::service::square::SquareService;
use crate::storage;
use crate::thrift::{self, Protocol};

use self::frame::{service_mask, SERVICE_SQUARE};
use self::session::{SessionEvent, SessionParams, SignOnCall};
use self::signon::CompletedSignOn;

/// Current epoch millis; also the subscription-id mint.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Diagnostics the manager broadcasts about the stream's health. Purely
/// observational; nothing in the core acts on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDiagnostic {
    Connected { subscription_id: i64 },
    SignOnAcknowledged { service: u8, events: usize },
    PushReceived { service: u8, push_id: i32 },
    Disconnected { reason: String },
    Reconnecting { delay_ms: u64 },
}

/// Long-lived push connection with automatic reconnect.
pub struct PushManager {
    config: ClientConfig,
    profile: DeviceProfile,
    session: storage::Session,
    services: Vec<u8>,
    /// Wakes the push-driven fetch cycle; notifications coalesce.
    trigger: Arc<Notify>,
    /// Account-wide `fetchMyEvents` sync token, kept across reconnects.
    event_sync_token: Mutex<Option<String>>,
    subscription_id: AtomicI64,
    diagnostics: broadcast::Sender<PushDiagnostic>,
    cancel: CancellationToken,
}

impl PushManager {
    pub fn new(
        config: ClientConfig,
        profile: DeviceProfile,
        session: storage::Session,
        services: Vec<u8>,
        trigger: Arc<Notify>,
        diagnostics: broadcast::Sender<PushDiagnostic>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            profile,
            session,
            services,
            trigger,
            event_sync_token: Mutex::new(None),
            subscription_id: AtomicI64::new(0),
            diagnostics,
            cancel,
        }
    }

    pub fn subscription_id(&self) -> i64 {
        self.subscription_id.load(Ordering::Relaxed)
    }

    /// Watch stream health events (connects, acks, teardown reasons).
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<PushDiagnostic> {
        self.diagnostics.subscribe()
    }

    fn diagnose(&self, event: PushDiagnostic) {
        let _ = self.diagnostics.send(event);
    }

    /// Run until cancelled. Any connection error closes the stream, waits
    /// the reconnect delay and redials with a fresh subscription id.
    pub async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let Some(token) = self.session.auth_token() else {
                tracing::warn!("push session needs an authenticated session, stopping");
                return;
            };

            match self.connect_once(token).await {
                Ok(()) => return, // clean cancellation
                Err(e) => {
                    tracing::warn!(err = %e, "push connection error");
                    self.diagnose(PushDiagnostic::Disconnected { reason: e.to_string() });
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {
                    tracing::debug!("reconnecting push stream");
                    self.diagnose(PushDiagnostic::Reconnecting {
                        delay_ms: self.config.reconnect_delay_ms,
                    });
                }
            }
        }
    }

    async fn connect_once(&self, access_token: String) -> Result<()> {
        let params = self.build_params(access_token)?;
        tracing::debug!(
            authority = %params.authority,
            path = %params.path,
            subscription = self.subscription_id(),
            "connecting push stream"
        );
        let io = session::dial(&self.config.push_host, self.config.push_port).await?;
        self.diagnose(PushDiagnostic::Connected { subscription_id: self.subscription_id() });

        let (events_tx, mut events_rx) = mpsc::channel(32);
        let run = session::run_on(io, params, events_tx, self.cancel.child_token());
        tokio::pin!(run);

        loop {
            tokio::select! {
                outcome = &mut run => return outcome,
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.on_event(event),
                        // Senders are gone: the session is winding down.
                        None => return run.await,
                    }
                }
            }
        }
    }

    fn build_params(&self, access_token: String) -> Result<SessionParams> {
        if self.services.is_empty() {
            return Err(Error::Config("push session needs at least one service".to_owned()));
        }
        // Fresh subscription per connect; ids never overlap within a stream.
        let subscription_id = epoch_ms();
        self.subscription_id.store(subscription_id, Ordering::Relaxed);

        let mut sign_ons = Vec::new();
        for service in &self.services {
            match *service {
                SERVICE_SQUARE => {
                    let sync = self.lock_sync_token().clone();
                    let args =
                        SquareService::fetch_my_events_args(subscription_id, sync.as_deref(), 100);
                    sign_ons.push(SignOnCall {
                        service: SERVICE_SQUARE,
                        method: "fetchMyEvents".to_owned(),
                        payload: thrift::encode_call(Protocol::Compact, "fetchMyEvents", 0, args),
                    });
                }
                other => {
                    tracing::debug!(service = other, "no sign-on defined for service, skipping");
                }
            }
        }

        Ok(SessionParams {
            authority: self.config.push_host.clone(),
            path: format!("/PUSH/1/subs?m={}", service_mask(&self.services)),
            access_token,
            line_application: self.profile.line_application(),
            ping_interval_secs: (self.config.keepalive_threshold().as_secs().min(u64::from(u16::MAX)))
                as u16,
            keepalive: self.config.keepalive_threshold(),
            idle_limit: self.config.idle_limit(),
            sign_ons,
        })
    }

    fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignOnReply(done) => self.on_sign_on_reply(done),
            SessionEvent::PushNotify { service, push_id, payload } => {
                self.on_push(service, push_id, &payload);
            }
        }
    }

    fn on_sign_on_reply(&self, done: CompletedSignOn) {
        if done.service != SERVICE_SQUARE {
            tracing::debug!(service = done.service, "sign-on reply for unhandled service");
            return;
        }
        match thrift::parse_reply(Protocol::Compact, &done.payload) {
            Ok(payload) => {
                let Some(s) = payload.as_ref().and_then(crate::thrift::Value::as_struct) else {
                    return;
                };
                let batch = FetchMyEvents::from_struct(s);
                if let Some(token) = batch.sync_token {
                    *self.lock_sync_token() = Some(token);
                }
                tracing::debug!(events = batch.events.len(), "square sign-on acknowledged");
                self.diagnose(PushDiagnostic::SignOnAcknowledged {
                    service: done.service,
                    events: batch.events.len(),
                });
            }
            Err(e) => tracing::warn!(err = %e, "failed to parse sign-on reply"),
        }
    }

    fn on_push(&self, service: u8, push_id: i32, payload: &[u8]) {
        if service != SERVICE_SQUARE {
            tracing::debug!(service, push_id, "push for unhandled service");
            return;
        }
        // The push body may replace the subscription id.
        if let Ok(msg) = thrift::decode_message(Protocol::Compact, payload) {
            if let Some(sub) = msg.body.i64_at(1) {
                if sub != 0 {
                    self.subscription_id.store(sub, Ordering::Relaxed);
                    tracing::debug!(subscription = sub, "subscription id replaced by server");
                }
            }
        }
        tracing::trace!(push_id, "square push, triggering fetch cycle");
        self.diagnose(PushDiagnostic::PushReceived { service, push_id });
        self.trigger.notify_one();
    }

    fn lock_sync_token(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.event_sync_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
