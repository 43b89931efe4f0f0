// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session controller: owns the store, transport, facade and the
//! realtime machinery, and is the only place session state mutates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::auth::e2ee::{DefaultE2ee, E2eeProvider};
use crate::auth::email::EmailLogin;
use crate::auth::qr::QrLogin;
use crate::auth::{prompt_channel, LoginPrompt};
use crate::config::{ClientConfig, DeviceKind, DeviceProfile};
use crate::dispatch::{event_queue, run_dispatcher, EventHandler, QueuedEvent};
use crate::error::{Error, Result};
use crate::fetcher::{FetchWorker, FetcherConfig, WatchedChats};
use crate::push::frame::SERVICE_SQUARE;
use crate::push::{PushDiagnostic, PushManager};
use crate::service::auth::AuthService;
use crate::service::channel::ChannelService;
use crate::service::obs::ObsClient;
use crate::service::square::SquareService;
use crate::service::talk::TalkService;
use crate::service::timeline::TimelineService;
use crate::service::ServiceClient;
use crate::storage::{self, MemoryStore, SessionStore};
use crate::token::TokenLifecycle;
use crate::transport::HttpTransport;

/// How realtime events are pulled. The two modes are mutually exclusive
/// per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Long-lived push stream; server pushes trigger fetch cycles.
    PushDriven,
    /// One polling worker per watched chat.
    Polling,
}

struct Running {
    mode: FetchMode,
    cancel: CancellationToken,
    queue_tx: mpsc::Sender<QueuedEvent>,
    /// Per-chat worker cancellation (polling mode only).
    workers: HashMap<String, CancellationToken>,
}

/// A self-driving LINE client session.
pub struct LineClient {
    config: ClientConfig,
    profile: DeviceProfile,
    session: storage::Session,
    transport: Arc<HttpTransport>,
    talk: TalkService,
    square: Arc<SquareService>,
    channel: ChannelService,
    timeline: TimelineService,
    obs: ObsClient,
    auth: Arc<AuthService>,
    token: TokenLifecycle,
    e2ee: Arc<dyn E2eeProvider>,
    fetcher_config: FetcherConfig,
    watched: Arc<WatchedChats>,
    prompts_tx: mpsc::Sender<LoginPrompt>,
    prompts_rx: Mutex<Option<mpsc::Receiver<LoginPrompt>>>,
    push_diagnostics: broadcast::Sender<PushDiagnostic>,
    running: Mutex<Option<Running>>,
}

impl LineClient {
    /// Build a client for a device kind over the given store.
    pub fn new(
        kind: DeviceKind,
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let profile = DeviceProfile::new(kind, None);
        let session = storage::Session::new(store);
        let transport = Arc::new(HttpTransport::new(&config, profile.clone())?);
        let rpc = Arc::new(ServiceClient::new(transport.clone()));
        let auth = Arc::new(AuthService::new(rpc.clone()));
        let (prompts_tx, prompts_rx) = prompt_channel();

        Ok(Self {
            talk: TalkService::new(rpc.clone()),
            square: Arc::new(SquareService::new(rpc.clone())),
            channel: ChannelService::new(rpc.clone()),
            timeline: TimelineService::new(
                transport.clone(),
                ChannelService::new(rpc.clone()),
                session.clone(),
                config.base_url.clone(),
            ),
            obs: ObsClient::new(transport.clone(), config.obs_base_url.clone()),
            token: TokenLifecycle::new(
                profile.clone(),
                session.clone(),
                auth.clone(),
                transport.clone(),
            ),
            e2ee: Arc::new(DefaultE2ee::new()),
            fetcher_config: FetcherConfig::default(),
            watched: Arc::new(WatchedChats::new()),
            prompts_tx,
            prompts_rx: Mutex::new(Some(prompts_rx)),
            push_diagnostics: broadcast::channel(64).0,
            running: Mutex::new(None),
            config,
            profile,
            session,
            transport,
            auth,
        })
    }

    /// Ephemeral client (memory store), production endpoints.
    pub fn in_memory(kind: DeviceKind) -> Result<Self> {
        Self::new(kind, ClientConfig::default(), Arc::new(MemoryStore::new()))
    }

    // -- Accessors ------------------------------------------------------------

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &storage::Session {
        &self.session
    }

    pub fn talk(&self) -> &TalkService {
        &self.talk
    }

    pub fn square(&self) -> &SquareService {
        &self.square
    }

    pub fn channel(&self) -> &ChannelService {
        &self.channel
    }

    pub fn timeline(&self) -> &TimelineService {
        &self.timeline
    }

    pub fn obs(&self) -> &ObsClient {
        &self.obs
    }

    /// The login prompt stream (QR URL, PIN). First call wins.
    pub fn take_prompts(&self) -> Option<mpsc::Receiver<LoginPrompt>> {
        self.lock_prompts().take()
    }

    /// Stream-health diagnostics from the push manager.
    pub fn push_diagnostics(&self) -> broadcast::Receiver<PushDiagnostic> {
        self.push_diagnostics.subscribe()
    }

    // -- Login ----------------------------------------------------------------

    /// Reuse a stored, unexpired token. Returns false when there is none
    /// or the server rejects it; no login RPC is issued either way.
    pub async fn auto_login(&self) -> Result<bool> {
        if !self.session.token_valid(now_unix()) {
            return Ok(false);
        }
        let Some(token) = self.session.auth_token() else {
            return Ok(false);
        };
        self.transport.set_access_token(Some(token)).await;

        match self.talk.get_profile().await {
            Ok(profile) => {
                self.session.set_mid(&profile.mid)?;
                tracing::info!(mid = %profile.mid, "auto-login succeeded");
                Ok(true)
            }
            Err(e) => {
                tracing::debug!(err = %e, "stored token rejected");
                self.transport.set_access_token(None).await;
                Ok(false)
            }
        }
    }

    /// Interactive QR login; prompts arrive on the prompt channel.
    pub async fn login_with_qr(&self) -> Result<String> {
        let flow = QrLogin::new(
            self.config.clone(),
            self.profile.clone(),
            self.auth.clone(),
            self.transport.clone(),
            self.session.clone(),
            self.e2ee.clone(),
            self.prompts_tx.clone(),
        );
        let token = flow.login().await?;
        self.record_mid().await?;
        Ok(token)
    }

    /// Email/password login with PIN verification.
    pub async fn login_with_email(&self, email: &str, password: &str, pin: &str) -> Result<String> {
        let flow = EmailLogin::new(
            self.config.clone(),
            self.profile.clone(),
            self.auth.clone(),
            self.transport.clone(),
            self.session.clone(),
            self.e2ee.clone(),
            self.prompts_tx.clone(),
        );
        let token = flow.login(email, password, pin).await?;
        self.record_mid().await?;
        Ok(token)
    }

    /// Adopt an externally obtained token.
    pub async fn login_with_token(&self, token: &str) -> Result<()> {
        self.session.set_auth_token(token)?;
        self.transport.set_access_token(Some(token.to_owned())).await;
        self.record_mid().await
    }

    /// Rotate the access token (no-op on primary devices).
    pub async fn refresh_access_token(&self) -> Result<String> {
        self.token.refresh_access_token().await
    }

    /// Drop volatile auth state; optionally wipe the store.
    pub async fn logout(&self, clear_store: bool) -> Result<()> {
        self.stop();
        self.transport.set_access_token(None).await;
        if clear_store {
            self.session.clear()?;
        }
        Ok(())
    }

    async fn record_mid(&self) -> Result<()> {
        if self.session.mid().is_some() {
            return Ok(());
        }
        match self.talk.get_profile().await {
            Ok(profile) => self.session.set_mid(&profile.mid),
            Err(e) => {
                tracing::debug!(err = %e, "could not fetch profile for mid");
                Ok(())
            }
        }
    }

    // -- Watched chats --------------------------------------------------------

    /// Watch a chat. In polling mode a worker spawns on the fly.
    pub fn watch(&self, chat_mid: &str) -> bool {
        if !self.watched.add(chat_mid) {
            return false;
        }
        let mut running = self.lock_running();
        if let Some(running) = running.as_mut() {
            if running.mode == FetchMode::Polling {
                self.spawn_polling_worker(running, chat_mid.to_owned());
            }
        }
        true
    }

    /// Stop watching a chat; its cursors stay in the store.
    pub fn unwatch(&self, chat_mid: &str) -> bool {
        if !self.watched.remove(chat_mid) {
            return false;
        }
        if let Some(running) = self.lock_running().as_mut() {
            if let Some(cancel) = running.workers.remove(chat_mid) {
                cancel.cancel();
            }
        }
        true
    }

    pub fn watched_chats(&self) -> Vec<String> {
        self.watched.snapshot()
    }

    // -- Realtime session -----------------------------------------------------

    /// Start the realtime machinery in the given mode. The handler runs on
    /// the dispatcher task.
    pub fn start(&self, mode: FetchMode, handler: EventHandler) -> Result<()> {
        let mut slot = self.lock_running();
        if slot.is_some() {
            return Err(Error::State("session is already running".to_owned()));
        }
        if self.session.auth_token().is_none() {
            return Err(Error::State("login before starting the session".to_owned()));
        }

        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = event_queue(self.config.event_queue_capacity);
        tokio::spawn(run_dispatcher(queue_rx, handler, cancel.clone()));

        let mut running =
            Running { mode, cancel: cancel.clone(), queue_tx: queue_tx.clone(), workers: HashMap::new() };

        match mode {
            FetchMode::Polling => {
                for chat in self.watched.snapshot() {
                    self.spawn_polling_worker(&mut running, chat);
                }
            }
            FetchMode::PushDriven => {
                let trigger = Arc::new(Notify::new());
                let worker = FetchWorker::new(
                    self.square.clone(),
                    self.session.clone(),
                    self.fetcher_config.clone(),
                    queue_tx,
                    cancel.child_token(),
                );
                let fetch_lock = Arc::new(tokio::sync::Mutex::new(()));
                {
                    let watched = self.watched.clone();
                    let trigger = trigger.clone();
                    tokio::spawn(async move {
                        worker.run_push_driven(watched, trigger, fetch_lock).await;
                    });
                }

                let manager = PushManager::new(
                    self.config.clone(),
                    self.profile.clone(),
                    self.session.clone(),
                    vec![SERVICE_SQUARE],
                    trigger,
                    self.push_diagnostics.clone(),
                    cancel.child_token(),
                );
                tokio::spawn(async move { manager.run().await });
            }
        }

        tracing::info!(?mode, chats = self.watched.snapshot().len(), "session started");
        *slot = Some(running);
        Ok(())
    }

    /// Stop the session: close the push stream, stop workers and the
    /// dispatcher. Cursors and tokens stay persisted.
    pub fn stop(&self) {
        if let Some(running) = self.lock_running().take() {
            running.cancel.cancel();
            tracing::info!("session stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    fn spawn_polling_worker(&self, running: &mut Running, chat_mid: String) {
        let child = running.cancel.child_token();
        let worker = FetchWorker::new(
            self.square.clone(),
            self.session.clone(),
            self.fetcher_config.clone(),
            running.queue_tx.clone(),
            child.clone(),
        );
        running.workers.insert(chat_mid.clone(), child);
        tokio::spawn(async move { worker.run_polling(chat_mid).await });
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_prompts(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Receiver<LoginPrompt>>> {
        match self.prompts_rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
