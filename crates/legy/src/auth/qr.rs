// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QR login, v1 (`qrCodeLogin`) and v2 (`qrCodeLoginV2`).
//!
//! State machine: create session → publish QR URL → long-poll until the
//! phone scans it → try the saved certificate → otherwise publish a PIN
//! and long-poll its confirmation → exchange the session for a token.
//! Every wait runs short polls under one outer deadline; crossing it is a
//! flow timeout and the session stays unauthenticated.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::{ClientConfig, DeviceProfile};
use crate::error::{Error, Result};
use crate::service::auth::AuthService;
use crate::storage;
use crate::transport::HttpTransport;

use super::e2ee::E2eeProvider;
use super::{emit_prompt, LoginPrompt};

enum Poll {
    QrScanned,
    PinConfirmed,
}

pub struct QrLogin {
    config: ClientConfig,
    profile: DeviceProfile,
    auth: Arc<AuthService>,
    transport: Arc<HttpTransport>,
    session: storage::Session,
    e2ee: Arc<dyn E2eeProvider>,
    prompts: mpsc::Sender<LoginPrompt>,
}

impl QrLogin {
    pub fn new(
        config: ClientConfig,
        profile: DeviceProfile,
        auth: Arc<AuthService>,
        transport: Arc<HttpTransport>,
        session: storage::Session,
        e2ee: Arc<dyn E2eeProvider>,
        prompts: mpsc::Sender<LoginPrompt>,
    ) -> Self {
        Self { config, profile, auth, transport, session, e2ee, prompts }
    }

    /// Run the whole flow; returns the access token after persisting the
    /// session bundle (including a fresh QR certificate when issued).
    pub async fn login(&self) -> Result<String> {
        let deadline = Instant::now() + self.config.login_deadline();

        let sqr = self.auth.create_qr_session().await?.sqr;
        let qr = self.auth.create_qr_code(&sqr).await?;
        let (_secret, suffix) = self.e2ee.create_qr_secret();
        emit_prompt(&self.prompts, LoginPrompt::QrUrl(format!("{}{suffix}", qr.url))).await;

        self.poll_until(Poll::QrScanned, &sqr, deadline).await?;

        // A saved certificate skips the PIN; a refusal falls back to it.
        match self.auth.verify_certificate(&sqr, self.session.qr_certificate().as_deref()).await {
            Ok(()) => tracing::debug!("certificate accepted, skipping PIN"),
            Err(e) => {
                tracing::debug!(err = %e, "certificate refused, falling back to PIN");
                let pin = self.auth.create_pin_code(&sqr).await?.pin_code;
                emit_prompt(&self.prompts, LoginPrompt::PinCode(pin)).await;
                self.poll_until(Poll::PinConfirmed, &sqr, deadline).await?;
            }
        }

        let access = if self.profile.supports_token_v3() {
            self.login_v2(&sqr).await?
        } else {
            self.login_v1(&sqr).await?
        };
        self.transport.set_access_token(Some(access.clone())).await;
        tracing::info!("qr login complete");
        Ok(access)
    }

    async fn login_v2(&self, sqr: &str) -> Result<String> {
        let result = self
            .auth
            .qr_code_login_v2(sqr, &self.config.device_name, "legy-device")
            .await?;
        let info = result
            .token_info
            .as_ref()
            .ok_or_else(|| Error::Auth("qrCodeLoginV2 reply carried no token info".to_owned()))?;
        self.session.save_login(
            &info.access_token,
            info.refresh_token.as_deref(),
            info.expiry_at(),
            result.mid.as_deref(),
            result.certificate.as_deref(),
        )?;
        Ok(info.access_token.clone())
    }

    async fn login_v1(&self, sqr: &str) -> Result<String> {
        let result = self.auth.qr_code_login(sqr, self.profile.kind.as_str()).await?;
        let access = result
            .auth_token
            .clone()
            .ok_or_else(|| Error::Auth("qrCodeLogin reply carried no auth token".to_owned()))?;
        self.session.save_login(
            &access,
            None,
            None,
            result.mid.as_deref(),
            result.certificate.as_deref(),
        )?;
        Ok(access)
    }

    /// Re-issue short long-polls until the server acks or the outer
    /// deadline passes. Per-request timeouts are benign; any other error
    /// propagates.
    async fn poll_until(&self, what: Poll, sqr: &str, deadline: Instant) -> Result<()> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::FlowTimeout(
                    match what {
                        Poll::QrScanned => "QR scan wait expired",
                        Poll::PinConfirmed => "PIN confirmation wait expired",
                    }
                    .to_owned(),
                ));
            }
            let timeout = self.config.long_poll_timeout().min(deadline - now);
            let attempt = match what {
                Poll::QrScanned => self.auth.check_qr_code_verified(sqr, timeout).await,
                Poll::PinConfirmed => self.auth.check_pin_code_verified(sqr, timeout).await,
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.is_poll_timeout() => {
                    tracing::trace!("long-poll timed out, reissuing");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "qr_tests.rs"]
mod tests;
