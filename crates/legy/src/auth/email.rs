// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Email/password login, v1 (`loginZ`) and v2 (`loginV2`).
//!
//! Both build the same RSA credential envelope. When the server answers
//! with a verifier instead of a token, the flow surfaces the PIN to the
//! caller, long-polls the verification endpoint until the user confirms on
//! their device, and retries the login with the verifier.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::{ClientConfig, DeviceProfile};
use crate::error::{Error, Result};
use crate::service::auth::{AuthService, EmailLoginMethod, LoginRequest};
use crate::service::model::LoginResult;
use crate::service::{E2EE_VERIFY_PATH, LEGACY_VERIFY_PATH};
use crate::storage;
use crate::transport::HttpTransport;

use super::crypto::{credential_envelope, rsa_encrypt_hex};
use super::e2ee::E2eeProvider;
use super::{emit_prompt, LoginPrompt};

pub struct EmailLogin {
    config: ClientConfig,
    profile: DeviceProfile,
    auth: Arc<AuthService>,
    transport: Arc<HttpTransport>,
    session: storage::Session,
    e2ee: Arc<dyn E2eeProvider>,
    prompts: mpsc::Sender<LoginPrompt>,
}

impl EmailLogin {
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
    /// session bundle.
    pub async fn login(&self, email: &str, password: &str, pin: &str) -> Result<String> {
        validate_credentials(email, password, pin)?;

        let rsa_key = self.auth.get_rsa_key_info(0).await?;
        let envelope = credential_envelope(&rsa_key.session_key, email, password)?;
        let encrypted = rsa_encrypt_hex(&rsa_key.nvalue, &rsa_key.evalue, &envelope)?;

        let (secret, _suffix) = self.e2ee.create_qr_secret();
        let secret_blob = self.e2ee.encrypt_public_key_with_pin(pin, &secret)?;
        let certificate = self.session.email_cert(email);

        let method = if self.profile.supports_token_v3() {
            EmailLoginMethod::V2
        } else {
            EmailLoginMethod::V1
        };
        let mut request = LoginRequest {
            login_type: 2,
            keynm: rsa_key.keynm.clone(),
            encrypted_message: encrypted,
            system_name: self.config.device_name.clone(),
            certificate,
            verifier: None,
            secret: Some(secret_blob),
        };

        let mut result = self.auth.login(method, &request).await?;

        if !has_token(method, &result) {
            let verifier = result
                .verifier
                .clone()
                .ok_or_else(|| Error::Auth("login returned neither token nor verifier".to_owned()))?;
            let shown_pin = result.pin_code.clone().unwrap_or_else(|| pin.to_owned());
            emit_prompt(&self.prompts, LoginPrompt::PinCode(shown_pin)).await;

            let confirmed = self.wait_for_verifier(method, &verifier).await?;
            request.login_type = 1;
            request.verifier = Some(confirmed);
            result = self.auth.login(method, &request).await?;
        }

        if let Some(cert) = &result.certificate {
            self.session.set_email_cert(email, cert)?;
        }

        let access = self.persist(method, &result)?;
        self.transport.set_access_token(Some(access.clone())).await;
        tracing::info!("email login complete");
        Ok(access)
    }

    /// Long-poll the PIN verification endpoint until the user confirms.
    /// Each request uses a short timeout; the outer deadline turns the
    /// whole wait into a flow timeout.
    async fn wait_for_verifier(&self, method: EmailLoginMethod, verifier: &str) -> Result<String> {
        let path = match method {
            EmailLoginMethod::V1 => LEGACY_VERIFY_PATH,
            EmailLoginMethod::V2 => E2EE_VERIFY_PATH,
        };
        let deadline = Instant::now() + self.config.login_deadline();

        loop {
            if Instant::now() >= deadline {
                return Err(Error::FlowTimeout("PIN verification wait expired".to_owned()));
            }
            match self
                .transport
                .json_call(path, "GET", None, Some(verifier), Some(self.config.long_poll_timeout()))
                .await
            {
                Ok(body) => {
                    let confirmed = body
                        .get("result")
                        .and_then(|r| r.get("verifier"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(verifier)
                        .to_owned();
                    return Ok(confirmed);
                }
                Err(e) if e.is_poll_timeout() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn persist(&self, method: EmailLoginMethod, result: &LoginResult) -> Result<String> {
        match method {
            EmailLoginMethod::V2 => {
                let info = result
                    .token_info
                    .as_ref()
                    .ok_or_else(|| Error::Auth("loginV2 reply carried no token info".to_owned()))?;
                self.session.save_login(
                    &info.access_token,
                    info.refresh_token.as_deref(),
                    info.expiry_at(),
                    None,
                    None,
                )?;
                Ok(info.access_token.clone())
            }
            EmailLoginMethod::V1 => {
                let access = result
                    .auth_token
                    .clone()
                    .ok_or_else(|| Error::Auth("loginZ reply carried no auth token".to_owned()))?;
                self.session.save_login(&access, None, None, None, None)?;
                Ok(access)
            }
        }
    }
}

fn has_token(method: EmailLoginMethod, result: &LoginResult) -> bool {
    match method {
        EmailLoginMethod::V1 => result.auth_token.is_some(),
        EmailLoginMethod::V2 => result.token_info.is_some(),
    }
}

fn validate_credentials(email: &str, password: &str, pin: &str) -> Result<()> {
    if !email.contains('@') || email.len() < 3 {
        return Err(Error::Config(format!("not an email address: {email}")));
    }
    if password.len() < 6 {
        return Err(Error::Config("password must be at least 6 characters".to_owned()));
    }
    if pin.len() != 6 || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Config("PIN must be 6 digits".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
