// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth RPC: RSA key fetch, the login calls themselves, QR session
//! operations and token refresh. Flow orchestration lives in
//! [`crate::auth`]; this module only shapes the wire calls.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::thrift::{Protocol, Struct, Value};

use super::model::{
    expect_struct, LoginResult, QrCode, QrLoginResult, QrLoginV2Result, QrPinCode, QrSession,
    RefreshResult, RsaKeyInfo,
};
use super::{
    ServiceClient, AUTH_RS_PATH, LEGACY_TALK_PATH, QR_LONG_POLL_PATH, QR_PATH, TOKEN_REFRESH_PATH,
};

/// Which email login RPC to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailLoginMethod {
    /// Legacy devices: `loginZ`.
    V1,
    /// v3-capable devices: `loginV2`.
    V2,
}

/// Everything `loginZ`/`loginV2` need on the wire.
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    /// 0 = credentials, 1 = verifier retry, 2 = credentials + E2EE secret.
    pub login_type: i32,
    pub keynm: String,
    pub encrypted_message: String,
    pub system_name: String,
    pub certificate: Option<String>,
    pub verifier: Option<String>,
    pub secret: Option<Vec<u8>>,
}

pub struct AuthService {
    client: Arc<ServiceClient>,
}

impl AuthService {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    pub async fn get_rsa_key_info(&self, provider: i32) -> Result<RsaKeyInfo> {
        let request = Struct::new().with(2, Value::I32(provider));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload =
            self.client.call(AUTH_RS_PATH, Protocol::Binary, "getRSAKeyInfo", args).await?;
        RsaKeyInfo::from_struct(&expect_struct(payload, "getRSAKeyInfo")?)
    }

    /// Issue `loginZ` (legacy path) or `loginV2`.
    pub async fn login(&self, method: EmailLoginMethod, req: &LoginRequest) -> Result<LoginResult> {
        let (path, name) = match method {
            EmailLoginMethod::V1 => (LEGACY_TALK_PATH, "loginZ"),
            EmailLoginMethod::V2 => (AUTH_RS_PATH, "loginV2"),
        };
        let request = Struct::new()
            .with(1, Value::I32(req.login_type))
            .with(2, Value::I32(1)) // identityProvider: LINE
            .with(3, Value::string(req.keynm.clone()))
            .with(4, Value::string(req.encrypted_message.clone()))
            .with(5, Value::Bool(false)) // keepLoggedIn
            .with(6, Value::string(""))  // accessLocation
            .with(7, Value::string(req.system_name.clone()))
            .with(8, Value::string(req.certificate.clone().unwrap_or_default()))
            .with(9, Value::string(req.verifier.clone().unwrap_or_default()))
            .with(10, Value::Binary(req.secret.clone().unwrap_or_default()))
            .with(11, Value::I32(1))
            .with(12, Value::string("System Product Name")); // modelName
        let args = Struct::new().with(2, Value::Struct(request));

        let payload = self
            .client
            .call(path, Protocol::Binary, name, args)
            .await
            .map_err(auth_classify)?;
        Ok(LoginResult::from_struct(&expect_struct(payload, name)?))
    }

    // -- QR session -----------------------------------------------------------

    pub async fn create_qr_session(&self) -> Result<QrSession> {
        let payload =
            self.client.call(QR_PATH, Protocol::Compact, "createSession", Struct::new()).await?;
        QrSession::from_struct(&expect_struct(payload, "createSession")?)
    }

    pub async fn create_qr_code(&self, sqr: &str) -> Result<QrCode> {
        let args = sqr_args(sqr);
        let payload = self.client.call(QR_PATH, Protocol::Compact, "createQrCode", args).await?;
        QrCode::from_struct(&expect_struct(payload, "createQrCode")?)
    }

    /// One long-poll round asking whether the QR was scanned. A transport
    /// timeout is the benign outcome; the flow reissues the poll.
    pub async fn check_qr_code_verified(&self, sqr: &str, timeout: Duration) -> Result<()> {
        self.long_poll("checkQrCodeVerified", sqr, timeout).await
    }

    pub async fn verify_certificate(&self, sqr: &str, certificate: Option<&str>) -> Result<()> {
        let request = Struct::new()
            .with(1, Value::string(sqr))
            .with(2, Value::string(certificate.unwrap_or_default()));
        let args = Struct::new().with(1, Value::Struct(request));
        self.client
            .call(QR_PATH, Protocol::Compact, "verifyCertificate", args)
            .await
            .map_err(auth_classify)?;
        Ok(())
    }

    pub async fn create_pin_code(&self, sqr: &str) -> Result<QrPinCode> {
        let args = sqr_args(sqr);
        let payload = self.client.call(QR_PATH, Protocol::Compact, "createPinCode", args).await?;
        QrPinCode::from_struct(&expect_struct(payload, "createPinCode")?)
    }

    pub async fn check_pin_code_verified(&self, sqr: &str, timeout: Duration) -> Result<()> {
        self.long_poll("checkPinCodeVerified", sqr, timeout).await
    }

    pub async fn qr_code_login(&self, sqr: &str, device_kind: &str) -> Result<QrLoginResult> {
        let request = Struct::new()
            .with(1, Value::string(sqr))
            .with(2, Value::string(device_kind))
            .with(3, Value::Bool(true)); // autoLoginIsRequired
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self
            .client
            .call(QR_PATH, Protocol::Compact, "qrCodeLogin", args)
            .await
            .map_err(auth_classify)?;
        Ok(QrLoginResult::from_struct(&expect_struct(payload, "qrCodeLogin")?))
    }

    pub async fn qr_code_login_v2(
        &self,
        sqr: &str,
        system_name: &str,
        model_name: &str,
    ) -> Result<QrLoginV2Result> {
        let request = Struct::new()
            .with(1, Value::string(sqr))
            .with(2, Value::string(system_name))
            .with(3, Value::string(model_name))
            .with(4, Value::Bool(true)); // autoLoginIsRequired
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self
            .client
            .call(QR_PATH, Protocol::Compact, "qrCodeLoginV2", args)
            .await
            .map_err(auth_classify)?;
        Ok(QrLoginV2Result::from_struct(&expect_struct(payload, "qrCodeLoginV2")?))
    }

    // -- Token refresh --------------------------------------------------------

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult> {
        let request = Struct::new().with(1, Value::string(refresh_token));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self
            .client
            .call(TOKEN_REFRESH_PATH, Protocol::Compact, "refresh", args)
            .await
            .map_err(auth_classify)?;
        Ok(RefreshResult::from_struct(&expect_struct(payload, "refresh")?))
    }

    pub async fn report_refreshed_access_token(&self, access_token: &str) -> Result<()> {
        let request = Struct::new().with(1, Value::string(access_token));
        let args = Struct::new().with(1, Value::Struct(request));
        self.client
            .call(TOKEN_REFRESH_PATH, Protocol::Compact, "reportRefreshedAccessToken", args)
            .await?;
        Ok(())
    }

    async fn long_poll(&self, method: &str, sqr: &str, timeout: Duration) -> Result<()> {
        let extra = vec![
            ("x-lst".to_owned(), timeout.as_millis().to_string()),
            ("x-line-access".to_owned(), sqr.to_owned()),
        ];
        self.client
            .call_with(QR_LONG_POLL_PATH, Protocol::Compact, method, sqr_args(sqr), Some(timeout), &extra)
            .await
            .map_err(auth_classify)?;
        Ok(())
    }
}

fn sqr_args(sqr: &str) -> Struct {
    let request = Struct::new().with(1, Value::string(sqr));
    Struct::new().with(1, Value::Struct(request))
}

/// Server exceptions on login paths are auth failures, not generic server
/// errors.
fn auth_classify(err: Error) -> Error {
    match err {
        Error::Server { code, message, .. } => Error::Auth(format!("[{code}] {message}")),
        other => other,
    }
}
