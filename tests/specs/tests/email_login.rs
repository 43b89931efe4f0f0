// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use legy::storage::MemoryStore;
use legy::{DeviceKind, LineClient};
use specs::MockLine;

#[tokio::test]
async fn email_login_v2_persists_the_token_bundle_and_certificate() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let client = LineClient::new(
        DeviceKind::DesktopWin,
        mock.client_config(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let token = client
        .login_with_email("spec@example.com", "hunter2", "123456")
        .await
        .unwrap();
    assert_eq!(token, "email-access-token");

    let session = client.session();
    assert_eq!(session.auth_token().as_deref(), Some("email-access-token"));
    assert_eq!(session.refresh_token().as_deref(), Some("email-refresh-token"));
    assert_eq!(session.email_cert("spec@example.com").as_deref(), Some("email-cert-issued"));

    // RSA key fetch preceded the login on the binary endpoints.
    let methods = mock.methods();
    let rsa_at = methods.iter().position(|m| m == "getRSAKeyInfo").unwrap();
    let login_at = methods.iter().position(|m| m == "loginV2").unwrap();
    assert!(rsa_at < login_at);
}

#[tokio::test]
async fn bad_credentials_fail_before_any_request() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();
    let client = LineClient::new(
        DeviceKind::DesktopWin,
        mock.client_config(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    let err = client.login_with_email("no-at-sign", "hunter2", "123456").await.unwrap_err();
    assert_eq!(err.kind(), "CONFIG");
    assert!(mock.methods().is_empty());
}
