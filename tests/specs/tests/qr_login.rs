// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;
use std::sync::Arc;

use legy::auth::LoginPrompt;
use legy::storage::MemoryStore;
use legy::{DeviceKind, LineClient};
use specs::MockLine;

#[tokio::test]
async fn qr_happy_path_prompts_then_persists_the_session() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let client = LineClient::new(
        DeviceKind::DesktopWin,
        mock.client_config(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();
    let mut prompts = client.take_prompts().unwrap();

    // Play the user: scan the QR when shown, confirm the PIN when shown.
    let state = mock.state.clone();
    let user = tokio::spawn(async move {
        let mut qr_url = None;
        let mut pin = None;
        while let Some(prompt) = prompts.recv().await {
            match prompt {
                LoginPrompt::QrUrl(url) => {
                    state.qr_scanned.store(true, Ordering::Relaxed);
                    qr_url = Some(url);
                }
                LoginPrompt::PinCode(code) => {
                    state.pin_confirmed.store(true, Ordering::Relaxed);
                    pin = Some(code);
                    break;
                }
            }
        }
        (qr_url, pin)
    });

    let token = client.login_with_qr().await.unwrap();
    assert_eq!(token, "qr-access-token");

    let (qr_url, pin) = user.await.unwrap();
    let qr_url = qr_url.unwrap();
    assert!(qr_url.starts_with("line://au/q/SPECTICKET?secret="));
    assert!(qr_url.ends_with("&e2eeVersion=1"));
    assert_eq!(pin.as_deref(), Some("123456"));

    // Storage after: full bundle persisted.
    let session = client.session();
    assert_eq!(session.auth_token().as_deref(), Some("qr-access-token"));
    assert_eq!(session.refresh_token().as_deref(), Some("qr-refresh-token"));
    assert!(session.mid().unwrap().starts_with('u'));
    assert_eq!(session.qr_certificate().as_deref(), Some("qr-cert-issued"));
    assert!(session.token_expiry_at().is_some());
}

#[tokio::test]
async fn qr_flow_times_out_at_the_outer_deadline() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    // Nobody ever scans; the flow must give up at the outer deadline.
    let mut config = mock.client_config();
    config.long_poll_ms = 200;
    config.login_deadline_ms = 700;

    let client =
        LineClient::new(DeviceKind::DesktopWin, config, Arc::new(MemoryStore::new())).unwrap();

    let started = std::time::Instant::now();
    let err = client.login_with_qr().await.unwrap_err();
    assert_eq!(err.kind(), "FLOW_TIMEOUT");
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    // Still unauthenticated.
    assert_eq!(client.session().auth_token(), None);
}
