// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use legy::storage::{MemoryStore, Session};
use legy::{DeviceKind, LineClient};
use specs::MockLine;

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[tokio::test]
async fn auto_login_reuses_the_stored_token_without_a_login_rpc() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone())
        .save_login("seed-token", Some("seed-refresh"), Some(now_unix() + 3600), None, None)
        .unwrap();

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    assert!(client.auto_login().await.unwrap());

    // Verification is a profile read, never a login RPC.
    assert_eq!(mock.methods(), vec!["getProfile".to_owned()]);
    assert!(client.session().mid().unwrap().starts_with('u'));

    // A subsequent profile call works over the same session.
    let profile = client.talk().get_profile().await.unwrap();
    assert_eq!(profile.display_name, "Spec User");
}

#[tokio::test]
async fn auto_login_rejected_token_reports_false() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    // Expired token: the client must not even hit the network.
    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone())
        .save_login("stale-token", None, Some(now_unix() - 10), None, None)
        .unwrap();

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    assert!(!client.auto_login().await.unwrap());
    assert!(mock.methods().is_empty());
}
