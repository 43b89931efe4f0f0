// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use legy::storage::{MemoryStore, Session, SessionStore as _};
use legy::{DeviceKind, LineClient};
use specs::MockLine;

#[tokio::test]
async fn secondary_device_refresh_rotates_both_tokens() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone())
        .save_login("access-1", Some("refresh-1"), None, None, None)
        .unwrap();

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    let token = client.refresh_access_token().await.unwrap();
    assert_eq!(token, "access-2");

    // The RPC carried the stored refresh token.
    assert_eq!(mock.refresh_calls(), vec!["refresh-1".to_owned()]);

    let session = client.session();
    assert_eq!(session.auth_token().as_deref(), Some("access-2"));
    assert_eq!(session.refresh_token().as_deref(), Some("refresh-2"));
    assert!(session.token_expiry_at().is_some());
}

#[tokio::test]
async fn primary_device_refresh_never_reaches_the_network() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone())
        .save_login("phone-token", Some("phone-refresh"), None, None, None)
        .unwrap();
    let before = store.snapshot();

    let client = LineClient::new(DeviceKind::Android, mock.client_config(), store.clone()).unwrap();
    let token = client.refresh_access_token().await.unwrap();

    assert_eq!(token, "phone-token");
    assert!(mock.refresh_calls().is_empty());
    assert!(mock.methods().is_empty());
    assert_eq!(store.snapshot(), before);
}
