// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};
use std::time::Duration;

use legy::storage::{MemoryStore, Session};
use legy::{DeviceKind, FetchMode, LineClient};
use specs::{FetchStep, MockEvent, MockLine};

async fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn resumed_cursor_delivers_new_events_exactly_once() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    // A previous run left a sync token behind.
    let store = Arc::new(MemoryStore::new());
    let seeded = Session::new(store.clone());
    seeded.set_auth_token("seed-token").unwrap();
    seeded.set_cursor("mAAA", "T0", None).unwrap();

    mock.script_fetch(
        "mAAA",
        vec![FetchStep::Page {
            events: vec![
                MockEvent { ts: 1, message_id: "m-1".to_owned(), text: "first".to_owned() },
                MockEvent { ts: 2, message_id: "m-2".to_owned(), text: "second".to_owned() },
            ],
            sync: "T1".to_owned(),
            cont: None,
        }],
    );

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    client.watch("mAAA");

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = seen.clone();
        Arc::new(move |_service: u8, event: legy::service::model::SquareEvent| {
            seen.lock().unwrap().push(event.message_id().unwrap_or("?").to_owned());
        })
    };

    client.start(FetchMode::Polling, handler).unwrap();
    wait_for(|| seen.lock().unwrap().len() >= 2, "two dispatched events").await;

    // Give the pollers room to mistakenly re-deliver, then stop.
    tokio::time::sleep(Duration::from_millis(150)).await;
    client.stop();

    assert_eq!(*seen.lock().unwrap(), vec!["m-1".to_owned(), "m-2".to_owned()]);

    // Cursor advanced, continuation clear, nothing torn.
    let cursor = client.session().cursor("mAAA");
    assert_eq!(cursor.sync_token.as_deref(), Some("T1"));
    assert_eq!(cursor.continuation, None);

    // The first fetch resumed from the stored token, not from scratch.
    let calls = mock.fetch_calls();
    assert_eq!(calls[0].sync.as_deref(), Some("T0"));
    assert_eq!(calls[0].limit, 50);
}

#[tokio::test]
async fn missing_sync_token_probes_before_delivering() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone()).set_auth_token("seed-token").unwrap();

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    client.watch("mNEW");

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let handler = {
        let seen = seen.clone();
        Arc::new(move |_s: u8, e: legy::service::model::SquareEvent| {
            seen.lock().unwrap().push(e.message_id().unwrap_or("?").to_owned());
        })
    };
    client.start(FetchMode::Polling, handler).unwrap();

    wait_for(|| !mock.fetch_calls().is_empty(), "the probe fetch").await;
    client.stop();

    let calls = mock.fetch_calls();
    assert_eq!(calls[0].limit, 1, "first contact is a unit probe");
    assert_eq!(calls[0].sync, None);
    // The unscripted mock answers sync-0; the probe persists it silently.
    assert!(seen.lock().unwrap().is_empty());
}
