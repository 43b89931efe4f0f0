// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};
use std::time::Duration;

use legy::storage::{MemoryStore, Session};
use legy::{DeviceKind, FetchMode, LineClient};
use specs::{FetchStep, MockEvent, MockLine};

#[tokio::test]
async fn rate_limited_fetch_retries_in_place_then_flows() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let seeded = Session::new(store.clone());
    seeded.set_auth_token("seed-token").unwrap();
    seeded.set_cursor("mAAA", "T0", None).unwrap();

    mock.script_fetch(
        "mAAA",
        vec![
            FetchStep::RateLimited,
            FetchStep::Page {
                events: vec![MockEvent {
                    ts: 1,
                    message_id: "m-after-429".to_owned(),
                    text: "made it".to_owned(),
                }],
                sync: "T1".to_owned(),
                cont: None,
            },
        ],
    );

    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    client.watch("mAAA");

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let handler = {
        let seen = seen.clone();
        Arc::new(move |_s: u8, e: legy::service::model::SquareEvent| {
            seen.lock().unwrap().push(e.message_id().unwrap_or("?").to_owned());
        })
    };
    client.start(FetchMode::Polling, handler).unwrap();

    // The retry pause is ~2s; wait generously for the event to arrive.
    for _ in 0..600 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.stop();

    assert_eq!(*seen.lock().unwrap(), vec!["m-after-429".to_owned()]);

    // The 429 did not advance the cursor: the retry carried the same token.
    let calls = mock.fetch_calls();
    assert!(calls.len() >= 2);
    assert_eq!(calls[0].sync.as_deref(), Some("T0"));
    assert_eq!(calls[1].sync.as_deref(), Some("T0"));
    assert_eq!(client.session().cursor("mAAA").sync_token.as_deref(), Some("T1"));
}
