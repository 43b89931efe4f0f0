// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-contract checks: the facade must put the right field ids on the
//! wire for each operation.

use std::sync::Arc;

use legy::storage::{MemoryStore, Session};
use legy::{DeviceKind, LineClient};
use specs::MockLine;

async fn logged_in_client(mock: &MockLine) -> LineClient {
    let store = Arc::new(MemoryStore::new());
    Session::new(store.clone()).set_auth_token("seed-token").unwrap();
    let client = LineClient::new(DeviceKind::DesktopWin, mock.client_config(), store).unwrap();
    client.login_with_token("seed-token").await.unwrap();
    client
}

#[tokio::test]
async fn send_message_field_table() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();
    let client = logged_in_client(&mock).await;

    client.talk().send_message("u9999", "hello there").await.unwrap();

    let bodies = mock.recorded("sendMessage");
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].i32_at(1), Some(0), "first reqseq is zero");
    let message = bodies[0].struct_at(2).unwrap();
    assert_eq!(message.str_at(2), Some("u9999"));
    assert_eq!(message.str_at(10), Some("hello there"));
    assert_eq!(message.i32_at(15), Some(0));

    // A second send increments the talk reqseq.
    client.talk().send_message("u9999", "again").await.unwrap();
    let bodies = mock.recorded("sendMessage");
    assert_eq!(bodies[1].i32_at(1), Some(1));
}

#[tokio::test]
async fn get_contact_and_chats_field_tables() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();
    let client = logged_in_client(&mock).await;

    let _ = client.talk().get_contact("u1234").await;
    let bodies = mock.recorded("getContact");
    assert_eq!(bodies[0].str_at(2), Some("u1234"));

    let _ = client.talk().get_chats(&["c111".to_owned(), "c222".to_owned()]).await;
    let bodies = mock.recorded("getChats");
    let request = bodies[0].struct_at(1).unwrap();
    let mids = request.get(1).and_then(legy::thrift::Value::as_list).unwrap();
    assert_eq!(mids.len(), 2);
    assert_eq!(mids[0].as_str(), Some("c111"));
    assert_eq!(request.bool_at(2), Some(true));
    assert_eq!(request.bool_at(3), Some(true));
}

#[tokio::test]
async fn square_operations_field_tables() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();
    let client = logged_in_client(&mock).await;

    let _ = client.square().mark_as_read("mAAA", "msg-1").await;
    let request = mock.recorded("markAsRead")[0].struct_at(1).unwrap().clone();
    assert_eq!(request.str_at(2), Some("mAAA"));
    assert_eq!(request.str_at(4), Some("msg-1"));

    let _ = client.square().react_to_message("mAAA", "msg-1", 2).await;
    let request = mock.recorded("reactToMessage")[0].struct_at(1).unwrap().clone();
    assert_eq!(request.i32_at(1), Some(0));
    assert_eq!(request.str_at(2), Some("mAAA"));
    assert_eq!(request.str_at(3), Some("msg-1"));
    assert_eq!(request.i32_at(4), Some(2));

    let _ = client.square().get_joined_squares(None, 50).await;
    let request = mock.recorded("getJoinedSquares")[0].struct_at(1).unwrap().clone();
    assert_eq!(request.get(2), None, "absent continuation stays off the wire");
    assert_eq!(request.i32_at(3), Some(50));

    let _ = client.square().join_square("s777", "watcher").await;
    let request = mock.recorded("joinSquare")[0].struct_at(1).unwrap().clone();
    assert_eq!(request.str_at(2), Some("s777"));
    let member = request.struct_at(3).unwrap();
    assert_eq!(member.str_at(2), Some("s777"));
    assert_eq!(member.str_at(3), Some("watcher"));
    assert_eq!(member.bool_at(5), Some(false));

    let _ = client.square().destroy_message("mAAA", "msg-2").await;
    let request = mock.recorded("destroyMessage")[0].struct_at(1).unwrap().clone();
    assert_eq!(request.str_at(2), Some("mAAA"));
    assert_eq!(request.str_at(4), Some("msg-2"));
}

#[tokio::test]
async fn channel_token_issuance() {
    specs::init_tracing();
    let mock = MockLine::start().await.unwrap();
    let client = logged_in_client(&mock).await;

    let token = client
        .channel()
        .approve_channel_and_issue_channel_token("1341209950")
        .await
        .unwrap();
    assert_eq!(token.channel_access_token.as_deref(), Some("channel-token-1"));
    assert_eq!(token.obs_token.as_deref(), Some("obs-token-1"));

    let body = &mock.recorded("approveChannelAndIssueChannelToken")[0];
    assert_eq!(body.str_at(1), Some("1341209950"));
}
