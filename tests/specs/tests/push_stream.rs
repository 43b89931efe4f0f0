// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives a whole push session over an in-process duplex pipe with a real
//! h2 server on the other end.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use legy::push::frame::{Frame, KIND_ACK, KIND_ACK_REQUIRED, SERVICE_SQUARE};
use legy::push::session::{run_on, SessionEvent, SessionParams, SignOnCall};
use legy::thrift::{self, Message, MessageKind, Protocol, Struct, Value};
use specs::pushpipe;

fn params() -> SessionParams {
    let args = Struct::new().with(
        1,
        Value::Struct(
            Struct::new()
                .with(1, Value::I64(1_700_000_000_000))
                .with(3, Value::I32(100)),
        ),
    );
    SessionParams {
        authority: "push.spec".to_owned(),
        path: "/PUSH/1/subs?m=4".to_owned(),
        access_token: "spec-token".to_owned(),
        line_application: "DESKTOPWIN\t9.2.0.3403\tWINDOWS\t10.0.0-NT-x64".to_owned(),
        ping_interval_secs: 30,
        keepalive: Duration::from_secs(30),
        idle_limit: Duration::from_secs(120),
        sign_ons: vec![SignOnCall {
            service: SERVICE_SQUARE,
            method: "fetchMyEvents".to_owned(),
            payload: thrift::encode_call(Protocol::Compact, "fetchMyEvents", 0, args),
        }],
    }
}

fn sign_on_reply_bytes() -> Vec<u8> {
    let payload = Struct::new().with(3, Value::string("sync-A"));
    let body = Struct::new().with(0, Value::Struct(payload));
    thrift::encode_message(
        Protocol::Compact,
        &Message { name: "fetchMyEvents".to_owned(), kind: MessageKind::Reply, seq: 0, body },
    )
}

#[tokio::test]
async fn push_session_negotiates_acks_and_notifies() {
    specs::init_tracing();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let (events_tx, mut events_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let session = tokio::spawn(run_on(client_io, params(), events_tx, cancel.clone()));
    let mut server = pushpipe::accept(server_io).await.unwrap();
    assert_eq!(server.path, "/PUSH/1/subs?m=4");

    // Negotiation: status frame first, then the square sign-on.
    let status = server.next_frame().await.unwrap();
    assert_eq!(status, Frame::Status { foreground: true, ping_interval_secs: 30 });

    let sign_on = server.next_frame().await.unwrap();
    let Frame::SignOnRequest { request_id, service, payload } = sign_on else {
        panic!("expected sign-on request, got {sign_on:?}");
    };
    assert_eq!(request_id, 1);
    assert_eq!(service, SERVICE_SQUARE);
    let call = thrift::decode_message(Protocol::Compact, &payload).unwrap();
    assert_eq!(call.name, "fetchMyEvents");

    // Answer the sign-on split across two fragments.
    let reply = sign_on_reply_bytes();
    let (head, tail) = reply.split_at(reply.len() / 2);
    server
        .send_frame(&Frame::SignOnResponse { request_id: 1, fin: false, payload: head.to_vec() })
        .await
        .unwrap();
    server
        .send_frame(&Frame::SignOnResponse { request_id: 1, fin: true, payload: tail.to_vec() })
        .await
        .unwrap();

    let event = events_rx.recv().await.unwrap();
    let SessionEvent::SignOnReply(done) = event else {
        panic!("expected sign-on reply, got {event:?}");
    };
    assert_eq!(done.request_id, 1);
    assert_eq!(done.payload, reply, "fragments reassemble in arrival order");

    // A server ping must be acked with its id echoed.
    server.send_frame(&Frame::Ping { sub_kind: KIND_ACK_REQUIRED, id: 7 }).await.unwrap();
    assert_eq!(server.next_frame().await.unwrap(), Frame::ping_ack(7));

    // An ack-required push is acked on the wire before the notification
    // surfaces to the application side.
    server
        .send_frame(&Frame::Push {
            kind: KIND_ACK_REQUIRED,
            service: SERVICE_SQUARE,
            push_id: 42,
            payload: Vec::new(),
        })
        .await
        .unwrap();

    let ack = server.next_frame().await.unwrap();
    assert_eq!(
        ack,
        Frame::Push { kind: KIND_ACK, service: SERVICE_SQUARE, push_id: 42, payload: Vec::new() }
    );
    assert_eq!(
        events_rx.recv().await.unwrap(),
        SessionEvent::PushNotify { service: SERVICE_SQUARE, push_id: 42, payload: Vec::new() }
    );

    // Clean shutdown.
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn server_closing_the_stream_is_a_transport_error() {
    specs::init_tracing();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let (events_tx, _events_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let session = tokio::spawn(run_on(client_io, params(), events_tx, cancel));
    let server = pushpipe::accept(server_io).await.unwrap();
    drop(server);

    let err = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), "TRANSPORT");
}
