// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: an in-process mock LINE gateway speaking just enough of
//! the wire to exercise login, RPC and fetch flows end to end, plus an
//! h2 server half for driving a push session over a duplex pipe.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

use legy::thrift::{self, Message, MessageKind, Protocol, Struct, Ttype, Value};
use legy::ClientConfig;

pub mod pushpipe;

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// One scripted `fetchSquareChatEvents` behavior step.
#[derive(Clone)]
pub enum FetchStep {
    /// Answer with HTTP 429.
    RateLimited,
    /// Answer with a page of events.
    Page { events: Vec<MockEvent>, sync: String, cont: Option<String> },
}

#[derive(Clone)]
pub struct MockEvent {
    pub ts: i64,
    pub message_id: String,
    pub text: String,
}

/// A recorded fetch request.
#[derive(Clone, Debug)]
pub struct FetchCall {
    pub chat: String,
    pub sync: Option<String>,
    pub cont: Option<String>,
    pub limit: i32,
}

pub struct MockState {
    pub qr_scanned: AtomicBool,
    pub pin_confirmed: AtomicBool,
    pub accept_certificate: AtomicBool,
    methods: Mutex<Vec<String>>,
    bodies: Mutex<Vec<(String, Struct)>>,
    fetch_calls: Mutex<Vec<FetchCall>>,
    fetch_scripts: Mutex<HashMap<String, VecDeque<FetchStep>>>,
    refresh_calls: Mutex<Vec<String>>,
    rsa: RsaPrivateKey,
}

impl MockState {
    fn new() -> anyhow::Result<Self> {
        // Small key: these specs only need the envelope to round-trip.
        let rsa = RsaPrivateKey::new(&mut rand::thread_rng(), 512)?;
        Ok(Self {
            qr_scanned: AtomicBool::new(false),
            pin_confirmed: AtomicBool::new(false),
            accept_certificate: AtomicBool::new(false),
            methods: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
            fetch_calls: Mutex::new(Vec::new()),
            fetch_scripts: Mutex::new(HashMap::new()),
            refresh_calls: Mutex::new(Vec::new()),
            rsa,
        })
    }

    fn record_method(&self, name: &str) {
        if let Ok(mut methods) = self.methods.lock() {
            methods.push(name.to_owned());
        }
    }

    fn record_body(&self, request: &Message) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.push((request.name.clone(), request.body.clone()));
        }
    }
}

/// The running mock gateway.
pub struct MockLine {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockLine {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::new()?);
        let router = Router::new()
            .route("/acct/lgn/sq/v1", post(qr_endpoint))
            .route("/acct/lp/lgn/sq/v1", post(qr_long_poll))
            .route("/S4", post(talk_endpoint))
            .route("/SQ1", post(square_endpoint))
            .route("/CH4", post(channel_endpoint))
            .route("/EXT/auth/tokenrefresh/v1", post(refresh_endpoint))
            .route("/api/v3p/rs", post(auth_endpoint))
            .route("/api/v3/TalkService.do", post(auth_endpoint))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client config pointed at this mock, with spec-sized deadlines.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url(),
            rpc_timeout_ms: 5_000,
            long_poll_ms: 300,
            login_deadline_ms: 3_000,
            ..Default::default()
        }
    }

    pub fn script_fetch(&self, chat: &str, steps: Vec<FetchStep>) {
        if let Ok(mut scripts) = self.state.fetch_scripts.lock() {
            scripts.entry(chat.to_owned()).or_default().extend(steps);
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.state.methods.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Decoded argument structs recorded for one method, in arrival order.
    pub fn recorded(&self, method: &str) -> Vec<Struct> {
        self.state
            .bodies
            .lock()
            .map(|bodies| {
                bodies
                    .iter()
                    .filter(|(name, _)| name == method)
                    .map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.state.fetch_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        self.state.refresh_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

// -- Thrift plumbing ----------------------------------------------------------

fn reply_bytes(protocol: Protocol, request: &Message, payload: Option<Value>) -> Vec<u8> {
    let mut body = Struct::new();
    if let Some(value) = payload {
        body.push(0, value);
    }
    thrift::encode_message(
        protocol,
        &Message { name: request.name.clone(), kind: MessageKind::Reply, seq: request.seq, body },
    )
}

fn exception_bytes(protocol: Protocol, request: &Message, code: i32, message: &str) -> Vec<u8> {
    let exc = Struct::new().with(1, Value::I32(code)).with(2, Value::string(message));
    let body = Struct::new().with(1, Value::Struct(exc));
    thrift::encode_message(
        protocol,
        &Message { name: request.name.clone(), kind: MessageKind::Reply, seq: request.seq, body },
    )
}

fn ok(bytes: Vec<u8>) -> Response {
    (StatusCode::OK, bytes).into_response()
}

fn bad_request() -> Response {
    StatusCode::BAD_REQUEST.into_response()
}

// -- Endpoints ----------------------------------------------------------------

async fn qr_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    let p = Protocol::Compact;

    match request.name.as_str() {
        "createSession" => ok(reply_bytes(
            p,
            &request,
            Some(Value::Struct(Struct::new().with(1, Value::string("sqr-session-1")))),
        )),
        "createQrCode" => ok(reply_bytes(
            p,
            &request,
            Some(Value::Struct(Struct::new().with(1, Value::string("line://au/q/SPECTICKET")))),
        )),
        "verifyCertificate" => {
            if state.accept_certificate.load(Ordering::Relaxed) {
                ok(reply_bytes(p, &request, None))
            } else {
                ok(exception_bytes(p, &request, 100, "CERTIFICATE_REQUIRED"))
            }
        }
        "createPinCode" => ok(reply_bytes(
            p,
            &request,
            Some(Value::Struct(Struct::new().with(1, Value::string("123456")))),
        )),
        "qrCodeLoginV2" => {
            let token = Struct::new()
                .with(1, Value::string("qr-access-token"))
                .with(2, Value::string("qr-refresh-token"))
                .with(3, Value::I64(now_unix()))
                .with(4, Value::I64(3600));
            let payload = Struct::new()
                .with(1, Value::string("qr-cert-issued"))
                .with(2, Value::string("u1234567890abcdef"))
                .with(3, Value::Struct(token));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        "qrCodeLogin" => {
            let payload = Struct::new()
                .with(1, Value::string("qr-cert-issued"))
                .with(2, Value::string("qr-access-token"))
                .with(3, Value::string("u1234567890abcdef"));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        _ => ok(exception_bytes(p, &request, 404, "UNKNOWN_METHOD")),
    }
}

async fn qr_long_poll(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);

    // Hold the request until the matching flag flips; the client's own
    // per-request timeout fires first when nobody acts.
    for _ in 0..400 {
        let done = match request.name.as_str() {
            "checkQrCodeVerified" => state.qr_scanned.load(Ordering::Relaxed),
            "checkPinCodeVerified" => state.pin_confirmed.load(Ordering::Relaxed),
            _ => return bad_request(),
        };
        if done {
            return ok(reply_bytes(Protocol::Compact, &request, None));
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    ok(exception_bytes(Protocol::Compact, &request, 408, "VERIFICATION_EXPIRED"))
}

async fn talk_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    state.record_body(&request);
    let p = Protocol::Compact;

    match request.name.as_str() {
        "getProfile" => {
            let payload = Struct::new()
                .with(1, Value::string("u1234567890abcdef"))
                .with(20, Value::string("Spec User"));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        "sendMessage" => {
            let payload = Struct::new().with(4, Value::string("m-sent-1"));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        _ => ok(reply_bytes(p, &request, None)),
    }
}

async fn square_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    state.record_body(&request);
    let p = Protocol::Compact;

    if request.name != "fetchSquareChatEvents" {
        return ok(reply_bytes(p, &request, None));
    }

    let Some(args) = request.body.struct_at(1) else {
        return bad_request();
    };
    let call = FetchCall {
        chat: args.string_at(2).unwrap_or_default(),
        sync: args.string_at(3),
        cont: args.string_at(7),
        limit: args.i32_at(4).unwrap_or(0),
    };
    if let Ok(mut calls) = state.fetch_calls.lock() {
        calls.push(call.clone());
    }

    let step = state
        .fetch_scripts
        .lock()
        .ok()
        .and_then(|mut scripts| scripts.get_mut(&call.chat).and_then(|q| q.pop_front()));

    match step {
        Some(FetchStep::RateLimited) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Some(FetchStep::Page { events, sync, cont }) => {
            let items: Vec<Value> = events.iter().map(|e| encode_event(&call.chat, e)).collect();
            let payload = Struct::new()
                .with(1, Value::List(Ttype::Struct, items))
                .with(2, Value::string(sync))
                .with_opt(3, cont.map(Value::string));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        None => {
            // Nothing scripted: an empty page that keeps the cursor put.
            let sync = call.sync.unwrap_or_else(|| "sync-0".to_owned());
            let payload = Struct::new()
                .with(1, Value::List(Ttype::Struct, Vec::new()))
                .with(2, Value::string(sync));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
    }
}

fn encode_event(chat: &str, event: &MockEvent) -> Value {
    let message = Struct::new()
        .with(1, Value::string("p-sender"))
        .with(4, Value::string(event.message_id.clone()))
        .with(10, Value::string(event.text.clone()));
    let square_message = Struct::new().with(1, Value::Struct(message));
    let receive = Struct::new()
        .with(1, Value::string(chat))
        .with(2, Value::Struct(square_message));
    let payload = Struct::new().with(1, Value::Struct(receive));
    Value::Struct(
        Struct::new()
            .with(1, Value::I64(event.ts))
            .with(2, Value::I32(0))
            .with(3, Value::Struct(payload)),
    )
}

async fn channel_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    state.record_body(&request);
    let p = Protocol::Compact;

    match request.name.as_str() {
        "approveChannelAndIssueChannelToken" => {
            let payload = Struct::new()
                .with(1, Value::string("channel-token-1"))
                .with(2, Value::string("obs-token-1"))
                .with(3, Value::I64(now_unix() + 3600));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        _ => ok(exception_bytes(p, &request, 404, "UNKNOWN_METHOD")),
    }
}

async fn refresh_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Compact, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    let p = Protocol::Compact;

    match request.name.as_str() {
        "refresh" => {
            let token =
                request.body.struct_at(1).and_then(|r| r.string_at(1)).unwrap_or_default();
            if let Ok(mut calls) = state.refresh_calls.lock() {
                calls.push(token);
            }
            let payload = Struct::new()
                .with(1, Value::string("access-2"))
                .with(3, Value::string("refresh-2"))
                .with(4, Value::I64(now_unix()))
                .with(5, Value::I64(3600));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        _ => ok(reply_bytes(p, &request, None)),
    }
}

async fn auth_endpoint(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(request) = thrift::decode_message(Protocol::Binary, &body) else {
        return bad_request();
    };
    state.record_method(&request.name);
    let p = Protocol::Binary;

    match request.name.as_str() {
        "getRSAKeyInfo" => {
            let payload = Struct::new()
                .with(1, Value::string("rsa-key-1"))
                .with(2, Value::string(format!("{:x}", state.rsa.n())))
                .with(3, Value::string(format!("{:x}", state.rsa.e())))
                .with(4, Value::string("spec-session-key"));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        "loginV2" => {
            let token = Struct::new()
                .with(1, Value::string("email-access-token"))
                .with(2, Value::string("email-refresh-token"))
                .with(3, Value::I64(now_unix()))
                .with(4, Value::I64(3600));
            let payload = Struct::new()
                .with(2, Value::string("email-cert-issued"))
                .with(9, Value::Struct(token));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        "loginZ" => {
            let payload = Struct::new()
                .with(1, Value::string("email-access-token"))
                .with(2, Value::string("email-cert-issued"));
            ok(reply_bytes(p, &request, Some(Value::Struct(payload))))
        }
        _ => ok(exception_bytes(p, &request, 404, "UNKNOWN_METHOD")),
    }
}
