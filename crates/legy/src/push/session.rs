// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One push connection: an HTTP/2 POST whose request and response bodies
//! stay open as a framed duplex stream.
//!
//! [`run_on`] is generic over the underlying IO so specs can drive a whole
//! session over an in-process pipe; production dials TLS with [`dial`].

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use bytes::Bytes;
use h2::client;
use h2::{Ping, PingPong, SendStream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::frame::{Frame, FrameDecoder, KIND_ACK_REQUIRED, KIND_NONE};
use super::keepalive::{KeepAlive, KeepAliveAction};
use super::signon::{CompletedSignOn, SignOnRegistry};

/// A sign-on call to replay during negotiation.
#[derive(Debug, Clone)]
pub struct SignOnCall {
    pub service: u8,
    pub method: String,
    pub payload: Vec<u8>,
}

/// Everything one connection attempt needs.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// `:authority` / TLS server name.
    pub authority: String,
    /// `/PUSH/1/subs?m=<serviceMask>`.
    pub path: String,
    pub access_token: String,
    pub line_application: String,
    /// Desired server-ping interval sent in the status frame.
    pub ping_interval_secs: u16,
    pub keepalive: Duration,
    pub idle_limit: Duration,
    pub sign_ons: Vec<SignOnCall>,
}

/// What a live session reports upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignOnReply(CompletedSignOn),
    PushNotify { service: u8, push_id: i32, payload: Vec<u8> },
}

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for rustls. Safe to call repeatedly.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Open the TLS connection the push stream rides on (ALPN pinned to h2).
pub async fn dial(host: &str, port: u16) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    ensure_crypto();
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect((host, port)).await?;
    let name = rustls::pki_types::ServerName::try_from(host.to_owned())
        .map_err(|_| Error::Config(format!("invalid push host {host}")))?;
    Ok(connector.connect(name, tcp).await?)
}

/// Run one session over an established stream until cancellation or a
/// transport-level death. A clean cancel returns `Ok(())`; everything else
/// is an error the manager turns into a reconnect.
pub async fn run_on<T>(
    io: T,
    params: SessionParams,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (send_request, mut connection) = client::handshake(io).await?;
    let ping_pong = connection.ping_pong();

    // Drive the connection; it ends when the streams drop.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(err = %e, "push h2 connection closed");
        }
    });

    let request = http::Request::builder()
        .method("POST")
        .uri(format!("https://{}{}", params.authority, params.path))
        .header("x-line-application", params.line_application.as_str())
        .header("x-line-access", params.access_token.as_str())
        .header("content-type", "application/octet-stream")
        .header("accept", "application/octet-stream")
        .body(())
        .map_err(|e| Error::Config(format!("push request: {e}")))?;

    let mut send_request = send_request.ready().await?;
    let (response, mut outbound) = send_request.send_request(request, false)?;

    // Negotiation: status frame, then one sign-on per enabled service.
    let mut registry = SignOnRegistry::new();
    send_frame(
        &mut outbound,
        Frame::Status { foreground: true, ping_interval_secs: params.ping_interval_secs },
    )
    .await?;
    for call in &params.sign_ons {
        let request_id = registry.register(call.service, &call.method);
        tracing::debug!(request_id, service = call.service, method = %call.method, "sign-on");
        send_frame(
            &mut outbound,
            Frame::SignOnRequest { request_id, service: call.service, payload: call.payload.clone() },
        )
        .await?;
    }

    // Keep-alive runs beside the read loop and flags death via `dead`.
    let (activity_tx, activity_rx) = watch::channel(Instant::now());
    let dead = CancellationToken::new();
    if let Some(ping_pong) = ping_pong {
        tokio::spawn(keepalive_task(
            ping_pong,
            activity_rx,
            params.keepalive,
            params.idle_limit,
            dead.clone(),
            cancel.clone(),
        ));
    }

    let response = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        r = response => r.map_err(Error::from)?,
    };
    if !response.status().is_success() {
        return Err(Error::Transport(format!("push subscribe: http {}", response.status())));
    }
    let mut inbound = response.into_body();

    let mut decoder = FrameDecoder::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = dead.cancelled() => {
                return Err(Error::Transport("push stream keep-alive expired".to_owned()));
            }
            chunk = inbound.data() => {
                let data = match chunk {
                    Some(Ok(data)) => data,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(Error::Transport("push stream ended by server".to_owned())),
                };
                let _ = inbound.flow_control().release_capacity(data.len());
                let _ = activity_tx.send(Instant::now());
                decoder.extend(&data);
                while let Some(frame) = decoder.next_frame()? {
                    handle_frame(frame, &mut registry, &mut outbound, &events).await?;
                }
            }
        }
    }
}

async fn handle_frame(
    frame: Frame,
    registry: &mut SignOnRegistry,
    outbound: &mut SendStream<Bytes>,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<()> {
    match frame {
        Frame::Ping { sub_kind, id } => {
            if sub_kind == KIND_ACK_REQUIRED {
                send_frame(outbound, Frame::ping_ack(id)).await?;
                tracing::trace!(id, "acked server ping");
            }
        }
        Frame::SignOnResponse { request_id, fin, payload } => {
            if let Some(done) = registry.on_fragment(request_id, fin, &payload)? {
                emit(events, SessionEvent::SignOnReply(done)).await?;
            }
        }
        Frame::Push { kind, service, push_id, payload } => {
            // The ack is written before the application ever sees the frame.
            if kind == KIND_ACK_REQUIRED {
                send_frame(outbound, Frame::push_ack(service, push_id)).await?;
            }
            if kind == KIND_NONE || kind == KIND_ACK_REQUIRED {
                emit(events, SessionEvent::PushNotify { service, push_id, payload }).await?;
            }
        }
        Frame::Status { .. } | Frame::SignOnRequest { .. } => {
            tracing::trace!("ignoring echoed control frame");
        }
        Frame::Unknown { frame_kind, payload } => {
            tracing::debug!(frame_kind, len = payload.len(), "unknown push frame kind");
        }
    }
    Ok(())
}

async fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| Error::State("push session consumer dropped".to_owned()))
}

/// Write one frame, honoring h2 flow-control capacity grants.
async fn send_frame(stream: &mut SendStream<Bytes>, frame: Frame) -> Result<()> {
    let mut bytes = Bytes::from(frame.encode());
    while !bytes.is_empty() {
        stream.reserve_capacity(bytes.len());
        let granted = std::future::poll_fn(|cx| stream.poll_capacity(cx))
            .await
            .ok_or_else(|| Error::Transport("push stream closed while sending".to_owned()))??;
        if granted == 0 {
            continue;
        }
        let chunk = bytes.split_to(granted.min(bytes.len()));
        stream.send_data(chunk, false)?;
    }
    Ok(())
}

/// Ping the peer when the stream goes quiet; declare death on a missed
/// pong or when the hard idle limit passes without a frame.
async fn keepalive_task(
    mut ping_pong: PingPong,
    activity: watch::Receiver<Instant>,
    threshold: Duration,
    idle_limit: Duration,
    dead: CancellationToken,
    cancel: CancellationToken,
) {
    let mut ka = KeepAlive::new(threshold, idle_limit, Instant::now());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        ka.on_received(*activity.borrow());
        match ka.poll(Instant::now()) {
            KeepAliveAction::Wait => {}
            KeepAliveAction::SendPing => {
                ka.on_ping_sent(Instant::now());
                match tokio::time::timeout(threshold, ping_pong.ping(Ping::opaque())).await {
                    Ok(Ok(_pong)) => ka.on_pong(),
                    Ok(Err(e)) => {
                        tracing::debug!(err = %e, "keep-alive ping failed");
                        dead.cancel();
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("keep-alive ping unanswered, tearing down");
                        dead.cancel();
                        return;
                    }
                }
            }
            KeepAliveAction::Disconnect => {
                tracing::warn!("push stream idle past limit, tearing down");
                dead.cancel();
                return;
            }
        }
    }
}
