// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The server half of a push stream, for driving a client session over an
//! in-process duplex pipe.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use legy::push::frame::{Frame, FrameDecoder};

/// An accepted push subscription: read the client's frames, write yours.
pub struct PushServer {
    pub path: String,
    recv: h2::RecvStream,
    send: h2::SendStream<Bytes>,
    decoder: FrameDecoder,
}

/// Accept the client's HTTP/2 request on `io` and answer 200 with an
/// open-ended body.
pub async fn accept<T>(io: T) -> anyhow::Result<PushServer>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut connection = h2::server::handshake(io).await?;
    let (request, mut respond) = connection
        .accept()
        .await
        .ok_or_else(|| anyhow::anyhow!("client closed before subscribing"))??;

    // Keep the connection polled for the rest of the test.
    tokio::spawn(async move { while connection.accept().await.is_some() {} });

    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.to_string())
        .unwrap_or_default();
    let recv = request.into_body();
    let response = http::Response::builder().status(200).body(())?;
    let send = respond.send_response(response, false)?;

    Ok(PushServer { path, recv, send, decoder: FrameDecoder::new() })
}

impl PushServer {
    /// Next complete frame from the client.
    pub async fn next_frame(&mut self) -> anyhow::Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }
            let chunk = self
                .recv
                .data()
                .await
                .ok_or_else(|| anyhow::anyhow!("client closed the push stream"))??;
            let _ = self.recv.flow_control().release_capacity(chunk.len());
            self.decoder.extend(&chunk);
        }
    }

    /// Write one frame to the client.
    pub async fn send_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let mut bytes = Bytes::from(frame.encode());
        while !bytes.is_empty() {
            self.send.reserve_capacity(bytes.len());
            let granted = std::future::poll_fn(|cx| self.send.poll_capacity(cx))
                .await
                .ok_or_else(|| anyhow::anyhow!("push stream closed while sending"))??;
            if granted == 0 {
                continue;
            }
            let chunk = bytes.split_to(granted.min(bytes.len()));
            self.send.send_data(chunk, false)?;
        }
        Ok(())
    }

    /// Write raw bytes (for deliberately split frames).
    pub async fn send_bytes(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut bytes = Bytes::copy_from_slice(data);
        while !bytes.is_empty() {
            self.send.reserve_capacity(bytes.len());
            let granted = std::future::poll_fn(|cx| self.send.poll_capacity(cx))
                .await
                .ok_or_else(|| anyhow::anyhow!("push stream closed while sending"))??;
            if granted == 0 {
                continue;
            }
            let chunk = bytes.split_to(granted.min(bytes.len()));
            self.send.send_data(chunk, false)?;
        }
        Ok(())
    }
}
