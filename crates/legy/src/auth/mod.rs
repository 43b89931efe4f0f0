// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login flows: email (v1/v2) and QR (v1/v2), plus the prompt channel the
//! flows use to ask the user to act.

pub mod crypto;
pub mod e2ee;
pub mod email;
pub mod qr;

use tokio::sync::mpsc;

/// Something the user must act on to finish a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPrompt {
    /// Render this URL as a QR code for the phone to scan.
    QrUrl(String),
    /// Enter this PIN on the already-authenticated device.
    PinCode(String),
}

/// Bounded prompt pipe; the consumer renders however it wants.
pub fn prompt_channel() -> (mpsc::Sender<LoginPrompt>, mpsc::Receiver<LoginPrompt>) {
    mpsc::channel(8)
}

/// Deliver a prompt. A missing consumer is not an error; the flow keeps
/// going and the prompt is only logged.
pub(crate) async fn emit_prompt(tx: &mpsc::Sender<LoginPrompt>, prompt: LoginPrompt) {
    match &prompt {
        LoginPrompt::QrUrl(url) => tracing::info!(url = %url, "scan QR code to log in"),
        LoginPrompt::PinCode(pin) => tracing::info!(pin = %pin, "enter PIN on your device"),
    }
    if tx.send(prompt).await.is_err() {
        tracing::debug!("no login prompt consumer attached");
    }
}
