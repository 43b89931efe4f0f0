// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OBS (object storage) upload helper.
//!
//! Uploads ride a plain POST with the upload parameters base64-packed into
//! `x-obs-params`; the object id and hash come back in response headers.

use std::sync::Arc;

use base64::Engine;

use crate::error::{Error, Result};
use crate::transport::HttpTransport;

/// What kind of object is being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsMediaKind {
    Image,
    Gif,
    Video,
    Audio,
    File,
}

impl ObsMediaKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }
}

/// Result of an upload: the object id/hash to reference in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsObject {
    pub object_id: String,
    pub object_hash: String,
}

pub struct ObsClient {
    transport: Arc<HttpTransport>,
    base_url: String,
}

impl ObsClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: impl Into<String>) -> Self {
        Self { transport, base_url: base_url.into() }
    }

    /// Upload media destined for a square chat.
    pub async fn upload_square_chat_media(
        &self,
        chat_mid: &str,
        mid: &str,
        reqseq: i32,
        data: Vec<u8>,
        kind: ObsMediaKind,
        filename: &str,
        duration_ms: Option<u64>,
    ) -> Result<ObsObject> {
        let mut params = serde_json::json!({
            "ver": "2.0",
            "type": kind.as_str(),
            "oid": "reqseq",
            "reqseq": reqseq.to_string(),
            "tomid": chat_mid,
            "name": filename,
        });
        match kind {
            ObsMediaKind::Image | ObsMediaKind::Gif => {
                params["cat"] = serde_json::Value::from("original");
            }
            ObsMediaKind::Video | ObsMediaKind::Audio => {
                params["duration"] = serde_json::Value::from(duration_ms.unwrap_or(1000).to_string());
            }
            ObsMediaKind::File => {}
        }

        let token = self
            .transport
            .access_token()
            .await
            .ok_or_else(|| Error::State("obs upload requires an authenticated session".to_owned()))?;

        let headers = vec![
            ("x-line-access".to_owned(), token),
            ("x-line-application".to_owned(), self.transport.profile().line_application()),
            ("x-line-mid".to_owned(), mid.to_owned()),
            ("content-type".to_owned(), "application/octet-stream".to_owned()),
            ("x-obs-params".to_owned(), encode_obs_params(&params)),
            ("user-agent".to_owned(), self.transport.profile().user_agent()),
        ];

        let url = format!("{}/r/g2/m/reqseq", self.base_url.trim_end_matches('/'));
        let resp = self.transport.post_url(&url, data, &headers).await?;
        if !(200..300).contains(&resp.status) {
            return Err(Error::Transport(format!("obs upload failed: http {}", resp.status)));
        }

        let header = |name: &str| -> Option<String> {
            resp.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        Ok(ObsObject {
            object_id: header("x-obs-oid").unwrap_or_else(|| "reqseq".to_owned()),
            object_hash: header("x-obs-hash").unwrap_or_default(),
        })
    }
}

/// Base64 of the JSON parameter blob, as the server expects it.
pub fn encode_obs_params(params: &serde_json::Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(params.to_string())
}

#[cfg(test)]
#[path = "obs_tests.rs"]
mod tests;
