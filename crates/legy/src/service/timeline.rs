// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeline posts over the channel-token HTTP API.
//!
//! Timeline is not Thrift: it wants JSON under `/mh/api/v57/post/` with a
//! channel token issued through [`super::channel::ChannelService`]. The
//! wire request is always POST; the logical verb rides in `x-lhm` like
//! everywhere else.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::DeviceKind;
use crate::error::{Error, Result};
use crate::storage;
use crate::transport::HttpTransport;

use super::channel::ChannelService;

pub struct TimelineService {
    transport: Arc<HttpTransport>,
    channel: ChannelService,
    session: storage::Session,
    base_url: String,
    channel_token: RwLock<Option<String>>,
}

impl TimelineService {
    pub fn new(
        transport: Arc<HttpTransport>,
        channel: ChannelService,
        session: storage::Session,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            channel,
            session,
            base_url: base_url.into(),
            channel_token: RwLock::new(None),
        }
    }

    fn channel_id(&self) -> &'static str {
        match self.transport.profile().kind {
            DeviceKind::ChromeOs => "1341209850",
            _ => "1341209950",
        }
    }

    async fn ensure_channel_token(&self) -> Result<String> {
        if let Some(token) = self.channel_token.read().await.clone() {
            return Ok(token);
        }
        let issued = self
            .channel
            .approve_channel_and_issue_channel_token(self.channel_id())
            .await?;
        let token = issued
            .channel_access_token
            .ok_or_else(|| Error::Auth("channel token issuance returned no token".to_owned()))?;
        *self.channel_token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn request(
        &self,
        path_and_query: &str,
        logical_method: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let channel_token = self.ensure_channel_token().await?;
        let access = self
            .transport
            .access_token()
            .await
            .ok_or_else(|| Error::State("timeline requires an authenticated session".to_owned()))?;
        let mid = self
            .session
            .mid()
            .ok_or_else(|| Error::State("timeline requires a known mid".to_owned()))?;

        let profile = self.transport.profile();
        let headers = vec![
            ("x-line-application".to_owned(), profile.line_application()),
            ("user-agent".to_owned(), profile.user_agent()),
            ("x-line-mid".to_owned(), mid),
            ("x-line-access".to_owned(), access),
            ("x-line-channeltoken".to_owned(), channel_token),
            ("x-lal".to_owned(), "ja_JP".to_owned()),
            ("x-lap".to_owned(), "5".to_owned()),
            ("x-lpv".to_owned(), "1".to_owned()),
            ("x-lsr".to_owned(), "JP".to_owned()),
            ("x-line-bdbtemplateversion".to_owned(), "v1".to_owned()),
            (
                "x-line-global-config".to_owned(),
                "discover.enable=true; follow.enable=true".to_owned(),
            ),
            ("x-lhm".to_owned(), logical_method.to_owned()),
            ("content-type".to_owned(), "application/json".to_owned()),
        ];

        let url = format!(
            "{}/mh/api/v57/post/{path_and_query}",
            self.base_url.trim_end_matches('/')
        );
        let payload = match body {
            Some(value) => serde_json::to_vec(&value)
                .map_err(|e| Error::Config(format!("timeline body: {e}")))?,
            None => Vec::new(),
        };
        let resp = self.transport.post_url(&url, payload, &headers).await?;
        if !(200..300).contains(&resp.status) {
            return Err(Error::Transport(format!("timeline: http {}", resp.status)));
        }
        serde_json::from_slice(&resp.body)
            .map_err(|e| Error::Codec(format!("timeline reply: {e}")))
    }

    pub async fn create_post(&self, home_id: &str, text: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "homeId": home_id,
            "sourceType": "TIMELINE",
            "postInfo": { "readPermission": { "type": "ALL" } },
            "contents": { "text": text },
        });
        self.request("create.json", "POST", Some(body)).await
    }

    pub async fn list_posts(&self, home_id: &str, limit: u32) -> Result<serde_json::Value> {
        let query = format!(
            "list.json?homeId={}&postLimit={limit}&sourceType=TIMELINE",
            urlencoding::encode(home_id)
        );
        self.request(&query, "GET", None).await
    }

    pub async fn delete_post(&self, home_id: &str, post_id: &str) -> Result<serde_json::Value> {
        let query = format!(
            "delete.json?homeId={}&postId={}",
            urlencoding::encode(home_id),
            urlencoding::encode(post_id)
        );
        self.request(&query, "GET", None).await
    }
}
