// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the RPC side of the wire.
//!
//! One pooled HTTP/2 client per transport. Every Thrift request goes out as
//! a POST; the logical verb rides in `x-lhm`. The push stream does not live
//! here; it needs a raw duplex stream and has its own dialer in
//! [`crate::push`].

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::config::{ClientConfig, DeviceProfile};
use crate::error::{Error, Result};

/// Header pairs common to every request against the gateway.
///
/// `Accept-Encoding: gzip` is not listed: the HTTP client appends it (and
/// transparently decompresses) on its own.
pub fn base_headers(
    profile: &DeviceProfile,
    access_token: Option<&str>,
    logical_method: &str,
) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("accept", "application/x-thrift".to_owned()),
        ("user-agent", profile.user_agent()),
        ("x-line-application", profile.line_application()),
        ("content-type", "application/x-thrift".to_owned()),
        ("x-lal", "ja_JP".to_owned()),
        ("x-lpv", "1".to_owned()),
        ("x-lhm", logical_method.to_owned()),
    ];
    if let Some(token) = access_token {
        headers.push(("x-line-access", token.to_owned()));
    }
    headers
}

/// A raw response the caller inspects itself (login long-polls expect some
/// requests to "fail").
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Response of an out-of-gateway POST (OBS uploads), headers included.
#[derive(Debug)]
pub struct UploadResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Pooled HTTP client with the LINE header set baked in.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    profile: DeviceProfile,
    access_token: RwLock<Option<String>>,
    rpc_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, profile: DeviceProfile) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout())
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            profile,
            access_token: RwLock::new(None),
            rpc_timeout: config.rpc_timeout(),
        })
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Install (or clear) the token sent as `x-line-access`.
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn apply_headers(
        &self,
        mut req: reqwest::RequestBuilder,
        logical_method: &str,
        access_token_override: Option<&str>,
        extra: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let stored = self.access_token.read().await;
        let token = access_token_override.or(stored.as_deref());
        for (name, value) in base_headers(&self.profile, token, logical_method) {
            req = req.header(name, value);
        }
        for (name, value) in extra {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }

    /// POST Thrift bytes and return the response bytes. Non-2xx fails with
    /// a transport error; 429 is classified as rate limiting.
    pub async fn thrift_call(
        &self,
        path: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
        extra_headers: &[(String, String)],
    ) -> Result<Bytes> {
        let req = self
            .client
            .post(self.url(path))
            .timeout(timeout.unwrap_or(self.rpc_timeout))
            .body(body);
        let req = self.apply_headers(req, "POST", None, extra_headers).await;

        let resp = req.send().await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimit(format!("{path}: http 429")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "{path}: http {} {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(resp.bytes().await?)
    }

    /// Raw request that hands back status + body without judging non-2xx.
    pub async fn raw_call(
        &self,
        path: &str,
        logical_method: &str,
        body: Option<Vec<u8>>,
        access_token: Option<&str>,
        timeout: Option<Duration>,
        extra_headers: &[(String, String)],
    ) -> Result<RawResponse> {
        let url = self.url(path);
        let req = if logical_method.eq_ignore_ascii_case("GET") {
            self.client.get(url)
        } else {
            self.client.post(url).body(body.unwrap_or_default())
        };
        let req = req.timeout(timeout.unwrap_or(self.rpc_timeout));
        let req = self.apply_headers(req, logical_method, access_token, extra_headers).await;

        let resp = req.send().await?;
        Ok(RawResponse { status: resp.status().as_u16(), body: resp.bytes().await? })
    }

    /// POST to an absolute URL with caller-supplied headers only. Used by
    /// uploads that target a different host than the RPC gateway.
    pub async fn post_url(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
    ) -> Result<UploadResponse> {
        let mut req = self.client.post(url).body(body);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(n, v)| (n.as_str().to_owned(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        Ok(UploadResponse { status, headers, body: resp.bytes().await? })
    }

    /// JSON endpoint variant. The wire request is GET or POST as asked.
    pub async fn json_call(
        &self,
        path: &str,
        logical_method: &str,
        body: Option<&serde_json::Value>,
        access_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let url = self.url(path);
        let mut req = if logical_method.eq_ignore_ascii_case("GET") {
            self.client.get(url)
        } else {
            self.client.post(url).json(body.unwrap_or(&serde_json::Value::Null))
        };
        req = req.timeout(timeout.unwrap_or(self.rpc_timeout));

        let stored = self.access_token.read().await;
        let token = access_token.or(stored.as_deref());
        for (name, value) in base_headers(&self.profile, token, logical_method) {
            // `.json(..)` already set the right content type.
            if name != "content-type" {
                req = req.header(name, value);
            }
        }
        drop(stored);

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("{path}: http {}", status.as_u16())));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
