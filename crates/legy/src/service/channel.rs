// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel token issuance (used by timeline-style HTTP APIs).

use std::sync::Arc;

use crate::error::Result;
use crate::thrift::{Protocol, Struct, Value};

use super::model::{expect_struct, ChannelToken};
use super::{ServiceClient, CHANNEL_PATH};

pub struct ChannelService {
    client: Arc<ServiceClient>,
}

impl ChannelService {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    pub async fn approve_channel_and_issue_channel_token(
        &self,
        channel_id: &str,
    ) -> Result<ChannelToken> {
        let args = Struct::new().with(1, Value::string(channel_id));
        let payload = self
            .client
            .call(CHANNEL_PATH, Protocol::Compact, "approveChannelAndIssueChannelToken", args)
            .await?;
        Ok(ChannelToken::from_struct(&expect_struct(
            payload,
            "approveChannelAndIssueChannelToken",
        )?))
    }
}
