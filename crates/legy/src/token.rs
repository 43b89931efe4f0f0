// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle: on-demand refresh with the primary-device guard.

use std::sync::Arc;

use crate::config::DeviceProfile;
use crate::error::{Error, Result};
use crate::service::auth::AuthService;
use crate::storage::{self, keys, Mutation};
use crate::transport::HttpTransport;

pub struct TokenLifecycle {
    profile: DeviceProfile,
    session: storage::Session,
    auth: Arc<AuthService>,
    transport: Arc<HttpTransport>,
}

impl TokenLifecycle {
    pub fn new(
        profile: DeviceProfile,
        session: storage::Session,
        auth: Arc<AuthService>,
        transport: Arc<HttpTransport>,
    ) -> Self {
        Self { profile, session, auth, transport }
    }

    /// Rotate the access token using the stored refresh token.
    ///
    /// On a primary device this is a no-op returning the current token:
    /// refreshing would invalidate the physical phone's session, so no
    /// network connection is opened and the store stays byte-identical.
    /// On failure the stored credentials are untouched.
    pub async fn refresh_access_token(&self) -> Result<String> {
        if self.profile.is_primary_device() {
            return self.session.auth_token().ok_or_else(|| {
                Error::Auth("refresh on a primary device without a stored token".to_owned())
            });
        }

        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| Error::Config("no refresh token stored".to_owned()))?;

        let result = self.auth.refresh(&refresh_token).await?;
        let access = result
            .access_token
            .clone()
            .ok_or_else(|| Error::Auth("refresh reply carried no access token".to_owned()))?;

        let mut mutations: Vec<Mutation> =
            vec![(keys::AUTH_TOKEN.to_owned(), Some(access.clone()))];
        if let Some(new_refresh) = &result.refresh_token {
            mutations.push((keys::REFRESH_TOKEN.to_owned(), Some(new_refresh.clone())));
        }
        if let Some(expiry) = result.expiry_at() {
            mutations.push((keys::TOKEN_EXPIRY_AT.to_owned(), Some(expiry.to_string())));
        }
        self.session.store().set_many(&mutations)?;
        self.transport.set_access_token(Some(access.clone())).await;

        tracing::info!(
            rotated_refresh = result.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(access)
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
