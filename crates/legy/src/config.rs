// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device profiles and client configuration.
//!
//! The device kind picked at construction decides which login paths are
//! legal (token v3, primary device) and what the `x-line-application`
//! header looks like.

use std::time::Duration;

use crate::error::{Error, Result};

/// Device kinds the wire protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    DesktopWin,
    DesktopMac,
    ChromeOs,
    Android,
    Ios,
    IosIpad,
    WatchOs,
    WearOs,
}

impl DeviceKind {
    /// The wire name, as it appears in `x-line-application`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DesktopWin => "DESKTOPWIN",
            Self::DesktopMac => "DESKTOPMAC",
            Self::ChromeOs => "CHROMEOS",
            Self::Android => "ANDROID",
            Self::Ios => "IOS",
            Self::IosIpad => "IOSIPAD",
            Self::WatchOs => "WATCHOS",
            Self::WearOs => "WEAROS",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "DESKTOPWIN" => Ok(Self::DesktopWin),
            "DESKTOPMAC" => Ok(Self::DesktopMac),
            "CHROMEOS" => Ok(Self::ChromeOs),
            "ANDROID" => Ok(Self::Android),
            "IOS" => Ok(Self::Ios),
            "IOSIPAD" => Ok(Self::IosIpad),
            "WATCHOS" => Ok(Self::WatchOs),
            "WEAROS" => Ok(Self::WearOs),
            other => Err(Error::Config(format!("unsupported device: {other}"))),
        }
    }

    /// App version shipped for this device kind.
    pub fn default_version(&self) -> &'static str {
        match self {
            Self::DesktopWin => "9.2.0.3403",
            Self::DesktopMac => "9.2.0.3402",
            Self::ChromeOs => "3.0.3",
            Self::Android => "13.4.1",
            Self::Ios | Self::IosIpad | Self::WatchOs => "15.19.0",
            Self::WearOs => "13.4.1",
        }
    }

    /// Whether login flows may use the v3 token scheme (loginV2 /
    /// qrCodeLoginV2, access+refresh token pairs).
    pub fn supports_token_v3(&self) -> bool {
        matches!(self, Self::DesktopWin | Self::DesktopMac | Self::Ios | Self::Android)
    }

    /// Whether this kind represents the user's physical phone. Refreshing
    /// a primary device's token would invalidate the real phone session.
    pub fn is_primary_device(&self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

/// Immutable device identity chosen at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub kind: DeviceKind,
    pub app_version: String,
    pub system_name: String,
    pub system_version: String,
}

impl DeviceProfile {
    /// Build the profile for a device kind, optionally pinning the app
    /// version.
    pub fn new(kind: DeviceKind, version: Option<&str>) -> Self {
        let (system_name, system_version) = match kind {
            DeviceKind::DesktopWin => ("WINDOWS", "10.0.0-NT-x64"),
            DeviceKind::DesktopMac => ("MAC", "12.1.4"),
            DeviceKind::ChromeOs => ("Chrome_OS", "1"),
            DeviceKind::Android => ("Android OS", "12.1.4"),
            DeviceKind::Ios | DeviceKind::IosIpad => ("iOS", "12.1.4"),
            DeviceKind::WatchOs => ("Watch OS", "12.1.4"),
            DeviceKind::WearOs => ("Wear OS", "12.1.4"),
        };
        Self {
            kind,
            app_version: version.unwrap_or(kind.default_version()).to_owned(),
            system_name: system_name.to_owned(),
            system_version: system_version.to_owned(),
        }
    }

    /// The tab-joined `x-line-application` header value.
    pub fn line_application(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.kind.as_str(),
            self.app_version,
            self.system_name,
            self.system_version
        )
    }

    /// The `User-Agent` header value.
    pub fn user_agent(&self) -> String {
        format!("Line/{}", self.app_version)
    }

    pub fn supports_token_v3(&self) -> bool {
        self.kind.supports_token_v3()
    }

    pub fn is_primary_device(&self) -> bool {
        self.kind.is_primary_device()
    }
}

/// Client configuration: endpoints and timing knobs.
///
/// Defaults are the production values; specs override hosts and deadlines.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the RPC gateway.
    pub base_url: String,
    /// Base URL of the object-storage host (uploads).
    pub obs_base_url: String,
    /// Display name this session registers under (shown on the account's
    /// device list).
    pub device_name: String,
    /// Hostname of the push gateway (raw HTTP/2 dial).
    pub push_host: String,
    /// Port of the push gateway.
    pub push_port: u16,
    /// Ordinary RPC timeout in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Per-request long-poll timeout in milliseconds.
    pub long_poll_ms: u64,
    /// Outer deadline for QR/PIN verification in milliseconds.
    pub login_deadline_ms: u64,
    /// Keep-alive threshold for the push stream in milliseconds.
    pub keepalive_ms: u64,
    /// Idle window after which the push stream is declared dead.
    pub idle_limit_ms: u64,
    /// Pause before redialing a failed push stream.
    pub reconnect_delay_ms: u64,
    /// Event queue capacity between fetch workers and the dispatcher.
    pub event_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://legy.line-apps.com".to_owned(),
            obs_base_url: "https://obs.line-apps.com".to_owned(),
            device_name: "legy".to_owned(),
            push_host: "gd2.line.naver.jp".to_owned(),
            push_port: 443,
            rpc_timeout_ms: 30_000,
            long_poll_ms: 20_000,
            login_deadline_ms: 300_000,
            keepalive_ms: 30_000,
            idle_limit_ms: 120_000,
            reconnect_delay_ms: 3_000,
            event_queue_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_ms)
    }

    pub fn login_deadline(&self) -> Duration {
        Duration::from_millis(self.login_deadline_ms)
    }

    pub fn keepalive_threshold(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn idle_limit(&self) -> Duration {
        Duration::from_millis(self.idle_limit_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
