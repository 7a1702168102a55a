// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration.
//!
//! The binary fills a [`Config`] from command-line flags and environment
//! variables; [`Config::validate`] rejects unusable values before any cycle
//! touches the control plane.

use crate::errors::ConfigError;
use crate::reconciler::ReconcilerSettings;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Validated settings for one tunnelsync process.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Bearer token for the control plane API
    pub api_token: String,
    /// Account owning the tunnel
    pub account_id: String,
    /// Zone holding the routed hostnames
    pub zone_id: String,
    /// Name of the single managed tunnel
    pub tunnel_name: String,
    /// Control plane API root
    pub api_base_url: Url,
    /// Suffix of tunnel DNS targets
    pub tunnel_domain: String,
    /// Snapshot written by the discovery collaborator
    pub snapshot_path: PathBuf,
    /// Persisted state of the last successful cycle
    pub state_path: PathBuf,
    /// Tunnel credential read by the data-plane agent
    pub credential_path: PathBuf,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Whether DNS records are proxied through the edge
    pub proxied: bool,
}

// The token never reaches logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("zone_id", &self.zone_id)
            .field("tunnel_name", &self.tunnel_name)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("tunnel_domain", &self.tunnel_domain)
            .field("snapshot_path", &self.snapshot_path)
            .field("state_path", &self.state_path)
            .field("credential_path", &self.credential_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("proxied", &self.proxied)
            .finish()
    }
}

impl Config {
    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("api-token", &self.api_token),
            ("account-id", &self.account_id),
            ("zone-id", &self.zone_id),
            ("tunnel-name", &self.tunnel_name),
            ("tunnel-domain", &self.tunnel_domain),
        ];
        for (setting, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(setting));
            }
        }

        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                setting: "api-base-url",
                reason: format!("unsupported scheme '{}'", self.api_base_url.scheme()),
            });
        }
        if self.api_base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                setting: "api-base-url",
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                setting: "request-timeout-secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.snapshot_path == self.state_path {
            return Err(ConfigError::Invalid {
                setting: "state-path",
                reason: "must differ from snapshot-path".to_string(),
            });
        }

        Ok(())
    }

    /// Settings the reconciler needs, normalized.
    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            account_id: self.account_id.trim().to_string(),
            zone_id: self.zone_id.trim().to_string(),
            tunnel_name: self.tunnel_name.trim().to_string(),
            tunnel_domain: self
                .tunnel_domain
                .trim()
                .trim_matches('.')
                .to_ascii_lowercase(),
            proxied: self.proxied,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
