// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane client for Cloudflare DNS and Tunnel APIs.
//!
//! This module provides typed access to the two remote resource families the
//! reconciler drives:
//!
//! - DNS records in a zone (list by name, upsert, delete)
//! - Tunnels in an account (list by name, create, fetch token, replace ingress)
//!
//! # Architecture
//!
//! The [`ControlPlane`] trait is the seam the reconciler depends on. The
//! production implementation, [`CloudflareClient`], issues one HTTP request per
//! call (two for an upsert) with a bounded timeout and classifies every failure
//! into a [`ControlPlaneError`]. It never retries.
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnelsync::cloudflare::{CloudflareClient, ControlPlane};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = CloudflareClient::new(
//!     "https://api.cloudflare.com/client/v4".parse()?,
//!     "api-token".to_string(),
//!     30,
//! )?;
//!
//! let tunnels = client.list_tunnels("account-id", "docker-host").await?;
//! # Ok(())
//! # }
//! ```

mod dns_ops;
mod request;
mod tunnel_ops;
pub mod types;

pub use types::{CnameRecord, DnsRecord, Tunnel, UpsertOutcome};

use crate::errors::ControlPlaneError;
use crate::route::IngressRule;
use async_trait::async_trait;
use request::ApiClient;
use url::Url;

/// Remote operations the reconciler needs from the control plane.
///
/// Every method is a single logical operation; implementations must not retry.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List DNS records named exactly `name` in `zone_id`.
    async fn list_dns_records(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, ControlPlaneError>;

    /// Create or update the CNAME record for `record.name`.
    async fn upsert_dns_record(
        &self,
        zone_id: &str,
        record: &CnameRecord,
    ) -> Result<UpsertOutcome, ControlPlaneError>;

    /// Delete a DNS record by id.
    async fn delete_dns_record(&self, zone_id: &str, record_id: &str)
        -> Result<(), ControlPlaneError>;

    /// List non-deleted tunnels named exactly `name`.
    async fn list_tunnels(
        &self,
        account_id: &str,
        name: &str,
    ) -> Result<Vec<Tunnel>, ControlPlaneError>;

    /// Create a tunnel named `name`.
    async fn create_tunnel(&self, account_id: &str, name: &str)
        -> Result<Tunnel, ControlPlaneError>;

    /// Fetch the bearer credential for `tunnel_id`.
    async fn get_tunnel_credential(
        &self,
        account_id: &str,
        tunnel_id: &str,
    ) -> Result<String, ControlPlaneError>;

    /// Replace the full ingress rule set of `tunnel_id`.
    async fn replace_ingress_config(
        &self,
        account_id: &str,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), ControlPlaneError>;
}

/// Cloudflare v4 API implementation of [`ControlPlane`].
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    api: ApiClient,
}

impl CloudflareClient {
    /// Create a client authenticating with a bearer API token.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.cloudflare.com/client/v4`
    /// * `api_token` - Token with DNS edit and tunnel edit permissions
    /// * `timeout_secs` - Upper bound for every request
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS backend
    /// initialisation failure).
    pub fn new(
        base_url: Url,
        api_token: String,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api: ApiClient::new(base_url, api_token, timeout_secs)?,
        })
    }
}

#[async_trait]
impl ControlPlane for CloudflareClient {
    async fn list_dns_records(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, ControlPlaneError> {
        dns_ops::list_dns_records(&self.api, zone_id, name).await
    }

    async fn upsert_dns_record(
        &self,
        zone_id: &str,
        record: &CnameRecord,
    ) -> Result<UpsertOutcome, ControlPlaneError> {
        dns_ops::upsert_dns_record(&self.api, zone_id, record).await
    }

    async fn delete_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<(), ControlPlaneError> {
        dns_ops::delete_dns_record(&self.api, zone_id, record_id).await
    }

    async fn list_tunnels(
        &self,
        account_id: &str,
        name: &str,
    ) -> Result<Vec<Tunnel>, ControlPlaneError> {
        tunnel_ops::list_tunnels(&self.api, account_id, name).await
    }

    async fn create_tunnel(
        &self,
        account_id: &str,
        name: &str,
    ) -> Result<Tunnel, ControlPlaneError> {
        tunnel_ops::create_tunnel(&self.api, account_id, name).await
    }

    async fn get_tunnel_credential(
        &self,
        account_id: &str,
        tunnel_id: &str,
    ) -> Result<String, ControlPlaneError> {
        tunnel_ops::get_tunnel_token(&self.api, account_id, tunnel_id).await
    }

    async fn replace_ingress_config(
        &self,
        account_id: &str,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), ControlPlaneError> {
        tunnel_ops::replace_ingress_config(&self.api, account_id, tunnel_id, rules).await
    }
}
