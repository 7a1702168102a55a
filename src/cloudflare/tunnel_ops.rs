// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tunnel operations against the Cloudflare account API.

use super::request::ApiClient;
use super::types::{CreateTunnelRequest, IngressConfig, Tunnel, TunnelConfigurationRequest};
use crate::constants::TUNNEL_CONFIG_SRC;
use crate::errors::ControlPlaneError;
use crate::route::IngressRule;
use reqwest::Method;
use tracing::info;

/// List non-deleted tunnels named exactly `name`.
pub(crate) async fn list_tunnels(
    api: &ApiClient,
    account_id: &str,
    name: &str,
) -> Result<Vec<Tunnel>, ControlPlaneError> {
    let url = api.url(
        &["accounts", account_id, "cfd_tunnel"],
        &[("name", name), ("is_deleted", "false")],
    )?;
    api.request::<(), _>("list tunnels", Method::GET, url, None)
        .await
}

/// Create a remotely-managed tunnel.
pub(crate) async fn create_tunnel(
    api: &ApiClient,
    account_id: &str,
    name: &str,
) -> Result<Tunnel, ControlPlaneError> {
    let url = api.url(&["accounts", account_id, "cfd_tunnel"], &[])?;
    let body = CreateTunnelRequest {
        name,
        config_src: TUNNEL_CONFIG_SRC,
    };
    let tunnel: Tunnel = api
        .request("create tunnel", Method::POST, url, Some(&body))
        .await?;
    info!(tunnel_id = %tunnel.id, tunnel_name = %tunnel.name, "Created tunnel");
    Ok(tunnel)
}

/// Fetch the bearer token the tunnel agent runs with.
pub(crate) async fn get_tunnel_token(
    api: &ApiClient,
    account_id: &str,
    tunnel_id: &str,
) -> Result<String, ControlPlaneError> {
    let url = api.url(&["accounts", account_id, "cfd_tunnel", tunnel_id, "token"], &[])?;
    api.request::<(), _>("get tunnel token", Method::GET, url, None)
        .await
}

/// Replace the tunnel's ingress rule set in one call.
pub(crate) async fn replace_ingress_config(
    api: &ApiClient,
    account_id: &str,
    tunnel_id: &str,
    rules: &[IngressRule],
) -> Result<(), ControlPlaneError> {
    let url = api.url(
        &["accounts", account_id, "cfd_tunnel", tunnel_id, "configurations"],
        &[],
    )?;
    let body = TunnelConfigurationRequest {
        config: IngressConfig { ingress: rules },
    };
    api.request_ack("update tunnel configuration", Method::PUT, url, Some(&body))
        .await?;
    info!(
        tunnel_id = %tunnel_id,
        rules = rules.len(),
        "Replaced tunnel ingress configuration"
    );
    Ok(())
}
