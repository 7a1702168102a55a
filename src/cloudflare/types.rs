// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed request and response payloads for the Cloudflare v4 API.

use crate::route::IngressRule;
use serde::{Deserialize, Serialize};

/// Response envelope wrapping every API result.
///
/// `success` must be checked in addition to the HTTP status: the API can answer
/// 200 and still report a logical failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// Error or informational message carried in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Join envelope messages into a single human-readable reason.
#[must_use]
pub fn join_messages(messages: &[ApiMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.code, m.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// DNS record as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

/// Desired CNAME record for a routed hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnameRecord {
    /// Fully-qualified hostname
    pub name: String,
    /// `<tunnel-id>.<tunnel-domain>`
    pub content: String,
    /// Whether traffic is proxied through the edge
    pub proxied: bool,
}

impl CnameRecord {
    /// Returns true if `existing` already carries exactly this record.
    #[must_use]
    pub fn matches(&self, existing: &DnsRecord) -> bool {
        existing.record_type.eq_ignore_ascii_case(crate::constants::RECORD_TYPE_CNAME)
            && existing.content.eq_ignore_ascii_case(&self.content)
            && existing.proxied == self.proxied
    }
}

/// Body of DNS record create and update calls.
#[derive(Debug, Serialize)]
pub struct DnsRecordRequest<'a> {
    #[serde(rename = "type")]
    pub record_type: &'a str,
    pub name: &'a str,
    pub content: &'a str,
    pub proxied: bool,
    pub ttl: u32,
}

/// What an upsert did to the remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Tunnel as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

/// Body of the tunnel create call.
#[derive(Debug, Serialize)]
pub struct CreateTunnelRequest<'a> {
    pub name: &'a str,
    pub config_src: &'a str,
}

/// Body of the ingress configuration replace call.
#[derive(Debug, Serialize)]
pub struct TunnelConfigurationRequest<'a> {
    pub config: IngressConfig<'a>,
}

#[derive(Debug, Serialize)]
pub struct IngressConfig<'a> {
    pub ingress: &'a [IngressRule],
}
