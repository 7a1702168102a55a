// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory recording fake of the control plane shared by unit tests.

use crate::cloudflare::{CnameRecord, ControlPlane, DnsRecord, Tunnel, UpsertOutcome};
use crate::errors::ControlPlaneError;
use crate::route::IngressRule;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One recorded control plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListDnsRecords(String),
    UpsertDnsRecord(String),
    DeleteDnsRecord(String),
    ListTunnels(String),
    CreateTunnel(String),
    GetTunnelCredential(String),
    ReplaceIngress(Vec<IngressRule>),
}

#[derive(Debug, Default)]
struct FakeState {
    records: Vec<DnsRecord>,
    tunnels: Vec<Tunnel>,
    next_id: usize,
    calls: Vec<Call>,
    upsert_failures: HashMap<String, ControlPlaneError>,
    delete_failures: HashMap<String, ControlPlaneError>,
    list_tunnels_failure: Option<ControlPlaneError>,
    create_tunnel_failure: Option<ControlPlaneError>,
    credential_failure: Option<ControlPlaneError>,
    ingress_failure: Option<ControlPlaneError>,
    ingress: Option<Vec<IngressRule>>,
}

/// Control plane that keeps records and tunnels in memory and records every call.
#[derive(Debug, Default)]
pub(crate) struct FakeControlPlane {
    state: Mutex<FakeState>,
}

pub(crate) fn transport_error(operation: &str) -> ControlPlaneError {
    ControlPlaneError::Transport {
        operation: operation.to_string(),
        reason: "connection reset by peer".to_string(),
    }
}

pub(crate) fn auth_error(operation: &str) -> ControlPlaneError {
    ControlPlaneError::Auth {
        operation: operation.to_string(),
        status_code: 403,
        reason: "10000: Authentication error".to_string(),
    }
}

pub(crate) fn rejected_error(operation: &str) -> ControlPlaneError {
    ControlPlaneError::Rejected {
        operation: operation.to_string(),
        status_code: 400,
        reason: "1001: validation failed".to_string(),
    }
}

impl FakeControlPlane {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tunnel(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().tunnels.push(Tunnel {
            id: id.to_string(),
            name: name.to_string(),
            deleted_at: None,
        });
        self
    }

    pub(crate) fn with_record(
        self,
        id: &str,
        name: &str,
        record_type: &str,
        content: &str,
    ) -> Self {
        self.state.lock().unwrap().records.push(DnsRecord {
            id: id.to_string(),
            name: name.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
            proxied: true,
        });
        self
    }

    pub(crate) fn fail_upsert(&self, hostname: &str, error: ControlPlaneError) {
        self.state
            .lock()
            .unwrap()
            .upsert_failures
            .insert(hostname.to_string(), error);
    }

    pub(crate) fn fail_delete(&self, hostname: &str, error: ControlPlaneError) {
        self.state
            .lock()
            .unwrap()
            .delete_failures
            .insert(hostname.to_string(), error);
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.upsert_failures.clear();
        state.delete_failures.clear();
        state.list_tunnels_failure = None;
        state.create_tunnel_failure = None;
        state.credential_failure = None;
        state.ingress_failure = None;
    }

    pub(crate) fn fail_list_tunnels(&self, error: ControlPlaneError) {
        self.state.lock().unwrap().list_tunnels_failure = Some(error);
    }

    pub(crate) fn fail_create_tunnel(&self, error: ControlPlaneError) {
        self.state.lock().unwrap().create_tunnel_failure = Some(error);
    }

    pub(crate) fn fail_credential(&self, error: ControlPlaneError) {
        self.state.lock().unwrap().credential_failure = Some(error);
    }

    pub(crate) fn fail_ingress(&self, error: ControlPlaneError) {
        self.state.lock().unwrap().ingress_failure = Some(error);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Hostnames of every delete call, in call order.
    pub(crate) fn deleted_hostnames(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteDnsRecord(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn upserted_hostnames(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpsertDnsRecord(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn create_tunnel_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CreateTunnel(_)))
            .count()
    }

    pub(crate) fn ingress_pushes(&self) -> Vec<Vec<IngressRule>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ReplaceIngress(rules) => Some(rules),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn ingress(&self) -> Option<Vec<IngressRule>> {
        self.state.lock().unwrap().ingress.clone()
    }

    pub(crate) fn record_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_dns_records(
        &self,
        _zone_id: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListDnsRecords(name.to_string()));
        Ok(state
            .records
            .iter()
            .filter(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    async fn upsert_dns_record(
        &self,
        _zone_id: &str,
        record: &CnameRecord,
    ) -> Result<UpsertOutcome, ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpsertDnsRecord(record.name.clone()));
        if let Some(error) = state.upsert_failures.get(&record.name) {
            return Err(error.clone());
        }

        if let Some(existing) = state
            .records
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(&record.name))
        {
            if record.matches(existing) {
                return Ok(UpsertOutcome::Unchanged);
            }
            existing.record_type = "CNAME".to_string();
            existing.content = record.content.clone();
            existing.proxied = record.proxied;
            return Ok(UpsertOutcome::Updated);
        }

        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        state.records.push(DnsRecord {
            id,
            name: record.name.clone(),
            record_type: "CNAME".to_string(),
            content: record.content.clone(),
            proxied: record.proxied,
        });
        Ok(UpsertOutcome::Created)
    }

    async fn delete_dns_record(
        &self,
        _zone_id: &str,
        record_id: &str,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .records
            .iter()
            .find(|r| r.id == record_id)
            .map(|r| r.name.clone())
            .unwrap_or_default();
        state.calls.push(Call::DeleteDnsRecord(name.clone()));
        if let Some(error) = state.delete_failures.get(&name) {
            return Err(error.clone());
        }
        state.records.retain(|r| r.id != record_id);
        Ok(())
    }

    async fn list_tunnels(
        &self,
        _account_id: &str,
        name: &str,
    ) -> Result<Vec<Tunnel>, ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListTunnels(name.to_string()));
        if let Some(error) = &state.list_tunnels_failure {
            return Err(error.clone());
        }
        Ok(state
            .tunnels
            .iter()
            .filter(|t| t.name == name)
            .cloned()
            .collect())
    }

    async fn create_tunnel(
        &self,
        _account_id: &str,
        name: &str,
    ) -> Result<Tunnel, ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateTunnel(name.to_string()));
        if let Some(error) = &state.create_tunnel_failure {
            return Err(error.clone());
        }
        let tunnel = Tunnel {
            id: format!("tunnel-{}", state.tunnels.len() + 1),
            name: name.to_string(),
            deleted_at: None,
        };
        state.tunnels.push(tunnel.clone());
        Ok(tunnel)
    }

    async fn get_tunnel_credential(
        &self,
        _account_id: &str,
        tunnel_id: &str,
    ) -> Result<String, ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::GetTunnelCredential(tunnel_id.to_string()));
        if let Some(error) = &state.credential_failure {
            return Err(error.clone());
        }
        Ok(format!("token-for-{tunnel_id}"))
    }

    async fn replace_ingress_config(
        &self,
        _account_id: &str,
        _tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReplaceIngress(rules.to_vec()));
        if let Some(error) = &state.ingress_failure {
            return Err(error.clone());
        }
        state.ingress = Some(rules.to_vec());
        Ok(())
    }
}
