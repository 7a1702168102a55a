// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS record operations against the Cloudflare zone API.

use super::request::ApiClient;
use super::types::{CnameRecord, DnsRecord, DnsRecordRequest, UpsertOutcome};
use crate::constants::{AUTOMATIC_TTL, RECORD_TYPE_CNAME};
use crate::errors::ControlPlaneError;
use reqwest::Method;
use tracing::{debug, info, warn};

/// List records in `zone_id` whose name is exactly `name`.
pub(crate) async fn list_dns_records(
    api: &ApiClient,
    zone_id: &str,
    name: &str,
) -> Result<Vec<DnsRecord>, ControlPlaneError> {
    let url = api.url(&["zones", zone_id, "dns_records"], &[("name", name)])?;
    api.request::<(), _>("list dns records", Method::GET, url, None)
        .await
}

/// Create or update the CNAME record for `record.name`.
///
/// Looks the hostname up first and updates the first record returned; a
/// record that already matches is left untouched. A record of another type is
/// replaced with a warning.
pub(crate) async fn upsert_dns_record(
    api: &ApiClient,
    zone_id: &str,
    record: &CnameRecord,
) -> Result<UpsertOutcome, ControlPlaneError> {
    let existing = list_dns_records(api, zone_id, &record.name).await?;

    let body = DnsRecordRequest {
        record_type: RECORD_TYPE_CNAME,
        name: &record.name,
        content: &record.content,
        proxied: record.proxied,
        ttl: AUTOMATIC_TTL,
    };

    match existing.first() {
        Some(current) if record.matches(current) => {
            debug!(
                hostname = %record.name,
                record_id = %current.id,
                "DNS record already up to date"
            );
            Ok(UpsertOutcome::Unchanged)
        }
        Some(current) => {
            if !current.record_type.eq_ignore_ascii_case(RECORD_TYPE_CNAME) {
                warn!(
                    hostname = %record.name,
                    record_id = %current.id,
                    record_type = %current.record_type,
                    content = %current.content,
                    "Replacing DNS record that is not a CNAME with the tunnel CNAME"
                );
            }
            let url = api.url(&["zones", zone_id, "dns_records", current.id.as_str()], &[])?;
            api.request_ack("update dns record", Method::PUT, url, Some(&body))
                .await?;
            info!(
                hostname = %record.name,
                record_id = %current.id,
                content = %record.content,
                "Updated DNS record"
            );
            Ok(UpsertOutcome::Updated)
        }
        None => {
            let url = api.url(&["zones", zone_id, "dns_records"], &[])?;
            let created: DnsRecord = api
                .request("create dns record", Method::POST, url, Some(&body))
                .await?;
            info!(
                hostname = %record.name,
                record_id = %created.id,
                content = %record.content,
                "Created DNS record"
            );
            Ok(UpsertOutcome::Created)
        }
    }
}

/// Delete a record by id.
pub(crate) async fn delete_dns_record(
    api: &ApiClient,
    zone_id: &str,
    record_id: &str,
) -> Result<(), ControlPlaneError> {
    let url = api.url(&["zones", zone_id, "dns_records", record_id], &[])?;
    api.request_ack::<()>("delete dns record", Method::DELETE, url, None)
        .await?;
    info!(record_id = %record_id, "Deleted DNS record");
    Ok(())
}
