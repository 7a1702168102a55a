// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of the desired route snapshot against the control plane.
//!
//! # Cycle
//!
//! One call to [`Reconciler::run_cycle`] drives the tunnel and DNS records to
//! the current snapshot:
//!
//! 1. **Validating** - fetch and validate the snapshot; nothing remote is touched on failure
//! 2. **ResolvingIdentity** - find or create the tunnel and hand its credential to the agent
//! 3. **ApplyingRoutes** - upsert the CNAME record of every route, in snapshot order
//! 4. **PushingIngress** - replace the tunnel's ingress rule set in one call
//! 5. **Cleaning** - delete DNS records of hostnames that left the snapshot
//! 6. **Committing** - persist the snapshot as the new state
//!
//! # Failure Handling
//!
//! - Per-route upsert and per-hostname delete failures are logged and counted;
//!   the cycle continues.
//! - Any failed upsert blocks the commit, so the next cycle diffs against the
//!   last state that was fully applied.
//! - Failed deletions do not block the commit. Their hostnames are carried in
//!   the committed state as pending cleanup and retried on later cycles.
//! - Authentication failures abort the cycle wherever they occur. Identity
//!   resolution and ingress push failures of any kind abort the cycle.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunnelsync::cloudflare::CloudflareClient;
//! use tunnelsync::reconciler::{Reconciler, ReconcilerSettings};
//! use tunnelsync::route::FileSnapshotSource;
//! use tunnelsync::state::FileStateStore;
//! use tunnelsync::tunnel::FileCredentialStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = CloudflareClient::new(
//!     "https://api.cloudflare.com/client/v4".parse()?,
//!     "api-token".to_string(),
//!     30,
//! )?;
//! let reconciler = Reconciler::new(
//!     Arc::new(client),
//!     Arc::new(FileStateStore::new("/var/lib/tunnelsync/previous.json")),
//!     Arc::new(FileCredentialStore::new("/etc/cloudflared/token")),
//!     ReconcilerSettings {
//!         account_id: "account-id".to_string(),
//!         zone_id: "zone-id".to_string(),
//!         tunnel_name: "docker-host".to_string(),
//!         tunnel_domain: "cfargotunnel.com".to_string(),
//!         proxied: true,
//!     },
//! );
//!
//! let outcome = reconciler
//!     .run_cycle(&FileSnapshotSource::new("/var/lib/tunnelsync/current.json"))
//!     .await;
//! std::process::exit(i32::from(outcome.exit_code()));
//! # }
//! ```

pub mod types;

pub use types::{CycleOutcome, CycleReport, Phase, ReconcilerSettings};

use crate::cloudflare::{CnameRecord, ControlPlane, UpsertOutcome};
use crate::constants::RECORD_TYPE_CNAME;
use crate::diff::cleanup_candidates;
use crate::errors::{ControlPlaneError, CycleError};
use crate::metrics;
use crate::route::{build_ingress_rules, Snapshot, SnapshotSource};
use crate::state::{PersistedState, StateStore};
use crate::tunnel::{resolve_tunnel, CredentialStore, TunnelIdentity};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

type PhaseResult<T> = Result<T, (Phase, CycleError)>;

fn at<E: Into<CycleError>>(phase: Phase) -> impl FnOnce(E) -> (Phase, CycleError) {
    move |e| (phase, e.into())
}

/// Drives one tunnel and its DNS records to the desired snapshot.
pub struct Reconciler {
    control_plane: Arc<dyn ControlPlane>,
    state_store: Arc<dyn StateStore>,
    credentials: Arc<dyn CredentialStore>,
    settings: ReconcilerSettings,
    /// Serializes cycles: a trigger arriving mid-cycle waits for it to finish
    cycle_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        state_store: Arc<dyn StateStore>,
        credentials: Arc<dyn CredentialStore>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            control_plane,
            state_store,
            credentials,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one reconciliation cycle to completion.
    ///
    /// Never panics and never returns early without an outcome; fatal errors are
    /// reported through [`CycleOutcome::Fatal`].
    pub async fn run_cycle(&self, source: &dyn SnapshotSource) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;
        let start_time = Instant::now();
        let mut report = CycleReport::default();

        info!(tunnel_name = %self.settings.tunnel_name, "Starting reconciliation cycle");

        let outcome = match self.converge(source, &mut report).await {
            Ok(()) if report.is_clean() => CycleOutcome::Success(report),
            Ok(()) => CycleOutcome::PartialFailure(report),
            Err((phase, error)) => {
                error!(
                    phase = %phase,
                    kind = %error.kind(),
                    error = %error,
                    "Reconciliation cycle failed"
                );
                metrics::record_error(&error.kind().to_string());
                debug!(phase = %Phase::Failed, "Cycle stopped");
                CycleOutcome::Fatal {
                    phase,
                    error,
                    report,
                }
            }
        };

        let elapsed = start_time.elapsed();
        metrics::record_cycle(outcome.label(), elapsed);

        let report = outcome.report();
        info!(
            outcome = outcome.label(),
            routes_attempted = report.routes_attempted,
            routes_succeeded = report.routes_succeeded,
            routes_failed = report.routes_failed,
            records_created = report.records_created,
            records_updated = report.records_updated,
            deletions_succeeded = report.deletions_succeeded,
            deletions_failed = report.deletions_failed,
            pending_cleanup = report.pending_cleanup,
            state_committed = report.state_committed,
            elapsed = ?elapsed,
            "Reconciliation cycle finished"
        );

        outcome
    }

    async fn converge(
        &self,
        source: &dyn SnapshotSource,
        report: &mut CycleReport,
    ) -> PhaseResult<()> {
        debug!(phase = %Phase::Validating, "Entering phase");
        let raw = source.fetch().await.map_err(at(Phase::Validating))?;
        let snapshot = Snapshot::validate(raw).map_err(at(Phase::Validating))?;
        let previous = self.state_store.load().await;

        debug!(phase = %Phase::ResolvingIdentity, "Entering phase");
        let identity = resolve_tunnel(
            self.control_plane.as_ref(),
            self.credentials.as_ref(),
            &self.settings.account_id,
            &self.settings.tunnel_name,
        )
        .await
        .map_err(|e| (Phase::ResolvingIdentity, e))?;
        report.tunnel_created = identity.created;
        report.credential_written = identity.credential_written;

        debug!(phase = %Phase::ApplyingRoutes, "Entering phase");
        self.apply_routes(&snapshot, &identity, report)
            .await
            .map_err(at(Phase::ApplyingRoutes))?;

        debug!(phase = %Phase::PushingIngress, "Entering phase");
        let rules = build_ingress_rules(&snapshot);
        self.control_plane
            .replace_ingress_config(&self.settings.account_id, &identity.id, &rules)
            .await
            .map_err(at(Phase::PushingIngress))?;

        debug!(phase = %Phase::Cleaning, "Entering phase");
        let (previous_routes, previous_pending) = match &previous {
            Some(state) => (Some(state.routes.as_slice()), state.pending_cleanup.as_slice()),
            None => (None, &[][..]),
        };
        let candidates = cleanup_candidates(previous_routes, previous_pending, &snapshot);
        let pending = self
            .clean_up(&candidates, report)
            .await
            .map_err(at(Phase::Cleaning))?;
        report.pending_cleanup = pending.len();

        debug!(phase = %Phase::Committing, "Entering phase");
        if report.routes_failed > 0 {
            warn!(
                routes_failed = report.routes_failed,
                "Not committing state: some routes failed to apply"
            );
            return Ok(());
        }

        let routes_len = snapshot.len();
        let pending_len = pending.len();
        self.state_store
            .save(&PersistedState::new(snapshot.into_routes(), pending))
            .await
            .map_err(at(Phase::Committing))?;
        report.state_committed = true;
        metrics::record_committed_state(routes_len, pending_len);

        debug!(phase = %Phase::Idle, "Cycle committed");
        Ok(())
    }

    /// Upsert the CNAME record of every route.
    ///
    /// Only authentication failures are returned; all others are counted.
    async fn apply_routes(
        &self,
        snapshot: &Snapshot,
        identity: &TunnelIdentity,
        report: &mut CycleReport,
    ) -> Result<(), ControlPlaneError> {
        let content = identity.dns_target(&self.settings.tunnel_domain);

        for route in snapshot.routes() {
            report.routes_attempted += 1;
            let record = CnameRecord {
                name: route.hostname.clone(),
                content: content.clone(),
                proxied: self.settings.proxied,
            };

            match self
                .control_plane
                .upsert_dns_record(&self.settings.zone_id, &record)
                .await
            {
                Ok(outcome) => {
                    report.routes_succeeded += 1;
                    let result = match outcome {
                        UpsertOutcome::Created => {
                            report.records_created += 1;
                            "created"
                        }
                        UpsertOutcome::Updated => {
                            report.records_updated += 1;
                            "updated"
                        }
                        UpsertOutcome::Unchanged => {
                            report.records_unchanged += 1;
                            "unchanged"
                        }
                    };
                    metrics::record_dns_operation("upsert", result);
                    debug!(hostname = %route.hostname, result, "Route applied");
                }
                Err(e) if e.aborts_cycle() => {
                    report.routes_failed += 1;
                    metrics::record_dns_operation("upsert", "error");
                    return Err(e);
                }
                Err(e) => {
                    report.routes_failed += 1;
                    metrics::record_dns_operation("upsert", "error");
                    metrics::record_error(&e.kind().to_string());
                    warn!(
                        hostname = %route.hostname,
                        kind = %e.kind(),
                        error = %e,
                        "Failed to apply route, continuing"
                    );
                }
            }
        }

        Ok(())
    }

    /// Delete the DNS records of every candidate hostname.
    ///
    /// Returns the hostnames that could not be cleaned up. Only authentication
    /// failures are returned as errors.
    async fn clean_up(
        &self,
        hostnames: &[String],
        report: &mut CycleReport,
    ) -> Result<Vec<String>, ControlPlaneError> {
        let mut pending = Vec::new();

        for hostname in hostnames {
            report.deletions_attempted += 1;
            match self.delete_hostname(hostname, report).await {
                Ok(()) => {
                    report.deletions_succeeded += 1;
                }
                Err(e) if e.aborts_cycle() => {
                    report.deletions_failed += 1;
                    metrics::record_dns_operation("delete", "error");
                    return Err(e);
                }
                Err(e) => {
                    report.deletions_failed += 1;
                    metrics::record_dns_operation("delete", "error");
                    metrics::record_error(&e.kind().to_string());
                    warn!(
                        hostname = %hostname,
                        kind = %e.kind(),
                        error = %e,
                        "Failed to delete stale DNS record, will retry next cycle"
                    );
                    pending.push(hostname.clone());
                }
            }
        }

        Ok(pending)
    }

    /// Delete the tunnel CNAME records of a single hostname.
    ///
    /// Records that do not point at a tunnel are left alone. A hostname with no
    /// records is already clean.
    async fn delete_hostname(
        &self,
        hostname: &str,
        report: &mut CycleReport,
    ) -> Result<(), ControlPlaneError> {
        let suffix = format!(".{}", self.settings.tunnel_domain.to_ascii_lowercase());
        let records = self
            .control_plane
            .list_dns_records(&self.settings.zone_id, hostname)
            .await?;

        if records.is_empty() {
            debug!(hostname = %hostname, "No DNS record left to delete");
        }

        for record in records {
            let owned = record.record_type.eq_ignore_ascii_case(RECORD_TYPE_CNAME)
                && record.content.to_ascii_lowercase().ends_with(&suffix);
            if !owned {
                report.records_skipped += 1;
                metrics::record_dns_operation("delete", "skipped");
                warn!(
                    hostname = %hostname,
                    record_id = %record.id,
                    record_type = %record.record_type,
                    content = %record.content,
                    "Leaving DNS record that does not point at a tunnel"
                );
                continue;
            }

            self.control_plane
                .delete_dns_record(&self.settings.zone_id, &record.id)
                .await?;
            metrics::record_dns_operation("delete", "deleted");
            info!(hostname = %hostname, record_id = %record.id, "Removed stale route");
        }

        Ok(())
    }
}
