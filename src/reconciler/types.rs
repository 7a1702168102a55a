// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cycle phases, counters and outcomes.

use crate::constants::{EXIT_FATAL, EXIT_PARTIAL_FAILURE};
use crate::errors::CycleError;
use std::fmt;

/// States a reconciliation cycle moves through.
///
/// A cycle starts in `Idle`, walks the phases in declaration order and returns
/// to `Idle` after `Committing`, or stops in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    ResolvingIdentity,
    ApplyingRoutes,
    PushingIngress,
    Cleaning,
    Committing,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity and connection settings for the single managed tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Account owning the tunnel
    pub account_id: String,
    /// Zone holding the routed hostnames
    pub zone_id: String,
    /// Name the tunnel is looked up and created by
    pub tunnel_name: String,
    /// Suffix of the tunnel's DNS target (`<id>.<suffix>`)
    pub tunnel_domain: String,
    /// Whether DNS records are proxied through the edge
    pub proxied: bool,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub routes_attempted: usize,
    pub routes_succeeded: usize,
    pub routes_failed: usize,
    pub records_created: usize,
    pub records_updated: usize,
    pub records_unchanged: usize,
    pub deletions_attempted: usize,
    pub deletions_succeeded: usize,
    pub deletions_failed: usize,
    /// Records found under a removed hostname that this tool does not own
    pub records_skipped: usize,
    /// Hostnames carried forward for cleanup on the next cycle
    pub pending_cleanup: usize,
    pub tunnel_created: bool,
    pub credential_written: bool,
    pub state_committed: bool,
}

impl CycleReport {
    /// Returns true if no per-route or per-hostname operation failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.routes_failed == 0 && self.deletions_failed == 0
    }
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Every step succeeded and state was committed
    Success(CycleReport),
    /// The cycle ran to completion but some DNS operations failed
    PartialFailure(CycleReport),
    /// The cycle was aborted
    Fatal {
        phase: Phase,
        error: CycleError,
        report: CycleReport,
    },
}

impl CycleOutcome {
    #[must_use]
    pub fn report(&self) -> &CycleReport {
        match self {
            Self::Success(report) | Self::PartialFailure(report) | Self::Fatal { report, .. } => {
                report
            }
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Metrics and log label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::PartialFailure(_) => "partial_failure",
            Self::Fatal { .. } => "fatal",
        }
    }

    /// Process exit code for a single-cycle run.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success(_) => 0,
            Self::PartialFailure(_) => EXIT_PARTIAL_FAILURE,
            Self::Fatal { .. } => EXIT_FATAL,
        }
    }
}
