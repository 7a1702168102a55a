// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Removal detection between persisted state and the current snapshot.
//!
//! Upserts need no diff: every route in the current snapshot is upserted on
//! every cycle. Only deletions depend on history, so this module computes just
//! the hostnames that must be cleaned up. Everything here is pure.

use crate::route::{Route, Snapshot};
use std::collections::HashSet;

/// Hostnames present in `previous` but absent from `current`, in `previous` order.
///
/// With no previous state (first run) nothing is removed. Hostnames are
/// compared as DNS names: case and a trailing dot are ignored.
#[must_use]
pub fn removed_hostnames(previous: Option<&[Route]>, current: &Snapshot) -> Vec<String> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let wanted = wanted_names(current);
    let mut seen = HashSet::new();

    previous
        .iter()
        .map(|r| dns_name(&r.hostname))
        .filter(|hostname| !wanted.contains(hostname))
        .filter(|hostname| seen.insert(hostname.clone()))
        .collect()
}

/// Full cleanup work list for a cycle.
///
/// Newly removed hostnames come first, followed by hostnames still pending from
/// earlier failed deletions. Pending hostnames that are back in the current
/// snapshot are dropped: they are live again and must not be deleted.
#[must_use]
pub fn cleanup_candidates(
    previous: Option<&[Route]>,
    pending: &[String],
    current: &Snapshot,
) -> Vec<String> {
    let wanted = wanted_names(current);
    let mut candidates = removed_hostnames(previous, current);
    let mut seen: HashSet<String> = candidates.iter().cloned().collect();

    for hostname in pending.iter().map(|h| dns_name(h)) {
        if wanted.contains(&hostname) {
            continue;
        }
        if seen.insert(hostname.clone()) {
            candidates.push(hostname);
        }
    }

    candidates
}

fn wanted_names(current: &Snapshot) -> HashSet<String> {
    current.routes().iter().map(|r| dns_name(&r.hostname)).collect()
}

fn dns_name(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
