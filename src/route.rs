// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Routes, snapshots and the ingress rule set derived from them.
//!
//! A [`Route`] maps a public hostname to a service target. The discovery
//! collaborator produces a complete list of routes on every invocation; once
//! validated it becomes a [`Snapshot`]. The snapshot is the only input the
//! reconciler needs to compute DNS upserts and the ingress rule set.
//!
//! # Example
//!
//! ```rust
//! use tunnelsync::route::{build_ingress_rules, Route, Snapshot};
//!
//! let snapshot = Snapshot::validate(vec![
//!     Route::new("app.example.com", "http://app:8080"),
//!     Route::new("api.example.com", "http://api:3000"),
//! ])
//! .unwrap();
//!
//! let rules = build_ingress_rules(&snapshot);
//! assert_eq!(rules.len(), 3);
//! assert!(rules[2].is_catch_all());
//! ```

use crate::constants::{CATCH_ALL_SERVICE, MAX_HOSTNAME_LEN, MAX_LABEL_LEN};
use crate::errors::SnapshotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A hostname-to-service-target mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Fully-qualified public hostname
    pub hostname: String,
    /// Opaque service locator (e.g. `http://app:8080`)
    #[serde(alias = "service")]
    pub target: String,
}

impl Route {
    /// Create a route from anything string-like.
    pub fn new(hostname: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            target: target.into(),
        }
    }
}

/// Validated, de-duplicated desired state for one cycle.
///
/// Hostnames are lowercase without a trailing dot and unique. Ordering follows
/// the source ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    routes: Vec<Route>,
}

impl Snapshot {
    /// Validate raw routes from the discovery collaborator.
    ///
    /// Duplicate hostnames are resolved by keeping the last occurrence at its own
    /// position; earlier occurrences are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidHostname`] or [`SnapshotError::InvalidTarget`]
    /// for the first route that fails validation.
    pub fn validate(raw: Vec<Route>) -> Result<Self, SnapshotError> {
        let mut normalized = Vec::with_capacity(raw.len());
        for route in raw {
            let hostname = normalize_hostname(&route.hostname)?;
            validate_target(&hostname, &route.target)?;
            normalized.push(Route::new(hostname, route.target.trim()));
        }

        let mut last_index: HashMap<&str, usize> = HashMap::new();
        for (index, route) in normalized.iter().enumerate() {
            last_index.insert(route.hostname.as_str(), index);
        }

        let keep: Vec<bool> = normalized
            .iter()
            .enumerate()
            .map(|(index, route)| last_index.get(route.hostname.as_str()) == Some(&index))
            .collect();

        let mut routes = Vec::with_capacity(last_index.len());
        for (route, keep) in normalized.into_iter().zip(keep) {
            if keep {
                routes.push(route);
            } else {
                warn!(
                    hostname = %route.hostname,
                    target = %route.target,
                    "Duplicate hostname in snapshot, later entry wins"
                );
            }
        }

        Ok(Self { routes })
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn into_routes(self) -> Vec<Route> {
        self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Normalize a hostname and check that it is a valid DNS label sequence.
///
/// A single leading `*` label is accepted for wildcard routes.
///
/// # Errors
///
/// Returns [`SnapshotError::InvalidHostname`] describing the first violation.
pub fn normalize_hostname(hostname: &str) -> Result<String, SnapshotError> {
    let invalid = |reason: String| SnapshotError::InvalidHostname {
        hostname: hostname.to_string(),
        reason,
    };

    let name = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() {
        return Err(invalid("hostname is empty".to_string()));
    }
    if name.len() > MAX_HOSTNAME_LEN {
        return Err(invalid(format!(
            "hostname exceeds {MAX_HOSTNAME_LEN} characters"
        )));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("hostname must be fully qualified".to_string()));
    }

    for (index, label) in labels.iter().enumerate() {
        if index == 0 && *label == "*" {
            continue;
        }
        if label.is_empty() {
            return Err(invalid("empty label".to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid(format!(
                "label '{label}' exceeds {MAX_LABEL_LEN} characters"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid(format!(
                "label '{label}' starts or ends with '-'"
            )));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(invalid(format!("label '{label}' contains '{c}'")));
        }
    }

    Ok(name)
}

fn validate_target(hostname: &str, target: &str) -> Result<(), SnapshotError> {
    let invalid = |reason: &str| SnapshotError::InvalidTarget {
        hostname: hostname.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(invalid("target is empty"));
    }
    if trimmed == CATCH_ALL_SERVICE {
        return Err(invalid("catch-all service is reserved for the terminal rule"));
    }
    Ok(())
}

/// One entry of the ingress rule set pushed to the tunnel.
///
/// The catch-all rule has no hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hostname: Option<String>,
    pub service: String,
}

impl IngressRule {
    /// The terminal rule answering every unmatched hostname with "not found".
    #[must_use]
    pub fn catch_all() -> Self {
        Self {
            hostname: None,
            service: CATCH_ALL_SERVICE.to_string(),
        }
    }

    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.hostname.is_none()
    }
}

/// Build the ordered ingress rule set for a snapshot.
///
/// Rules follow snapshot order (first match wins on the tunnel) and always end
/// with exactly one catch-all rule, including for an empty snapshot.
#[must_use]
pub fn build_ingress_rules(snapshot: &Snapshot) -> Vec<IngressRule> {
    snapshot
        .routes()
        .iter()
        .map(|route| IngressRule {
            hostname: Some(route.hostname.clone()),
            service: route.target.clone(),
        })
        .chain(std::iter::once(IngressRule::catch_all()))
        .collect()
}

/// Producer of the raw desired-state route list.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the complete current route list.
    ///
    /// # Errors
    ///
    /// Returns a [`SnapshotError`] when the source cannot be read or parsed.
    async fn fetch(&self) -> Result<Vec<Route>, SnapshotError>;
}

/// Routes known up front (embedding and tests).
#[async_trait]
impl SnapshotSource for Vec<Route> {
    async fn fetch(&self) -> Result<Vec<Route>, SnapshotError> {
        Ok(self.clone())
    }
}

/// Reads the snapshot the discovery collaborator writes as a JSON array of
/// `{"hostname": ..., "target": ...}` records.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn fetch(&self) -> Result<Vec<Route>, SnapshotError> {
        let contents = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SnapshotError::Unreadable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        let routes: Vec<Route> =
            serde_json::from_slice(&contents).map_err(|e| SnapshotError::Malformed {
                reason: e.to_string(),
            })?;

        debug!(
            path = %self.path.display(),
            routes = routes.len(),
            "Read snapshot"
        );
        Ok(routes)
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod route_tests;
