// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for tunnelsync.
//!
//! This module provides specialized error types for:
//! - Control plane operations (DNS records, tunnels, ingress configuration)
//! - Desired-state snapshot parsing and validation
//! - Persisted state and credential file access
//! - Runtime configuration
//! - Fatal reconciliation cycle failures
//!
//! Every error maps onto one [`ErrorKind`], which decides whether the failing
//! call aborts the cycle or is only counted against it.

use std::fmt;
use thiserror::Error;

/// Error taxonomy shared by every failure a cycle can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed snapshot; nothing external is touched
    InputInvalid,
    /// Credential rejected by the control plane
    AuthFailure,
    /// Network, TLS, timeout or upstream unavailability
    TransportFailure,
    /// The control plane answered but reported failure in its envelope
    LogicalRejection,
    /// Persisted state or credential file could not be read or written
    StateCorrupt,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputInvalid => "InputInvalid",
            Self::AuthFailure => "AuthFailure",
            Self::TransportFailure => "TransportFailure",
            Self::LogicalRejection => "LogicalRejection",
            Self::StateCorrupt => "StateCorrupt",
        };
        f.write_str(name)
    }
}

/// Errors returned by a single control plane call.
///
/// None of these are retried by the client; retry policy belongs to the reconciler.
#[derive(Error, Debug, Clone)]
pub enum ControlPlaneError {
    /// The request never produced an HTTP response (DNS, connect, TLS, broken pipe)
    #[error("{operation} failed to reach the control plane: {reason}")]
    Transport {
        /// Operation being performed (e.g. "list dns records")
        operation: String,
        /// Underlying transport error
        reason: String,
    },

    /// The request exceeded the configured timeout
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        /// Operation being performed
        operation: String,
        /// Configured timeout in seconds
        timeout_secs: u64,
    },

    /// The control plane is rate limiting or unavailable (HTTP 429 or 5xx)
    #[error("{operation} failed: control plane unavailable (HTTP {status_code})")]
    Unavailable {
        /// Operation being performed
        operation: String,
        /// HTTP status code
        status_code: u16,
    },

    /// The API token was rejected (HTTP 401/403 or envelope auth error)
    #[error("{operation} failed: authentication rejected (HTTP {status_code}): {reason}")]
    Auth {
        /// Operation being performed
        operation: String,
        /// HTTP status code
        status_code: u16,
        /// Message reported by the control plane
        reason: String,
    },

    /// The control plane reported a logical failure in its response envelope
    #[error("{operation} rejected by control plane (HTTP {status_code}): {reason}")]
    Rejected {
        /// Operation being performed
        operation: String,
        /// HTTP status code
        status_code: u16,
        /// Messages reported by the control plane
        reason: String,
    },
}

impl ControlPlaneError {
    /// Taxonomy entry for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Unavailable { .. } => {
                ErrorKind::TransportFailure
            }
            Self::Auth { .. } => ErrorKind::AuthFailure,
            Self::Rejected { .. } => ErrorKind::LogicalRejection,
        }
    }

    /// Returns true if every further call in the cycle is presumed to fail the same way.
    #[must_use]
    pub fn aborts_cycle(&self) -> bool {
        self.kind() == ErrorKind::AuthFailure
    }
}

/// Errors raised while reading or validating the desired-state snapshot.
#[derive(Error, Debug, Clone)]
pub enum SnapshotError {
    /// Snapshot source could not be read
    #[error("Failed to read snapshot from {path}: {reason}")]
    Unreadable {
        /// Location of the snapshot
        path: String,
        /// Underlying I/O error
        reason: String,
    },

    /// Snapshot is not a well-formed list of route records
    #[error("Malformed snapshot: {reason}")]
    Malformed {
        /// Parser error
        reason: String,
    },

    /// Route hostname is not a valid DNS name
    #[error("Invalid hostname '{hostname}': {reason}")]
    InvalidHostname {
        /// Offending hostname as supplied
        hostname: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// Route target is empty or reserved
    #[error("Invalid target '{target}' for hostname '{hostname}': {reason}")]
    InvalidTarget {
        /// Hostname of the offending route
        hostname: String,
        /// Offending target as supplied
        target: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Errors writing the persisted state.
///
/// Reading never fails: unreadable state is treated as absent.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    /// State could not be serialized
    #[error("Failed to serialize state: {0}")]
    Serialize(String),

    /// State file could not be written
    #[error("Failed to write state to {path}: {reason}")]
    Write {
        /// State file location
        path: String,
        /// Underlying I/O error
        reason: String,
    },
}

/// Errors persisting the tunnel credential for the data-plane agent.
#[derive(Error, Debug, Clone)]
#[error("Failed to write tunnel credential to {path}: {reason}")]
pub struct CredentialError {
    /// Credential file location
    pub path: String,
    /// Underlying I/O error
    pub reason: String,
}

/// Invalid runtime configuration, detected before any cycle runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required setting is missing or blank
    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    /// Setting has an unusable value
    #[error("Invalid value for '{setting}': {reason}")]
    Invalid {
        /// Setting name
        setting: &'static str,
        /// Explanation of what is invalid
        reason: String,
    },
}

/// Fatal error that aborts a reconciliation cycle.
#[derive(Error, Debug, Clone)]
pub enum CycleError {
    /// Snapshot failed validation
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A cycle-fatal control plane call failed
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Credential could not be written
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// New state could not be committed
    #[error(transparent)]
    State(#[from] StateError),
}

impl CycleError {
    /// Taxonomy entry for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Snapshot(_) => ErrorKind::InputInvalid,
            Self::ControlPlane(e) => e.kind(),
            Self::Credential(_) | Self::State(_) => ErrorKind::StateCorrupt,
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
