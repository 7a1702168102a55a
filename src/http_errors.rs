// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP error mapping to control plane error types.
//!
//! This module maps HTTP status codes and transport failures from the control plane
//! API onto [`ControlPlaneError`] variants, so every call site classifies failures
//! the same way.
//!
//! # Usage
//!
//! ```rust
//! use tunnelsync::errors::ErrorKind;
//! use tunnelsync::http_errors::map_http_error;
//!
//! let error = map_http_error("list tunnels", 403, "Authentication error".to_string());
//! assert_eq!(error.kind(), ErrorKind::AuthFailure);
//!
//! let error = map_http_error("list tunnels", 502, String::new());
//! assert_eq!(error.kind(), ErrorKind::TransportFailure);
//! ```

use crate::errors::ControlPlaneError;

/// Map a non-successful HTTP status code to a control plane error.
///
/// # Arguments
///
/// * `operation` - Human-readable operation name used in the error message
/// * `status_code` - HTTP status code (e.g., 400, 403, 503)
/// * `reason` - Messages extracted from the response envelope, if any
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Variant | Kind |
/// |-----------|---------|------|
/// | 401 | `Auth` | `AuthFailure` |
/// | 403 | `Auth` | `AuthFailure` |
/// | 429 | `Unavailable` | `TransportFailure` |
/// | 5xx | `Unavailable` | `TransportFailure` |
/// | Other | `Rejected` | `LogicalRejection` |
#[must_use]
pub fn map_http_error(operation: &str, status_code: u16, reason: String) -> ControlPlaneError {
    match status_code {
        401 | 403 => ControlPlaneError::Auth {
            operation: operation.to_string(),
            status_code,
            reason,
        },
        429 | 500..=599 => ControlPlaneError::Unavailable {
            operation: operation.to_string(),
            status_code,
        },
        _ => ControlPlaneError::Rejected {
            operation: operation.to_string(),
            status_code,
            reason: if reason.is_empty() {
                format!("Unexpected HTTP status {status_code}")
            } else {
                reason
            },
        },
    }
}

/// Map a transport-level `reqwest` failure to a control plane error.
///
/// Use this when no HTTP response was received at all.
///
/// # Common Causes
///
/// - DNS resolution failure for the API host
/// - TLS handshake failure
/// - Connection refused or reset
/// - Request exceeded `timeout_secs`
#[must_use]
pub fn map_connection_error(
    operation: &str,
    error: &reqwest::Error,
    timeout_secs: u64,
) -> ControlPlaneError {
    if error.is_timeout() {
        ControlPlaneError::Timeout {
            operation: operation.to_string(),
            timeout_secs,
        }
    } else {
        ControlPlaneError::Transport {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;
