// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for tunnelsync.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Control Plane Constants
// ============================================================================

/// Default base URL of the Cloudflare v4 REST API
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Domain suffix every tunnel is reachable under (`<tunnel-id>.cfargotunnel.com`)
pub const DEFAULT_TUNNEL_DOMAIN: &str = "cfargotunnel.com";

/// `config_src` value telling the control plane that ingress is managed remotely
pub const TUNNEL_CONFIG_SRC: &str = "cloudflare";

/// Envelope error code returned for rejected credentials
pub const AUTH_ERROR_CODE: i64 = 10000;

// ============================================================================
// DNS Constants
// ============================================================================

/// Record type for every managed DNS record
pub const RECORD_TYPE_CNAME: &str = "CNAME";

/// TTL value meaning "automatic" on the DNS API
pub const AUTOMATIC_TTL: u32 = 1;

/// Maximum length of a fully-qualified hostname
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label
pub const MAX_LABEL_LEN: usize = 63;

// ============================================================================
// Ingress Constants
// ============================================================================

/// Service of the terminal catch-all ingress rule
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

// ============================================================================
// Timeouts
// ============================================================================

/// Default per-request timeout for control plane calls (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connect timeout for control plane calls (10 seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default interval between cycles in watch mode (1 minute)
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Filesystem Defaults
// ============================================================================

/// Where the discovery collaborator writes the current snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "/var/lib/tunnelsync/current.json";

/// Where the last successfully applied snapshot is persisted
pub const DEFAULT_STATE_PATH: &str = "/var/lib/tunnelsync/previous.json";

/// Where the tunnel agent expects its bearer token
pub const DEFAULT_CREDENTIAL_PATH: &str = "/etc/cloudflared/token";

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit code for a cycle with per-route failures
pub const EXIT_PARTIAL_FAILURE: u8 = 1;

/// Process exit code for a cycle aborted by a fatal error
pub const EXIT_FATAL: u8 = 2;
