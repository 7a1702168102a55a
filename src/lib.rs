// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # tunnelsync - Container Routes to Cloudflare Tunnel Ingress
//!
//! tunnelsync keeps one Cloudflare tunnel and the DNS records of a zone in step
//! with the set of routes discovered on a container host.
//!
//! ## Overview
//!
//! Every cycle takes a complete snapshot of `hostname -> service` routes and:
//!
//! - Finds or creates the named tunnel and hands its credential to the agent
//! - Upserts a proxied CNAME record per hostname pointing at the tunnel
//! - Replaces the tunnel ingress rules, ending with a `404` catch-all
//! - Deletes records of hostnames that disappeared since the last commit
//! - Persists the snapshot so the next cycle can compute removals
//!
//! ## Modules
//!
//! - [`reconciler`] - The cycle state machine
//! - [`cloudflare`] - Control plane client and the [`cloudflare::ControlPlane`] trait
//! - [`route`] - Routes, snapshot validation and ingress rule building
//! - [`diff`] - Removal detection between snapshots
//! - [`state`] - Persisted state of the last successful cycle
//! - [`tunnel`] - Tunnel identity resolution and credential storage
//! - [`config`] - Runtime configuration
//! - [`metrics`] - Prometheus metrics
//! - [`server`] - `/metrics` and `/healthz` endpoints for watch mode
//!
//! ## Example
//!
//! ```rust
//! use tunnelsync::diff::removed_hostnames;
//! use tunnelsync::route::{Route, Snapshot};
//!
//! let previous = vec![
//!     Route::new("app.example.com", "http://app:8080"),
//!     Route::new("old.example.com", "http://old:80"),
//! ];
//! let current = Snapshot::validate(vec![Route::new("app.example.com", "http://app:8080")])
//!     .unwrap();
//!
//! assert_eq!(
//!     removed_hostnames(Some(previous.as_slice()), &current),
//!     vec!["old.example.com".to_string()]
//! );
//! ```

pub mod cloudflare;
pub mod config;
pub mod constants;
pub mod diff;
pub mod errors;
pub mod http_errors;
pub mod metrics;
pub mod reconciler;
pub mod route;
pub mod server;
pub mod state;
pub mod tunnel;

#[cfg(test)]
mod test_support;
