// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tunnel identity resolution and credential hand-off.
//!
//! A tunnel is looked up by name before it is ever created, so running the
//! resolver repeatedly with the same name creates at most one tunnel. The
//! tunnel's bearer token is written to a [`CredentialStore`] the data-plane
//! agent reads; it never appears in the ingress configuration.
//!
//! A tunnel that was created but whose credential could not be fetched is not
//! rolled back: the next cycle finds it by name and writes the missing
//! credential then.

use crate::cloudflare::{ControlPlane, Tunnel};
use crate::errors::{CredentialError, CycleError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Resolved tunnel for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelIdentity {
    pub id: String,
    pub name: String,
    /// The tunnel was created during this resolution
    pub created: bool,
    /// The credential was (re)written during this resolution
    pub credential_written: bool,
}

impl TunnelIdentity {
    /// DNS target every routed hostname points at.
    #[must_use]
    pub fn dns_target(&self, tunnel_domain: &str) -> String {
        format!("{}.{}", self.id, tunnel_domain)
    }
}

/// Side channel the tunnel agent reads its bearer credential from.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns true if a credential is already present.
    async fn exists(&self) -> bool;

    /// Replace the stored credential.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] when the credential cannot be written.
    async fn write(&self, credential: &str) -> Result<(), CredentialError>;
}

/// Writes the credential to a file, owner-readable only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    async fn write(&self, credential: &str) -> Result<(), CredentialError> {
        let write_err = |e: std::io::Error| CredentialError {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut temp_name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        write_owner_only(&temp_path, credential.trim().as_bytes())
            .await
            .map_err(write_err)?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(write_err)?;

        info!(path = %self.path.display(), "Wrote tunnel credential");
        Ok(())
    }
}

/// Create `path` readable by its owner only and write `contents` to it.
///
/// A leftover file is removed first so the mode applies to a fresh inode.
async fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

/// In-memory credential store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn credential(&self) -> Option<String> {
        self.credential.lock().await.clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn exists(&self) -> bool {
        self.credential.lock().await.is_some()
    }

    async fn write(&self, credential: &str) -> Result<(), CredentialError> {
        *self.credential.lock().await = Some(credential.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Find the tunnel named `name`, creating it if none exists, and make sure its
/// credential is available to the data-plane agent.
///
/// When several live tunnels share the name, the first one returned is used.
///
/// # Errors
///
/// Any control plane or credential failure is fatal for the cycle.
pub async fn resolve_tunnel(
    control_plane: &dyn ControlPlane,
    credentials: &dyn CredentialStore,
    account_id: &str,
    name: &str,
) -> Result<TunnelIdentity, CycleError> {
    let existing: Vec<Tunnel> = control_plane
        .list_tunnels(account_id, name)
        .await?
        .into_iter()
        .filter(|t| t.name == name && t.deleted_at.is_none())
        .collect();

    if existing.len() > 1 {
        warn!(
            tunnel_name = %name,
            matches = existing.len(),
            "Multiple tunnels share this name, using the first"
        );
    }

    let (tunnel, created) = match existing.into_iter().next() {
        Some(tunnel) => {
            debug!(tunnel_id = %tunnel.id, tunnel_name = %name, "Found existing tunnel");
            (tunnel, false)
        }
        None => {
            info!(tunnel_name = %name, "No tunnel with this name, creating one");
            (control_plane.create_tunnel(account_id, name).await?, true)
        }
    };

    let credential_written = if created || !credentials.exists().await {
        let credential = control_plane
            .get_tunnel_credential(account_id, &tunnel.id)
            .await?;
        credentials.write(&credential).await?;
        true
    } else {
        false
    };

    Ok(TunnelIdentity {
        id: tunnel.id,
        name: tunnel.name,
        created,
        credential_written,
    })
}

#[cfg(test)]
#[path = "tunnel_tests.rs"]
mod tunnel_tests;
