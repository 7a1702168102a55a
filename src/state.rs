// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persisted state: the snapshot in effect after the last successful cycle.
//!
//! The reconciler reads state once at cycle start and writes it once at commit.
//! Storage is single-slot and single-writer; callers must not run overlapping
//! cycles against the same store.
//!
//! # Layout
//!
//! ```json
//! {
//!   "routes": [{ "hostname": "app.example.com", "target": "http://app:8080" }],
//!   "pendingCleanup": ["old.example.com"],
//!   "updatedAt": "2025-11-29T23:45:00Z"
//! }
//! ```
//!
//! A bare JSON array of routes is also accepted when loading.

use crate::errors::StateError;
use crate::route::{normalize_hostname, Route};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// State committed at the end of a successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Routes applied by the last successful cycle, in snapshot order
    pub routes: Vec<Route>,
    /// Removed hostnames whose DNS records could not be deleted yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_cleanup: Vec<String>,
    /// When the state was committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedState {
    #[must_use]
    pub fn new(routes: Vec<Route>, pending_cleanup: Vec<String>) -> Self {
        Self {
            routes,
            pending_cleanup,
            updated_at: Some(Utc::now()),
        }
    }

    /// Normalize hostnames the same way snapshots are normalized.
    ///
    /// Entries that no longer validate are dropped with a warning. Repeated
    /// hostnames keep their first occurrence.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut seen = HashSet::new();
        let routes = self
            .routes
            .into_iter()
            .filter_map(|route| {
                let hostname = normalized_or_warn(&route.hostname)?;
                seen.insert(hostname.clone()).then(|| Route::new(hostname, route.target))
            })
            .collect();

        let mut seen = HashSet::new();
        let pending_cleanup = self
            .pending_cleanup
            .iter()
            .map(String::as_str)
            .filter_map(normalized_or_warn)
            .filter(|hostname| seen.insert(hostname.clone()))
            .collect();

        Self {
            routes,
            pending_cleanup,
            updated_at: self.updated_at,
        }
    }
}

fn normalized_or_warn(hostname: &str) -> Option<String> {
    match normalize_hostname(hostname) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!(error = %e, "Dropping invalid hostname from persisted state");
            None
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateDocument {
    Current(PersistedState),
    Legacy(Vec<Route>),
}

/// Parse a state document, accepting both the current and the legacy layout.
///
/// Hostnames come back normalized; see [`PersistedState::normalized`].
///
/// # Errors
///
/// Returns the parser error when the document matches neither layout.
pub fn parse_state(contents: &[u8]) -> Result<PersistedState, serde_json::Error> {
    let state = match serde_json::from_slice(contents)? {
        StateDocument::Current(state) => state,
        StateDocument::Legacy(routes) => PersistedState {
            routes,
            ..PersistedState::default()
        },
    };
    Ok(state.normalized())
}

/// Single-slot storage for [`PersistedState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last committed state.
    ///
    /// Returns `None` on first run and when stored state is unreadable or corrupt.
    async fn load(&self) -> Option<PersistedState>;

    /// Replace the stored state.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] when the state cannot be serialized or written.
    async fn save(&self, state: &PersistedState) -> Result<(), StateError>;
}

/// JSON file backed state store.
///
/// Writes go to a sibling temporary file that is renamed over the target, so a
/// crash mid-write never leaves a truncated state file behind.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Option<PersistedState> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state found");
                return None;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Persisted state unreadable, treating as absent"
                );
                return None;
            }
        };

        match parse_state(&contents) {
            Ok(state) => {
                debug!(
                    path = %self.path.display(),
                    routes = state.routes.len(),
                    pending_cleanup = state.pending_cleanup.len(),
                    "Loaded persisted state"
                );
                Some(state)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Persisted state corrupt, treating as absent"
                );
                None
            }
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let write_err = |e: std::io::Error| StateError::Write {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        let json =
            serde_json::to_vec_pretty(state).map_err(|e| StateError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &json).await.map_err(write_err)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(write_err)?;

        debug!(
            path = %self.path.display(),
            routes = state.routes.len(),
            "Persisted state saved"
        );
        Ok(())
    }
}

/// In-memory state store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<PersistedState>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`.
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Option<PersistedState> {
        self.state.lock().await.clone()
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        *self.state.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
