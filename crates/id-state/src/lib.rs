// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent JSON state stores: processed deliveries and review follow-ups.
//!
//! Each store keeps its structure in memory behind a `tokio::sync::Mutex`
//! and writes through to disk on every mutation — "two concentric dedup
//! stores... do not re-read the file on every request." A single
//! process-wide lock per file is sufficient; multi-process operation is out
//! of scope.

#![deny(unsafe_code)]

use id_core::{FollowupStore, FollowupTask, ProcessedState};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

/// Errors from reading or writing a state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// The file could not be written to disk.
    #[error("failed to persist {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The parent directory could not be created.
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

fn read_or_empty(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

async fn write_pretty(path: &Path, bytes: Vec<u8>) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StateError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| StateError::Write {
            path: path.display().to_string(),
            source,
        })
}

/// The two-layer delivery/fingerprint dedup store, `processed_deliveries.json`.
pub struct ProcessedStateStore {
    path: PathBuf,
    inner: Mutex<ProcessedState>,
}

impl ProcessedStateStore {
    /// Load the store from `path`, tolerating an absent or malformed file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = if path.exists() {
            ProcessedState::from_json_str(&read_or_empty(&path))
        } else {
            ProcessedState::default()
        };
        Self {
            path,
            inner: Mutex::new(state),
        }
    }

    /// `true` if either the delivery ID or the fingerprint has already been
    /// recorded.
    pub async fn is_duplicate(&self, delivery_id: &str, fingerprint: &str) -> DuplicateKind {
        let guard = self.inner.lock().await;
        if guard.has_delivery(delivery_id) {
            return DuplicateKind::Delivery;
        }
        if guard.has_fingerprint(fingerprint) {
            return DuplicateKind::Fingerprint;
        }
        DuplicateKind::None
    }

    /// Record `delivery_id` and `fingerprint` as processed, and persist.
    pub async fn mark_processed(&self, delivery_id: &str, fingerprint: &str) -> Result<(), StateError> {
        let mut guard = self.inner.lock().await;
        guard.mark_processed(delivery_id, fingerprint);
        let bytes = serde_json::to_vec_pretty(&*guard).expect("ProcessedState always serializes");
        drop(guard);
        write_pretty(&self.path, bytes).await
    }
}

/// Which dedup layer, if any, matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// No prior match; this is a fresh delivery.
    None,
    /// The delivery ID has been seen before.
    Delivery,
    /// The content fingerprint has been seen before (different delivery ID).
    Fingerprint,
}

/// The follow-up task store, `review_followups.json`.
///
/// Mutations are serialized behind a single process-wide lock; per the
/// design notes a per-key lock is an available refinement if a single
/// instance's traffic against one file ever becomes contended, but a
/// global lock is simpler and sufficient.
pub struct FollowupStateStore {
    path: PathBuf,
    inner: Mutex<FollowupStore>,
}

impl FollowupStateStore {
    /// Load the store from `path`, tolerating an absent or malformed file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = if path.exists() {
            FollowupStore::from_json_str(&read_or_empty(&path))
        } else {
            FollowupStore::default()
        };
        Self {
            path,
            inner: Mutex::new(store),
        }
    }

    /// Fetch a clone of the task at `key`, if present.
    pub async fn get(&self, key: &str) -> Option<FollowupTask> {
        self.inner.lock().await.tasks.get(key).cloned()
    }

    /// Load-modify-save under the store's lock: `mutator` receives the
    /// existing task (if any) and returns the task to persist.
    pub async fn upsert(
        &self,
        key: &str,
        mutator: impl FnOnce(Option<FollowupTask>) -> FollowupTask,
    ) -> Result<FollowupTask, StateError> {
        let mut guard = self.inner.lock().await;
        let existing = guard.tasks.get(key).cloned();
        let updated = mutator(existing);
        guard.tasks.insert(key.to_string(), updated.clone());
        let bytes = serde_json::to_vec_pretty(&*guard).expect("FollowupStore always serializes");
        drop(guard);
        write_pretty(&self.path, bytes).await?;
        Ok(updated)
    }

    /// Load-modify-save for a task that must already exist; returns `None`
    /// (and makes no change) if `key` isn't present.
    pub async fn update_existing(
        &self,
        key: &str,
        mutator: impl FnOnce(&mut FollowupTask),
    ) -> Result<Option<FollowupTask>, StateError> {
        let mut guard = self.inner.lock().await;
        let Some(task) = guard.tasks.get_mut(key) else {
            warn!(key, "attempted to update a follow-up task that does not exist");
            return Ok(None);
        };
        mutator(task);
        let updated = task.clone();
        let bytes = serde_json::to_vec_pretty(&*guard).expect("FollowupStore always serializes");
        drop(guard);
        write_pretty(&self.path, bytes).await?;
        Ok(Some(updated))
    }
}
