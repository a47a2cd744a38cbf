// ABOUTME: Durable session persistence behind a minimal key-value interface
// ABOUTME: Memory store for tests, JSON file store for single-host deployments
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Session store.
//!
//! All cross-invocation state flows through this interface: the Withings
//! refresh token and the Garmin token pair live here, keyed by fixed logical
//! identifiers. The persisted copy is the source of truth; in-memory session
//! objects within one invocation are disposable caches.
//!
//! Writes are last-write-wins. Every `put` stores a complete, self-consistent
//! value — never a partial patch — so a race between concurrent invocations
//! can waste a token refresh but cannot corrupt the store.
//!
//! Deleting a stored value (an external administrative action, e.g. removing
//! the file entry) forces the owning session manager back to its no-session
//! state on the next acquire.

use crate::errors::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Store key for the Withings refresh token
pub const WITHINGS_REFRESH_TOKEN_KEY: &str = "withings_refresh_token";

/// Store key for the serialized Garmin session
pub const GARMIN_SESSION_KEY: &str = "garmin_session";

/// Durable key-value persistence for refreshable session material
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the value stored under `key`, if any
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &str) -> SyncResult<()>;
}

/// In-memory store for tests and single-invocation experiments
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with entries
    #[must_use]
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> SyncResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// File-backed store holding all keys in one JSON document.
///
/// Each `put` rewrites the whole document through a temporary file and an
/// atomic rename, so readers never observe a torn write.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store backed by the JSON document at `path`.
    /// The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> SyncResult<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                SyncError::Store(format!(
                    "malformed session file {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(SyncError::Store(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, entries: &HashMap<String, String>) -> SyncResult<()> {
        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|e| SyncError::Store(format!("failed to serialize session file: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Store(format!("failed to create {}: {e}", parent.display())))?;
        }

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, serialized.as_bytes())
            .await
            .map_err(|e| SyncError::Store(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SyncError::Store(format!("failed to replace {}: {e}", self.path.display())))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.read_all().await?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut entries = self.read_all().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.write_all(&entries).await
    }
}
