//! Historical snapshots: the history collaborator and the per-version cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;
use crate::types::EditorId;

/// One buffer's contents at a historical version.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditorSnapshot {
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl EditorSnapshot {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            title: None,
        }
    }
}

/// Every buffer's contents at one version, keyed by buffer id.
pub type VersionSnapshot = HashMap<EditorId, EditorSnapshot>;

/// The history collaborator: produces snapshots of all buffers at a version.
pub trait VersionSource {
    fn editor_version(
        &self,
        version: u64,
    ) -> impl Future<Output = Result<VersionSnapshot, VersionError>>;
}

/// In-memory history, used by the CLI and tests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryVersionSource {
    versions: HashMap<u64, VersionSnapshot>,
}

impl MemoryVersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version: u64, snapshot: VersionSnapshot) {
        self.versions.insert(version, snapshot);
    }

    pub fn with_version(mut self, version: u64, snapshot: VersionSnapshot) -> Self {
        self.insert(version, snapshot);
        self
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.versions.keys().copied()
    }
}

impl VersionSource for MemoryVersionSource {
    async fn editor_version(&self, version: u64) -> Result<VersionSnapshot, VersionError> {
        self.versions
            .get(&version)
            .cloned()
            .ok_or(VersionError::Missing(version))
    }
}

impl<S: VersionSource> VersionSource for &S {
    fn editor_version(
        &self,
        version: u64,
    ) -> impl Future<Output = Result<VersionSnapshot, VersionError>> {
        (**self).editor_version(version)
    }
}

/// Memoized snapshots by version number. Entries are never evicted.
#[derive(Clone, Debug, Default)]
pub struct VersionCache {
    entries: HashMap<u64, Arc<VersionSnapshot>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, version: u64) -> Option<Arc<VersionSnapshot>> {
        self.entries.get(&version).cloned()
    }

    pub fn insert(&mut self, version: u64, snapshot: VersionSnapshot) -> Arc<VersionSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.entries.insert(version, snapshot.clone());
        snapshot
    }

    pub fn contains(&self, version: u64) -> bool {
        self.entries.contains_key(&version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
