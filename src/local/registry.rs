//! Monitored-workflow registry
//!
//! The Sync Engine's `wid -> SyncState` map lives only in process memory
//! (§9 design notes), but `sync-add`/`sync-remove`/`sync-status` are
//! separate CLI invocations, each a fresh process. A small JSON manifest
//! alongside the workflows directory records which `wid`s are monitored so
//! a new invocation can rebuild the engine's registrations before acting.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;
use crate::filesys::file::File;

const REGISTRY_FILENAME: &str = ".sync-registry.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    monitored: BTreeSet<String>,
}

/// Tracks which `wid`s are monitored, persisted as a flat JSON file.
#[derive(Debug, Clone)]
pub struct Registry {
    file: PathBuf,
}

impl Registry {
    pub fn new(workflows_dir: &Path) -> Self {
        Self { file: workflows_dir.join(REGISTRY_FILENAME) }
    }

    pub async fn load(&self) -> Result<Vec<String>, SyncError> {
        let file = File::new(&self.file);
        if !file.exists().await {
            return Ok(Vec::new());
        }
        let registry: RegistryFile = file.read_json().await?;
        Ok(registry.monitored.into_iter().collect())
    }

    pub async fn save(&self, wids: impl IntoIterator<Item = String>) -> Result<(), SyncError> {
        let registry = RegistryFile { monitored: wids.into_iter().collect() };
        File::new(&self.file).write_json(&registry).await
    }

    pub async fn add(&self, wid: &str) -> Result<(), SyncError> {
        let mut wids: BTreeSet<String> = self.load().await?.into_iter().collect();
        wids.insert(wid.to_string());
        self.save(wids).await
    }

    pub async fn remove(&self, wid: &str) -> Result<(), SyncError> {
        let mut wids: BTreeSet<String> = self.load().await?.into_iter().collect();
        wids.remove(wid);
        self.save(wids).await
    }
}
