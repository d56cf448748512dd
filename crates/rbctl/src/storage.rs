use anyhow::{Context, Result};
use relaybridge::{FileStorageAdapter, KvBridgingFlags, KvEventIdentityStore, StorageAdapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File-backed bridge store inside the data directory (one JSON file per key).
pub struct Storage {
    base_dir: PathBuf,
    adapter: Arc<dyn StorageAdapter>,
}

impl Storage {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let base_dir = data_dir.join("store");
        let adapter = FileStorageAdapter::new(base_dir.clone())
            .with_context(|| format!("Failed to open store at {}", base_dir.display()))?;
        Ok(Self {
            base_dir,
            adapter: Arc::new(adapter),
        })
    }

    pub fn identities(&self) -> KvEventIdentityStore {
        KvEventIdentityStore::new(self.adapter.clone())
    }

    pub fn flags(&self) -> KvBridgingFlags {
        KvBridgingFlags::new(self.adapter.clone())
    }

    #[allow(dead_code)]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
