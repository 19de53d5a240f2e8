use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::{engine::DeploymentResult, error::JournalError, journal::FileJournal};

/// The journal file inside a deployment directory.
pub const JOURNAL_FILENAME: &str = "journal.jsonl";

/// Contract addresses of a deployment, by action key.
pub const ADDRESSES_FILENAME: &str = "deployed_addresses.json";

/// On-disk state of one deployment: `<deployments_dir>/<deployment_id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDir {
    root: PathBuf,
    id: String,
}

impl DeploymentDir {
    pub fn new(deployments_dir: impl AsRef<Path>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            root: deployments_dir.as_ref().join(&id),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILENAME)
    }

    pub fn addresses_path(&self) -> PathBuf {
        self.root.join(ADDRESSES_FILENAME)
    }

    /// Open the deployment journal, creating the directory on first use.
    pub fn open_journal(&self) -> Result<FileJournal, JournalError> {
        FileJournal::open(self.journal_path())
    }

    /// Merge the addresses of a run into the addresses file.
    ///
    /// The file is written as formatted JSON for human readability.
    pub fn save_addresses(&self, result: &DeploymentResult) -> Result<PathBuf> {
        let mut addresses = self.load_addresses()?;
        for (key, address) in &result.addresses {
            addresses.insert(key.to_string(), *address);
        }

        std::fs::create_dir_all(&self.root)
            .context(format!("Failed to create {}", self.root.display()))?;
        let path = self.addresses_path();
        let json =
            serde_json::to_string_pretty(&addresses).context("Failed to serialize addresses")?;
        std::fs::write(&path, json)
            .context(format!("Failed to write addresses to {}", path.display()))?;

        tracing::info!(path = %path.display(), count = addresses.len(), "Deployed addresses saved");
        Ok(path)
    }

    /// Load the addresses file. A deployment without one has no addresses yet.
    pub fn load_addresses(&self) -> Result<BTreeMap<String, Address>> {
        let path = self.addresses_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read addresses from {}", path.display()))?;
        let addresses =
            serde_json::from_str(&content).context("Failed to parse deployed addresses JSON")?;
        Ok(addresses)
    }

    /// Delete the deployment directory with its journal.
    pub fn reset(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.root)
            .context(format!("Failed to remove {}", self.root.display()))?;
        tracing::warn!(deployment = %self.id, path = %self.root.display(), "Deployment reset");
        Ok(true)
    }
}
