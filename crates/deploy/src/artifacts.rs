//! Contract artifacts: ABI and creation bytecode by name.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::Context;
use serde::Deserialize;
use walkdir::WalkDir;

/// A compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode: bytecode.into(),
        }
    }
}

/// Looks artifacts up by name.
pub trait ArtifactSource {
    /// `Ok(None)` when no artifact has this name.
    fn load(&self, name: &str) -> anyhow::Result<Option<Artifact>>;
}

/// Artifacts held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifacts {
    artifacts: HashMap<String, Artifact>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.name.clone(), artifact);
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }
}

impl ArtifactSource for MemoryArtifacts {
    fn load(&self, name: &str) -> anyhow::Result<Option<Artifact>> {
        Ok(self.artifacts.get(name).cloned())
    }
}

/// On-disk artifact file, in Hardhat (`"bytecode": "0x…"`) or Foundry
/// (`"bytecode": { "object": "0x…" }`) layout.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: BytecodeField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(Bytes),
    Object { object: Bytes },
}

/// Artifacts read from a build output directory.
///
/// `<Name>.json` is searched recursively below the root, so both `artifacts/contracts/
/// Box.sol/Box.json` (Hardhat) and `out/Box.sol/Box.json` (Foundry) are found.
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    root: PathBuf,
}

impl FsArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, name: &str) -> anyhow::Result<Option<PathBuf>> {
        let file_name = format!("{name}.json");
        let mut found: Option<PathBuf> = None;

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != "build-info")
        {
            let entry = entry.with_context(|| {
                format!("Failed to read artifacts directory {}", self.root.display())
            })?;
            if !entry.file_type().is_file() || entry.file_name().to_string_lossy() != file_name {
                continue;
            }
            if let Some(previous) = &found {
                anyhow::bail!(
                    "Artifact name `{}` is ambiguous: {} and {}",
                    name,
                    previous.display(),
                    entry.path().display()
                );
            }
            found = Some(entry.into_path());
        }

        Ok(found)
    }

    fn read(name: &str, path: &Path) -> anyhow::Result<Artifact> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact from {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;
        let bytecode = match file.bytecode {
            BytecodeField::Hex(bytes) | BytecodeField::Object { object: bytes } => bytes,
        };
        tracing::debug!(artifact = name, path = %path.display(), "Loaded artifact");
        Ok(Artifact::new(name, file.abi, bytecode))
    }
}

impl ArtifactSource for FsArtifactSource {
    fn load(&self, name: &str) -> anyhow::Result<Option<Artifact>> {
        if !self.root.exists() {
            anyhow::bail!("Artifacts directory not found: {}", self.root.display());
        }
        match self.find(name)? {
            Some(path) => Self::read(name, &path).map(Some),
            None => Ok(None),
        }
    }
}

/// The validated artifacts of a plan.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactSet {
    pub(crate) fn insert(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.name.clone(), artifact);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    pub fn get(&self, name: &str) -> anyhow::Result<&Artifact> {
        self.artifacts
            .get(name)
            .with_context(|| format!("artifact `{name}` was not loaded"))
    }
}
