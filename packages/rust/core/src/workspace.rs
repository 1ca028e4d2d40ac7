//! Output directory upkeep.
//!
//! The output directory is flat and fully regenerated on each run: it is
//! cleared up front and pruned down to the retained artifacts at the end.
//! Files are written in place; an aborted run leaves whatever was already
//! written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use rulefeed_shared::{Result, RulefeedError};

/// Metadata for a single retained artifact file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Handle to the flat output directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| RulefeedError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write `content` to `name`.
    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, content).map_err(|e| RulefeedError::io(&path, e))?;
        Ok(path)
    }

    /// Names of every entry currently in the workspace, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| RulefeedError::io(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RulefeedError::io(&self.root, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Remove every file. Any failure aborts.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.list()? {
            self.remove(&name)?;
            removed += 1;
        }
        info!(removed, "workspace cleared");
        Ok(removed)
    }

    /// Remove every file whose name is not in `keep`. Running it again is a no-op.
    #[instrument(skip_all, fields(root = %self.root.display(), keep = keep.len()))]
    pub fn prune<S: AsRef<str>>(&self, keep: &[S]) -> Result<usize> {
        let keep: HashSet<&str> = keep.iter().map(AsRef::as_ref).collect();

        let mut removed = 0;
        for name in self.list()? {
            if keep.contains(name.as_str()) {
                continue;
            }
            self.remove(&name)?;
            removed += 1;
        }
        info!(removed, "workspace pruned");
        Ok(removed)
    }

    /// Hash and size a file in the workspace.
    pub fn artifact_meta(&self, name: &str) -> Result<ArtifactMeta> {
        let path = self.path(name);
        let bytes = std::fs::read(&path).map_err(|e| RulefeedError::io(&path, e))?;
        Ok(ArtifactMeta {
            filename: name.to_string(),
            sha256: compute_hash(&bytes),
            size_bytes: bytes.len(),
        })
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        debug!(path = %path.display(), "removing");
        std::fs::remove_file(&path).map_err(|e| RulefeedError::io(&path, e))
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
