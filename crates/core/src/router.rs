//! Path router and mount table
//!
//! The mount table stitches every backend under one virtual tree. A
//! user-supplied argument is quote-stripped, joined to the cwd, and
//! canonicalized; the mount whose prefix is the longest prefix of the result
//! at a segment boundary wins. The canonical path is returned unchanged;
//! the adapter strips its own prefix.

use std::sync::Arc;

use crate::backend::Backend;
use crate::endpoint::BackendKind;
use crate::error::{Error, Result};
use crate::vpath::VPath;

/// One (prefix, backend) pair
#[derive(Clone)]
pub struct Mount {
    /// Virtual prefix; `""` for the root mount
    pub prefix: String,
    /// The adapter responsible for everything under the prefix
    pub backend: Arc<dyn Backend>,
}

/// Row produced by `remotes`
#[derive(Debug, Clone)]
pub struct MountStatus {
    /// Mount prefix as displayed (`/` for the root mount)
    pub prefix: String,
    /// Adapter kind
    pub kind: BackendKind,
    /// One-line adapter status
    pub status: String,
}

/// Mount table; owns the current working directory
pub struct MountTable {
    mounts: Vec<Mount>,
    cwd: VPath,
}

impl MountTable {
    /// Empty table with cwd at the virtual root
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            cwd: VPath::root(),
        }
    }

    /// Current working directory
    pub fn cwd(&self) -> &VPath {
        &self.cwd
    }

    /// Add or replace a mount.
    ///
    /// The prefix is canonicalized; `/` (or the empty string) installs the
    /// root mount.
    pub fn mount(&mut self, prefix: &str, backend: Arc<dyn Backend>) -> Result<()> {
        let canonical = if prefix.is_empty() {
            VPath::root()
        } else {
            VPath::new(prefix)?
        };
        let key = if canonical.is_root() {
            String::new()
        } else {
            canonical.as_str().to_string()
        };
        self.mounts.retain(|m| m.prefix != key);
        self.mounts.push(Mount {
            prefix: key,
            backend,
        });
        Ok(())
    }

    /// Remove a mount; errors when the prefix is not mounted
    pub fn unmount(&mut self, prefix: &str) -> Result<()> {
        let canonical = if prefix.is_empty() {
            VPath::root()
        } else {
            VPath::new(prefix)?
        };
        let key = if canonical.is_root() {
            String::new()
        } else {
            canonical.as_str().to_string()
        };
        let before = self.mounts.len();
        self.mounts.retain(|m| m.prefix != key);
        if self.mounts.len() == before {
            return Err(Error::NotFound(format!("mount {prefix}")));
        }
        Ok(())
    }

    /// All mounts, unordered
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Resolve a raw argument to `(backend, canonical path)`
    pub fn resolve(&self, raw: &str) -> Result<(Arc<dyn Backend>, VPath)> {
        let path = VPath::resolve(&self.cwd, raw)?;
        let backend = self.backend_for(&path)?;
        Ok((backend, path))
    }

    /// The mount whose prefix is the longest match for `path`
    pub fn mount_for(&self, path: &VPath) -> Result<&Mount> {
        self.mounts
            .iter()
            .filter(|m| path.under(&m.prefix))
            .max_by_key(|m| m.prefix.len())
            .ok_or_else(|| Error::NoBackend(path.as_str().to_string()))
    }

    /// The backend whose prefix is the longest match for `path`
    pub fn backend_for(&self, path: &VPath) -> Result<Arc<dyn Backend>> {
        self.mount_for(path).map(|m| Arc::clone(&m.backend))
    }

    /// Change directory: resolve, let the adapter validate, store what it
    /// canonicalized
    pub async fn cd(&mut self, raw: &str) -> Result<VPath> {
        let (backend, path) = self.resolve(raw)?;
        let canonical = backend.cd(&path).await?;
        self.cwd = canonical.clone();
        Ok(canonical)
    }

    /// Status rows for every mount
    pub async fn list_status(&self) -> Vec<MountStatus> {
        let mut rows = Vec::with_capacity(self.mounts.len());
        for m in &self.mounts {
            rows.push(MountStatus {
                prefix: if m.prefix.is_empty() {
                    "/".to_string()
                } else {
                    m.prefix.clone()
                },
                kind: m.backend.kind(),
                status: m.backend.status().await,
            });
        }
        rows.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        rows
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}
