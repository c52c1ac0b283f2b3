//! On-disk layout for locally materialized resources.
//!
//! One root directory owns everything the client writes: the file cache
//! (`cache/`) and one data directory per subject and image group. The root
//! is an explicit configuration value; the documented default is `~/.sco`.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::error::ScoError;

#[derive(Debug, Clone)]
pub struct ResourceStore {
    root: Utf8PathBuf,
}

impl ResourceStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted at the default location `~/.sco`.
    pub fn default_location() -> Result<Self, ScoError> {
        let root = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".sco")).ok())
            .ok_or_else(|| {
                ScoError::Filesystem("unable to resolve home directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.root.join("cache")
    }

    pub fn subject_dir(&self, identifier: &str) -> Utf8PathBuf {
        self.root.join("subjects").join(identifier)
    }

    pub fn image_group_dir(&self, identifier: &str) -> Utf8PathBuf {
        self.root.join("imagegroups").join(identifier)
    }

    pub fn ensure_root(&self) -> Result<(), ScoError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))
    }
}

/// Write a file through a temporary sibling and rename, so readers never
/// observe a partially written file.
pub(crate) fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ScoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| ScoError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| ScoError::Filesystem(err.to_string()))
}
