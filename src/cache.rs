//! Local cache for files downloaded from the Web API.
//!
//! [`DownloadCache`] retains every downloaded file permanently under one
//! cache directory and records the URL → relative-path mapping in a
//! tab-separated `db.tsv` index. The index is read once at construction and
//! rewritten in full whenever an entry is added; it is the sole source of
//! truth for "have we already fetched this URL" and is consulted before any
//! network call. Files on the server are assumed immutable once published,
//! so there is no eviction and no revalidation.
//!
//! [`TempFiles`] is the non-caching variant for one-shot usage: every call
//! downloads into a fresh temporary location that is removed when the
//! manager is dropped.

use std::collections::HashMap;
use std::fs;
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use crate::error::ScoError;
use crate::store::write_bytes_atomic;
use crate::transport::Transport;

const INDEX_FILE: &str = "db.tsv";

/// Access to (a local copy of) the file behind a download URL.
pub trait FileManager {
    fn get_file(&self, url: &str) -> Result<Utf8PathBuf, ScoError>;
}

pub struct DownloadCache<T: Transport> {
    transport: T,
    directory: Utf8PathBuf,
    index_file: Utf8PathBuf,
    index: Mutex<HashMap<String, String>>,
}

impl<T: Transport> DownloadCache<T> {
    pub fn new(transport: T, directory: Utf8PathBuf) -> Result<Self, ScoError> {
        fs::create_dir_all(directory.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let index_file = directory.join(INDEX_FILE);
        let mut index = HashMap::new();
        if index_file.as_std_path().exists() {
            let content = fs::read_to_string(index_file.as_std_path())
                .map_err(|err| ScoError::Filesystem(err.to_string()))?;
            for line in content.lines() {
                if let Some((url, relative)) = line.split_once('\t') {
                    index.insert(url.to_string(), relative.to_string());
                }
            }
        }
        Ok(Self {
            transport,
            directory,
            index_file,
            index: Mutex::new(index),
        })
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    fn persist(&self, index: &HashMap<String, String>) -> Result<(), ScoError> {
        let mut content = String::new();
        for (url, relative) in index {
            content.push_str(url);
            content.push('\t');
            content.push_str(relative);
            content.push('\n');
        }
        write_bytes_atomic(&self.index_file, content.as_bytes())
    }
}

impl<T: Transport> FileManager for DownloadCache<T> {
    /// Return the locally cached file for `url`, downloading it on a miss.
    ///
    /// On a miss the file is downloaded to a scratch location inside the
    /// cache directory, moved into a fresh UUID-named subdirectory under its
    /// original filename and the index is rewritten. No index entry is
    /// written unless the file is fully in place.
    fn get_file(&self, url: &str) -> Result<Utf8PathBuf, ScoError> {
        {
            let index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(relative) = index.get(url) {
                debug!(url, relative, "file cache hit");
                return Ok(self.directory.join(relative));
            }
        }
        debug!(url, "file cache miss");
        // Scratch inside the cache directory so the final rename stays on
        // one filesystem.
        let scratch = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(self.directory.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let downloaded = self.transport.download(url, scratch.path())?;
        let file_name = downloaded
            .file_name
            .or_else(|| url_file_name(url))
            .unwrap_or_else(|| "download".to_string());
        let subdirectory = Uuid::new_v4().to_string();
        fs::create_dir(self.directory.join(&subdirectory).as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let relative = format!("{subdirectory}/{file_name}");
        let target = self.directory.join(&relative);
        fs::rename(&downloaded.path, target.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.insert(url.to_string(), relative);
        self.persist(&index)?;
        Ok(target)
    }
}

/// Non-caching file manager. Downloads land in a temporary directory owned
/// by this value and are removed when it is dropped.
pub struct TempFiles<T: Transport> {
    transport: T,
    root: TempDir,
}

impl<T: Transport> TempFiles<T> {
    pub fn new(transport: T) -> Result<Self, ScoError> {
        let root = tempfile::Builder::new()
            .prefix("sco-files-")
            .tempdir()
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        Ok(Self { transport, root })
    }
}

impl<T: Transport> FileManager for TempFiles<T> {
    fn get_file(&self, url: &str) -> Result<Utf8PathBuf, ScoError> {
        let subdirectory = self.root.path().join(Uuid::new_v4().to_string());
        fs::create_dir(&subdirectory).map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let downloaded = self.transport.download(url, &subdirectory)?;
        let file_name = downloaded
            .file_name
            .or_else(|| url_file_name(url))
            .unwrap_or_else(|| "download".to_string());
        let target = subdirectory.join(&file_name);
        fs::rename(&downloaded.path, &target)
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        Utf8PathBuf::from_path_buf(target)
            .map_err(|_| ScoError::Filesystem("non-utf8 temp path".to_string()))
    }
}

/// File manager selected at client construction time.
pub enum FileStore<T: Transport> {
    Cache(DownloadCache<T>),
    Temp(TempFiles<T>),
}

impl<T: Transport> FileManager for FileStore<T> {
    fn get_file(&self, url: &str) -> Result<Utf8PathBuf, ScoError> {
        match self {
            FileStore::Cache(cache) => cache.get_file(url),
            FileStore::Temp(temp) => temp.get_file(url),
        }
    }
}

/// Last path segment of the URL, if it has one. The authority of a
/// path-less URL is not a filename.
fn url_file_name(url: &str) -> Option<String> {
    let path = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, segment) = path.trim_end_matches('/').rsplit_once('/')?;
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}
