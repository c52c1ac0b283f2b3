//! Download and extraction of resource tar archives.
//!
//! Subjects and image groups are backed by tar archives (optionally
//! gzip-compressed) on the server. Materialization downloads the archive to
//! a scratch location, extracts it and leaves the result in the resource's
//! `data` directory. A `.complete` marker is written next to the data
//! directory after successful extraction; a data directory without the
//! marker is treated as the leftover of an interrupted run and is rebuilt.
//! On any failure both the scratch location and the partially-created data
//! directory are removed, so the filesystem never shows a half-extracted
//! resource as present.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::ScoError;
use crate::transport::Transport;

const COMPLETE_MARKER: &str = ".complete";

const TAR_SUFFIXES: [&str; 3] = [".tar", ".tar.gz", ".tgz"];

/// Whether the filename carries a recognized tar suffix.
pub fn has_tar_suffix(filename: &str) -> bool {
    TAR_SUFFIXES.iter().any(|suffix| filename.ends_with(suffix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    Tar,
    TarGz,
}

/// Map the declared content type of a download onto an archive format.
/// Anything other than a tar or gzip archive is a hard failure.
pub(crate) fn classify_content_type(content_type: &str) -> Result<ArchiveFormat, ScoError> {
    if content_type.contains("x-tar") {
        Ok(ArchiveFormat::Tar)
    } else if content_type.contains("gzip") {
        Ok(ArchiveFormat::TarGz)
    } else {
        Err(ScoError::UnexpectedFileType(content_type.to_string()))
    }
}

fn unpack(archive_path: &Path, format: ArchiveFormat, destination: &Path) -> Result<(), ScoError> {
    let file = File::open(archive_path).map_err(|err| ScoError::Filesystem(err.to_string()))?;
    let result = match format {
        ArchiveFormat::Tar => tar::Archive::new(file).unpack(destination),
        ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(destination),
    };
    result.map_err(|err| ScoError::InvalidArchive(err.to_string()))
}

/// Locate the anatomical-data root inside an extracted subject archive.
///
/// A directory qualifies if it directly contains both a `surf` and an `mri`
/// subdirectory. The search is depth-first and returns the first qualifying
/// directory.
pub(crate) fn find_anatomy_root(directory: &Path) -> Option<PathBuf> {
    if directory.join("surf").is_dir() && directory.join("mri").is_dir() {
        return Some(directory.to_path_buf());
    }
    let mut subdirs: Vec<PathBuf> = fs::read_dir(directory)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_anatomy_root(&subdir) {
            return Some(found);
        }
    }
    None
}

/// Materialize a subject archive into `base_dir/data`.
///
/// The archive is extracted to a scratch directory first; the anatomical
/// root located inside it has its top-level subdirectories moved into the
/// data directory. Returns the absolute data directory path.
pub fn materialize_subject<T: Transport>(
    transport: &T,
    download_url: &str,
    base_dir: &Utf8Path,
) -> Result<Utf8PathBuf, ScoError> {
    materialize(base_dir, |data_dir, scratch| {
        let archive = fetch_archive(transport, download_url, scratch)?;
        let unpacked = scratch.join("unpacked");
        fs::create_dir(&unpacked).map_err(|err| ScoError::Filesystem(err.to_string()))?;
        unpack(&archive.0, archive.1, &unpacked)?;
        let anatomy_root = find_anatomy_root(&unpacked).ok_or(ScoError::InvalidSubjectDirectory)?;
        let entries =
            fs::read_dir(&anatomy_root).map_err(|err| ScoError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| ScoError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                let target = data_dir.as_std_path().join(entry.file_name());
                fs::rename(&path, &target).map_err(|err| ScoError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    })
}

/// Materialize an image-group archive by extracting it directly into
/// `base_dir/data`. Returns the absolute data directory path.
pub fn materialize_image_group<T: Transport>(
    transport: &T,
    download_url: &str,
    base_dir: &Utf8Path,
) -> Result<Utf8PathBuf, ScoError> {
    materialize(base_dir, |data_dir, scratch| {
        let archive = fetch_archive(transport, download_url, scratch)?;
        unpack(&archive.0, archive.1, data_dir.as_std_path())
    })
}

/// Shared materialization skeleton: marker check, scratch setup, cleanup of
/// the data directory on any failure, marker write on success.
fn materialize<F>(base_dir: &Utf8Path, extract: F) -> Result<Utf8PathBuf, ScoError>
where
    F: FnOnce(&Utf8Path, &Path) -> Result<(), ScoError>,
{
    let data_dir = base_dir.join("data");
    let marker = base_dir.join(COMPLETE_MARKER);
    if data_dir.as_std_path().is_dir() {
        if marker.as_std_path().is_file() {
            debug!(%data_dir, "data directory already materialized");
            return Ok(data_dir);
        }
        // Leftover of an interrupted extraction; rebuild from scratch.
        fs::remove_dir_all(data_dir.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
    }
    fs::create_dir_all(data_dir.as_std_path())
        .map_err(|err| ScoError::Filesystem(err.to_string()))?;
    // Scratch inside the base directory keeps moves on one filesystem; the
    // TempDir guard removes it on every exit path.
    let scratch = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(base_dir.as_std_path())
        .map_err(|err| ScoError::Filesystem(err.to_string()))?;
    if let Err(err) = extract(&data_dir, scratch.path()) {
        let _ = fs::remove_dir_all(data_dir.as_std_path());
        return Err(err);
    }
    fs::write(marker.as_std_path(), b"").map_err(|err| ScoError::Filesystem(err.to_string()))?;
    info!(%data_dir, "materialized resource data");
    Ok(data_dir)
}

fn fetch_archive<T: Transport>(
    transport: &T,
    url: &str,
    scratch: &Path,
) -> Result<(PathBuf, ArchiveFormat), ScoError> {
    let downloaded = transport.download(url, scratch)?;
    let format = classify_content_type(&downloaded.content_type)?;
    debug!(url, ?format, "downloaded resource archive");
    Ok((downloaded.path, format))
}
