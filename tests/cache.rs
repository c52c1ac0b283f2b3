mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use common::{MockFile, MockTransport};
use sco_client::cache::{DownloadCache, FileManager, TempFiles};
use sco_client::error::ScoError;

const FILE_URL: &str = "http://api/subjects/s1/file";

fn cached_file() -> MockFile {
    MockFile {
        bytes: b"archive bytes".to_vec(),
        content_type: "application/x-tar".to_string(),
        file_name: Some("subj1.tar".to_string()),
    }
}

fn cache_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap()
}

#[test]
fn get_file_is_idempotent_and_downloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    transport.set_file(FILE_URL, cached_file());
    let cache = DownloadCache::new(transport.clone(), cache_root(&dir)).unwrap();

    let first = cache.get_file(FILE_URL).unwrap();
    let second = cache.get_file(FILE_URL).unwrap();

    assert_eq!(first, second);
    assert!(first.ends_with("subj1.tar"));
    assert_eq!(fs::read(first.as_std_path()).unwrap(), b"archive bytes");
    assert_eq!(transport.download_count(), 1);
}

#[test]
fn index_survives_a_new_cache_instance() {
    let dir = tempfile::tempdir().unwrap();
    let root = cache_root(&dir);
    let transport = MockTransport::new();
    transport.set_file(FILE_URL, cached_file());
    let cache = DownloadCache::new(transport, root.clone()).unwrap();
    let first = cache.get_file(FILE_URL).unwrap();
    drop(cache);

    // Fresh transport with no file registered: a download attempt would
    // fail, so a hit proves the reloaded index was used.
    let offline = MockTransport::new();
    let cache = DownloadCache::new(offline.clone(), root).unwrap();
    let second = cache.get_file(FILE_URL).unwrap();

    assert_eq!(first, second);
    assert_eq!(offline.download_count(), 0);
}

#[test]
fn failed_download_writes_no_index_entry() {
    let dir = tempfile::tempdir().unwrap();
    let root = cache_root(&dir);
    let transport = MockTransport::new();
    let cache = DownloadCache::new(transport.clone(), root.clone()).unwrap();

    let err = cache.get_file(FILE_URL).unwrap_err();
    assert_matches!(err, ScoError::ResourceUnavailable(_));
    let index = root.join("db.tsv");
    assert!(!index.as_std_path().exists());

    // The entry appears once a download succeeds.
    transport.set_file(FILE_URL, cached_file());
    cache.get_file(FILE_URL).unwrap();
    let content = fs::read_to_string(index.as_std_path()).unwrap();
    assert!(content.starts_with(FILE_URL));
    assert!(content.contains('\t'));
}

#[test]
fn missing_attachment_name_falls_back_to_url_segment() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    transport.set_file(
        FILE_URL,
        MockFile {
            bytes: b"x".to_vec(),
            content_type: "application/x-tar".to_string(),
            file_name: None,
        },
    );
    let cache = DownloadCache::new(transport, cache_root(&dir)).unwrap();
    let path = cache.get_file(FILE_URL).unwrap();
    assert!(path.ends_with("file"));
}

#[test]
fn temp_files_download_every_time_and_clean_up_on_drop() {
    let transport = MockTransport::new();
    transport.set_file(FILE_URL, cached_file());
    let files = TempFiles::new(transport.clone()).unwrap();

    let first = files.get_file(FILE_URL).unwrap();
    let second = files.get_file(FILE_URL).unwrap();

    assert_ne!(first, second);
    assert_eq!(transport.download_count(), 2);
    assert!(first.as_std_path().exists());

    drop(files);
    assert!(!first.as_std_path().exists());
    assert!(!second.as_std_path().exists());
}
