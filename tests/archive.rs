mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use common::{MockFile, MockTransport, gzip, image_archive, subject_archive};
use sco_client::archive::{materialize_image_group, materialize_subject};
use sco_client::error::ScoError;

const DOWNLOAD_URL: &str = "http://api/subjects/s1/file";

fn base_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    let base = Utf8PathBuf::from_path_buf(dir.path().join("s1")).unwrap();
    fs::create_dir_all(base.as_std_path()).unwrap();
    base
}

fn tar_file(bytes: Vec<u8>) -> MockFile {
    MockFile {
        bytes,
        content_type: "application/x-tar".to_string(),
        file_name: Some("archive.tar".to_string()),
    }
}

fn gzip_file(bytes: Vec<u8>) -> MockFile {
    MockFile {
        bytes: gzip(&bytes),
        content_type: "application/gzip".to_string(),
        file_name: Some("archive.tar.gz".to_string()),
    }
}

#[test]
fn subject_archive_is_extracted_into_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, tar_file(subject_archive()));

    let data_dir = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap();

    assert_eq!(data_dir, base.join("data"));
    assert!(data_dir.join("surf").join("lh.white").as_std_path().is_file());
    assert!(data_dir.join("mri").join("T1.mgz").as_std_path().is_file());
    assert!(base.join(".complete").as_std_path().is_file());
    // Scratch directories are gone.
    let leftover: Vec<_> = fs::read_dir(base.as_std_path())
        .unwrap()
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".extract-"))
        .collect();
    assert!(leftover.is_empty());
}

#[test]
fn gzip_compressed_subject_archive_is_supported() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, gzip_file(subject_archive()));

    let data_dir = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap();
    assert!(data_dir.join("surf").as_std_path().is_dir());
}

#[test]
fn materialization_is_skipped_once_complete() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, tar_file(subject_archive()));

    materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap();
    materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap();

    assert_eq!(transport.download_count(), 1);
}

#[test]
fn data_dir_without_marker_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let stale = base.join("data").join("junk");
    fs::create_dir_all(stale.as_std_path()).unwrap();
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, tar_file(subject_archive()));

    let data_dir = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap();

    assert_eq!(transport.download_count(), 1);
    assert!(!stale.as_std_path().exists());
    assert!(data_dir.join("surf").as_std_path().is_dir());
}

#[test]
fn corrupt_archive_leaves_no_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, tar_file(b"this is not a tar archive".to_vec()));

    let err = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap_err();

    assert_matches!(err, ScoError::InvalidArchive(_));
    assert!(!base.join("data").as_std_path().exists());
    assert!(!base.join(".complete").as_std_path().exists());
}

#[test]
fn archive_without_anatomy_root_leaves_no_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(DOWNLOAD_URL, tar_file(image_archive(&["a.png"])));

    let err = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap_err();

    assert_matches!(err, ScoError::InvalidSubjectDirectory);
    assert!(!base.join("data").as_std_path().exists());
}

#[test]
fn unexpected_content_type_is_a_hard_failure() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(
        DOWNLOAD_URL,
        MockFile {
            bytes: b"<html></html>".to_vec(),
            content_type: "text/html".to_string(),
            file_name: None,
        },
    );

    let err = materialize_subject(&transport, DOWNLOAD_URL, &base).unwrap_err();

    assert_matches!(err, ScoError::UnexpectedFileType(_));
    assert!(!base.join("data").as_std_path().exists());
}

#[test]
fn image_group_archive_is_extracted_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let base = base_dir(&dir);
    let transport = MockTransport::new();
    transport.set_file(
        DOWNLOAD_URL,
        gzip_file(image_archive(&["validate_0000.png", "validate_0001.png"])),
    );

    let data_dir = materialize_image_group(&transport, DOWNLOAD_URL, &base).unwrap();

    assert!(data_dir.join("validate_0000.png").as_std_path().is_file());
    assert!(data_dir.join("validate_0001.png").as_std_path().is_file());
    assert!(base.join(".complete").as_std_path().is_file());
}
