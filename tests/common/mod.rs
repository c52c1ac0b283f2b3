#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use camino::Utf8Path;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;

use sco_client::error::ScoError;
use sco_client::transport::{DownloadedFile, Transport};

/// One mocked download payload.
#[derive(Clone)]
pub struct MockFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Default)]
struct Inner {
    responses: Mutex<HashMap<String, Value>>,
    files: Mutex<HashMap<String, MockFile>>,
    // trigger URL -> (GET URL to replace, new body); applied after a
    // successful post/upload to that trigger.
    effects: Mutex<HashMap<String, (String, Value)>>,
    get_calls: Mutex<Vec<String>>,
    post_calls: Mutex<Vec<String>>,
    post_bodies: Mutex<Vec<(String, Value)>>,
    upload_calls: Mutex<Vec<String>>,
    download_calls: Mutex<Vec<String>>,
}

/// Hand-written mock transport; every request is recorded so tests can
/// assert that no (or exactly N) network calls were made.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_json(&self, url: &str, body: Value) {
        self.inner
            .responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    pub fn set_file(&self, url: &str, file: MockFile) {
        self.inner
            .files
            .lock()
            .unwrap()
            .insert(url.to_string(), file);
    }

    /// After a successful POST/upload to `trigger`, replace the GET
    /// response of `target` with `body`.
    pub fn set_effect(&self, trigger: &str, target: &str, body: Value) {
        self.inner
            .effects
            .lock()
            .unwrap()
            .insert(trigger.to_string(), (target.to_string(), body));
    }

    pub fn get_count(&self) -> usize {
        self.inner.get_calls.lock().unwrap().len()
    }

    pub fn post_count(&self) -> usize {
        self.inner.post_calls.lock().unwrap().len()
    }

    pub fn upload_count(&self) -> usize {
        self.inner.upload_calls.lock().unwrap().len()
    }

    pub fn download_count(&self) -> usize {
        self.inner.download_calls.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.inner.get_calls.lock().unwrap().clone()
    }

    pub fn post_calls(&self) -> Vec<String> {
        self.inner.post_calls.lock().unwrap().clone()
    }

    pub fn post_bodies(&self) -> Vec<(String, Value)> {
        self.inner.post_bodies.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.inner.download_calls.lock().unwrap().clone()
    }

    fn apply_effect(&self, trigger: &str) {
        if let Some((target, body)) = self.inner.effects.lock().unwrap().get(trigger).cloned() {
            self.set_json(&target, body);
        }
    }
}

impl Transport for MockTransport {
    fn get_json(&self, url: &str) -> Result<Value, ScoError> {
        self.inner.get_calls.lock().unwrap().push(url.to_string());
        self.inner
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScoError::ResourceUnavailable(format!("no mock response for {url}")))
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value, ScoError> {
        self.inner.post_calls.lock().unwrap().push(url.to_string());
        self.inner
            .post_bodies
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        let response = self
            .inner
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScoError::ResourceUnavailable(format!("no mock response for {url}")))?;
        self.apply_effect(url);
        Ok(response)
    }

    fn upload_file(&self, url: &str, file: &Utf8Path) -> Result<Value, ScoError> {
        self.inner
            .upload_calls
            .lock()
            .unwrap()
            .push(url.to_string());
        let response = self
            .inner
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScoError::InvalidFile(file.to_string()))?;
        self.apply_effect(url);
        Ok(response)
    }

    fn download(&self, url: &str, into_dir: &Path) -> Result<DownloadedFile, ScoError> {
        self.inner
            .download_calls
            .lock()
            .unwrap()
            .push(url.to_string());
        let file = self
            .inner
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ScoError::ResourceUnavailable(format!("no mock file for {url}")))?;
        let path = into_dir.join("download");
        fs::write(&path, &file.bytes).map_err(|err| ScoError::Filesystem(err.to_string()))?;
        Ok(DownloadedFile {
            path,
            content_type: file.content_type,
            file_name: file.file_name,
        })
    }
}

/// Build a tar archive of the given fixture directory, rooted under
/// `prefix` inside the archive.
pub fn tar_of_dir(prefix: &str, root: &Path) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(prefix, root).unwrap();
    builder.into_inner().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    std::io::Write::write_all(&mut encoder, bytes).unwrap();
    encoder.finish().unwrap()
}

/// A subject archive: anatomy root nested one level down, containing
/// `surf/` and `mri/` with one file each.
pub fn subject_archive() -> Vec<u8> {
    let fixture = tempfile::tempdir().unwrap();
    let anatomy = fixture.path().join("subj1");
    fs::create_dir_all(anatomy.join("surf")).unwrap();
    fs::create_dir_all(anatomy.join("mri")).unwrap();
    fs::write(anatomy.join("surf").join("lh.white"), b"surface").unwrap();
    fs::write(anatomy.join("mri").join("T1.mgz"), b"volume").unwrap();
    tar_of_dir("upload", fixture.path())
}

/// An image-group archive containing the given image files at its root.
pub fn image_archive(names: &[&str]) -> Vec<u8> {
    let fixture = tempfile::tempdir().unwrap();
    for name in names {
        fs::write(fixture.path().join(name), b"png").unwrap();
    }
    tar_of_dir("", fixture.path())
}
