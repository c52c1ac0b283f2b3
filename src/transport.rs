//! Blocking HTTP transport for the SCO Web API.
//!
//! All network access goes through the [`Transport`] trait so that client
//! behavior can be exercised against hand-written mocks in tests. The
//! [`HttpTransport`] implementation wraps a `reqwest` blocking client;
//! every call blocks until completion and no retries are performed — the
//! caller decides on retry policy.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::ScoError;

/// Metadata for one completed download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Location of the downloaded bytes.
    pub path: PathBuf,
    /// Declared content type, empty if the server sent none.
    pub content_type: String,
    /// Original filename from the content-disposition header, if any.
    pub file_name: Option<String>,
}

pub trait Transport: Send + Sync {
    /// GET the given URL and parse the response body as JSON.
    fn get_json(&self, url: &str) -> Result<Value, ScoError>;

    /// POST a JSON body and parse the JSON response.
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, ScoError>;

    /// Upload a local file as a multipart body. Any response other than
    /// "201 Created" means the server rejected the file.
    fn upload_file(&self, url: &str, file: &Utf8Path) -> Result<Value, ScoError>;

    /// Download the resource into the given directory.
    fn download(&self, url: &str, into_dir: &Path) -> Result<DownloadedFile, ScoError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ScoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sco-client/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        Ok(Self { client })
    }

    fn read_json(response: reqwest::blocking::Response) -> Result<Value, ScoError> {
        let response = check_success(response)?;
        response
            .json()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str) -> Result<Value, ScoError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        Self::read_json(response)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value, ScoError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        Self::read_json(response)
    }

    fn upload_file(&self, url: &str, file: &Utf8Path) -> Result<Value, ScoError> {
        let form = reqwest::blocking::multipart::Form::new()
            .file("file", file.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        if response.status() != reqwest::StatusCode::CREATED {
            return Err(ScoError::InvalidFile(file.to_string()));
        }
        response
            .json()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))
    }

    fn download(&self, url: &str, into_dir: &Path) -> Result<DownloadedFile, ScoError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let mut response = check_success(response)?;
        let content_type = header_value(response.headers().get(CONTENT_TYPE));
        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename);
        let path = into_dir.join("download");
        let mut file =
            File::create(&path).map_err(|err| ScoError::Filesystem(err.to_string()))?;
        io::copy(&mut response, &mut file)
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        Ok(DownloadedFile {
            path,
            content_type,
            file_name,
        })
    }
}

fn check_success(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ScoError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "request failed".to_string());
    Err(ScoError::ResourceUnavailable(format!(
        "status {status}: {message}"
    )))
}

fn header_value(value: Option<&HeaderValue>) -> String {
    value
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Extract the original filename from a content-disposition header value.
/// Trailing parameters after a semicolon and surrounding quotes are removed.
pub(crate) fn attachment_filename(header: &str) -> Option<String> {
    let start = header.find("filename=")? + "filename=".len();
    let mut name = &header[start..];
    if let Some(end) = name.find(';') {
        name = &name[..end];
    }
    let name = name.trim().trim_matches('"').to_string();
    if name.is_empty() { None } else { Some(name) }
}
