//! Anatomy subject resources.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::archive::{self, has_tar_suffix};
use crate::error::ScoError;
use crate::resource::ResourceHandle;
use crate::rest::{
    REF_DOWNLOAD, REF_SELF, REF_UPSERT_PROPERTIES, links_from_response, properties_payload,
};
use crate::store::ResourceStore;
use crate::transport::Transport;

/// Subject resource with its anatomy data materialized on local disk.
///
/// The data directory holds the contents of the anatomical root found
/// inside the subject's tar archive (the directory containing `surf/` and
/// `mri/`). Materialization happens on first construction against a given
/// store; afterwards the existing directory is trusted.
#[derive(Debug, Clone)]
pub struct SubjectHandle {
    pub resource: ResourceHandle,
    pub data_dir: Utf8PathBuf,
}

impl SubjectHandle {
    pub(crate) fn fetch<T: Transport>(
        transport: &T,
        store: &ResourceStore,
        url: &str,
    ) -> Result<Self, ScoError> {
        let body = transport.get_json(url)?;
        let resource = ResourceHandle::from_json(body)?;
        let download_url = resource.links.get(REF_DOWNLOAD)?.to_string();
        let base_dir = store.subject_dir(&resource.identifier);
        std::fs::create_dir_all(base_dir.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let data_dir = archive::materialize_subject(transport, &download_url, &base_dir)?;
        Ok(Self { resource, data_dir })
    }

    pub fn identifier(&self) -> &str {
        &self.resource.identifier
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }

    pub fn url(&self) -> &str {
        &self.resource.url
    }
}

/// Create a new subject by uploading a local tar archive. Returns the URL
/// of the created resource.
pub(crate) fn create<T: Transport>(
    transport: &T,
    create_url: &str,
    file: &Utf8Path,
    properties: Option<&Value>,
) -> Result<String, ScoError> {
    if !has_tar_suffix(file.as_str()) {
        return Err(ScoError::InvalidFileSuffix(file.to_string()));
    }
    let response = transport.upload_file(create_url, file)?;
    let links = links_from_response(&response)?;
    let resource_url = links.get(REF_SELF)?.to_string();
    if let Some(properties) = properties {
        let payload = properties_payload(properties)?;
        transport.post_json(
            links.get(REF_UPSERT_PROPERTIES)?,
            &serde_json::json!({ "properties": payload }),
        )?;
    }
    Ok(resource_url)
}
