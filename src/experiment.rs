//! Experiment resources.
//!
//! An experiment pairs a subject with an image group; both are resolved
//! eagerly via their self references when the experiment is fetched, so
//! constructing an [`ExperimentHandle`] costs three HTTP round trips at
//! minimum (plus archive downloads on first materialization).

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::cache::FileManager;
use crate::error::ScoError;
use crate::image_group::ImageGroupHandle;
use crate::resource::{ResourceHandle, ResourceObject};
use crate::rest::{NestedResource, REF_DOWNLOAD, REF_SELF, links_from_response, properties_payload};
use crate::store::ResourceStore;
use crate::subject::SubjectHandle;
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
struct ExperimentObject {
    #[serde(flatten)]
    resource: ResourceObject,
    subject: NestedResource,
    images: NestedResource,
    #[serde(default)]
    fmri: Option<Value>,
}

/// Functional MRI data attached to an experiment. The single data file is
/// materialized through the client's file manager.
#[derive(Debug, Clone)]
pub struct FmriHandle {
    pub resource: ResourceHandle,
    pub data_file: Utf8PathBuf,
}

/// Experiment resource with its associated subject and image group.
#[derive(Debug, Clone)]
pub struct ExperimentHandle {
    pub resource: ResourceHandle,
    pub subject: SubjectHandle,
    pub image_group: ImageGroupHandle,
    /// Attached functional data, if any has been uploaded.
    pub fmri_data: Option<FmriHandle>,
}

impl ExperimentHandle {
    pub(crate) fn fetch<T: Transport>(
        transport: &T,
        files: &dyn FileManager,
        store: &ResourceStore,
        url: &str,
    ) -> Result<Self, ScoError> {
        let body = transport.get_json(url)?;
        let object: ExperimentObject = serde_json::from_value(body)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let subject = SubjectHandle::fetch(transport, store, &object.subject.self_url()?)?;
        let image_group = ImageGroupHandle::fetch(transport, store, &object.images.self_url()?)?;
        let fmri_data = match object.fmri {
            Some(value) => {
                let resource = ResourceHandle::from_json(value)?;
                let data_file = files.get_file(resource.links.get(REF_DOWNLOAD)?)?;
                Some(FmriHandle {
                    resource,
                    data_file,
                })
            }
            None => None,
        };
        let resource = ResourceHandle::from_object(object.resource)?;
        Ok(Self {
            resource,
            subject,
            image_group,
            fmri_data,
        })
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

/// Create a new experiment from existing subject and image-group
/// identifiers. The explicit `name` argument always wins over a
/// caller-supplied `name` property. Returns the URL of the created
/// resource.
pub(crate) fn create<T: Transport>(
    transport: &T,
    create_url: &str,
    name: &str,
    subject_id: &str,
    image_group_id: &str,
    properties: Option<&Value>,
) -> Result<String, ScoError> {
    let mut object_properties = vec![json!({"key": "name", "value": name})];
    if let Some(properties) = properties {
        for entry in properties_payload(properties)? {
            if entry.get("key").and_then(Value::as_str) != Some("name") {
                object_properties.push(entry);
            }
        }
    }
    let body = json!({
        "subject": subject_id,
        "images": image_group_id,
        "properties": object_properties,
    });
    let response = transport.post_json(create_url, &body)?;
    let links = links_from_response(&response)?;
    Ok(links.get(REF_SELF)?.to_string())
}
