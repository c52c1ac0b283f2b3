//! Stimulus image group resources.

use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::archive::{self, has_tar_suffix};
use crate::error::ScoError;
use crate::resource::{NameValuePair, ResourceHandle, ResourceObject};
use crate::rest::{
    ListingObject, ListingOptions, NestedResource, REF_SELF, REF_UPDATE_OPTIONS,
    REF_UPSERT_PROPERTIES, links_from_response, options_payload, properties_payload,
};
use crate::store::{ResourceStore, write_bytes_atomic};
use crate::transport::Transport;

/// Sidecar file recording the ordered image list of a materialized group.
const IMAGES_SIDECAR: &str = ".images";

#[derive(Debug, Deserialize)]
struct ImageGroupObject {
    #[serde(flatten)]
    resource: ResourceObject,
    #[serde(default)]
    options: Vec<NameValuePair>,
    images: NestedResource,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    #[serde(default)]
    folder: String,
    name: String,
}

/// Image group resource with its images extracted on local disk.
///
/// The image order is persisted in a `.images` sidecar next to the data
/// directory so it stays stable across repeated materializations without
/// another server round trip.
#[derive(Debug, Clone)]
pub struct ImageGroupHandle {
    pub resource: ResourceHandle,
    /// Image group options, e.g. `pixels_per_degree`.
    pub options: HashMap<String, Value>,
    pub data_dir: Utf8PathBuf,
    /// Absolute paths of the group's images, in server order.
    pub images: Vec<Utf8PathBuf>,
}

impl ImageGroupHandle {
    pub(crate) fn fetch<T: Transport>(
        transport: &T,
        store: &ResourceStore,
        url: &str,
    ) -> Result<Self, ScoError> {
        let body = transport.get_json(url)?;
        let object: ImageGroupObject = serde_json::from_value(body)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let images_url = object.images.self_url()?;
        let options = object
            .options
            .into_iter()
            .map(|pair| (pair.name, pair.value))
            .collect();
        let resource = ResourceHandle::from_object(object.resource)?;
        let download_url = resource.links.get(crate::rest::REF_DOWNLOAD)?.to_string();
        let base_dir = store.image_group_dir(&resource.identifier);
        fs::create_dir_all(base_dir.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        let data_dir = archive::materialize_image_group(transport, &download_url, &base_dir)?;
        let images = load_images(transport, &base_dir, &data_dir, &images_url)?;
        Ok(Self {
            resource,
            options,
            data_dir,
            images,
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

/// Ordered image list for a materialized group.
///
/// On first materialization the full (unpaginated) image listing is fetched
/// from the API and written to the sidecar, one relative path per line with
/// the single leading separator stripped from the server's folder field.
/// Afterwards the sidecar is read back verbatim instead of calling the API.
fn load_images<T: Transport>(
    transport: &T,
    base_dir: &Utf8Path,
    data_dir: &Utf8Path,
    images_url: &str,
) -> Result<Vec<Utf8PathBuf>, ScoError> {
    let sidecar = base_dir.join(IMAGES_SIDECAR);
    if sidecar.as_std_path().is_file() {
        let content = fs::read_to_string(sidecar.as_std_path())
            .map_err(|err| ScoError::Filesystem(err.to_string()))?;
        return Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| data_dir.join(line.trim()))
            .collect());
    }
    debug!(images_url, "fetching image listing for sidecar");
    let listing_url = ListingOptions::unlimited().decorate(images_url);
    let body = transport.get_json(&listing_url)?;
    let listing: ListingObject = serde_json::from_value(body)
        .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
    let mut lines = String::new();
    let mut images = Vec::new();
    for item in listing.items {
        let item: ImageItem = serde_json::from_value(item)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        let folder = item.folder.strip_prefix('/').unwrap_or(&item.folder);
        let relative = format!("{folder}{}", item.name);
        lines.push_str(&relative);
        lines.push('\n');
        images.push(data_dir.join(&relative));
    }
    write_bytes_atomic(&sidecar, lines.as_bytes())?;
    Ok(images)
}

/// Create a new image group by uploading a local tar archive of images.
///
/// Options and properties are applied after the upload through the created
/// resource's update links; each payload is validated as a mapping right
/// before its own call, so one may be applied even if the other fails.
/// Returns the URL of the created resource.
pub(crate) fn create<T: Transport>(
    transport: &T,
    create_url: &str,
    file: &Utf8Path,
    options: Option<&Value>,
    properties: Option<&Value>,
) -> Result<String, ScoError> {
    if !has_tar_suffix(file.as_str()) {
        return Err(ScoError::InvalidFileSuffix(file.to_string()));
    }
    let response = transport.upload_file(create_url, file)?;
    let links = links_from_response(&response)?;
    let resource_url = links.get(REF_SELF)?.to_string();
    if let Some(options) = options {
        let payload = options_payload(options)?;
        transport.post_json(
            links.get(REF_UPDATE_OPTIONS)?,
            &serde_json::json!({ "options": payload }),
        )?;
    }
    if let Some(properties) = properties {
        let payload = properties_payload(properties)?;
        transport.post_json(
            links.get(REF_UPSERT_PROPERTIES)?,
            &serde_json::json!({ "properties": payload }),
        )?;
    }
    Ok(resource_url)
}
