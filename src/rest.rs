//! HATEOAS reference handling and listing query construction.
//!
//! Every SCO Web API resource carries a list of `{rel, href}` references.
//! [`Links`] turns that list into a lookup table so callers never hardcode
//! URL templates. Listing endpoints accept `offset`, `limit` and a
//! comma-separated `properties` attribute selection, built by
//! [`ListingOptions`].

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ScoError;
use crate::resource::ResourceHandle;
use crate::transport::Transport;

// HATEOAS reference keys used by the SCO Web API.
pub const REF_SELF: &str = "self";
pub const REF_DOWNLOAD: &str = "download";
pub const REF_SUBJECTS_LIST: &str = "subjects.list";
pub const REF_SUBJECTS_CREATE: &str = "subjects.upload";
pub const REF_IMAGE_GROUPS_LIST: &str = "images.groups.list";
pub const REF_IMAGE_GROUPS_CREATE: &str = "images.upload";
pub const REF_EXPERIMENTS_LIST: &str = "experiments.list";
pub const REF_EXPERIMENTS_CREATE: &str = "experiments.create";
pub const REF_UPDATE_OPTIONS: &str = "options";
pub const REF_UPSERT_PROPERTIES: &str = "properties";
pub const REF_FMRI_CREATE: &str = "fmri.upload";
pub const REF_RUNS_LIST: &str = "predictions.list";
pub const REF_RUNS_CREATE: &str = "predictions.run";
pub const REF_STATE_ACTIVE: &str = "state.active";
pub const REF_STATE_SUCCESS: &str = "state.success";
pub const REF_STATE_ERROR: &str = "state.error";

// Query parameters for resource listings.
pub const QPARA_OFFSET: &str = "offset";
pub const QPARA_LIMIT: &str = "limit";
pub const QPARA_ATTRIBUTES: &str = "properties";

/// A single HATEOAS reference as returned by the Web API.
#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub rel: String,
    pub href: String,
}

/// Lookup table of relation name to URL for one resource.
#[derive(Debug, Clone, Default)]
pub struct Links(HashMap<String, String>);

impl Links {
    pub fn from_references(references: &[Reference]) -> Self {
        let mut table = HashMap::new();
        for reference in references {
            table.insert(reference.rel.clone(), reference.href.clone());
        }
        Self(table)
    }

    /// URL for the given relation name, or `MissingReference`.
    pub fn get(&self, rel: &str) -> Result<&str, ScoError> {
        self.0
            .get(rel)
            .map(String::as_str)
            .ok_or_else(|| ScoError::MissingReference(rel.to_string()))
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.0.contains_key(rel)
    }
}

/// Pagination and attribute selection for listing requests.
///
/// `limit` is signed because the API treats `limit=-1` as "no limit"; the
/// image-group materializer uses that to fetch the full image listing in one
/// request.
#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub offset: Option<u64>,
    pub limit: Option<i64>,
    pub properties: Option<Vec<String>>,
}

impl ListingOptions {
    pub fn unlimited() -> Self {
        Self {
            limit: Some(-1),
            ..Self::default()
        }
    }

    /// Append the listing query to the given URL.
    pub fn decorate(&self, url: &str) -> String {
        let mut query = Vec::new();
        if let Some(offset) = self.offset {
            query.push(format!("{QPARA_OFFSET}={offset}"));
        }
        if let Some(limit) = self.limit {
            query.push(format!("{QPARA_LIMIT}={limit}"));
        }
        if let Some(properties) = &self.properties {
            if !properties.is_empty() {
                query.push(format!("{QPARA_ATTRIBUTES}={}", properties.join(",")));
            }
        }
        if query.is_empty() {
            url.to_string()
        } else {
            format!("{url}?{}", query.join("&"))
        }
    }
}

/// Nested resource reference inside another representation, e.g. the
/// subject and image-group entries of an experiment.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NestedResource {
    pub links: Vec<Reference>,
}

impl NestedResource {
    pub(crate) fn self_url(&self) -> Result<String, ScoError> {
        Links::from_references(&self.links)
            .get(REF_SELF)
            .map(|url| url.to_string())
    }
}

/// Convert a JSON mapping of property values into the `{key, value}` list
/// the API expects. Anything that is not a mapping is rejected before any
/// network call.
pub(crate) fn properties_payload(properties: &serde_json::Value) -> Result<Vec<serde_json::Value>, ScoError> {
    let object = properties.as_object().ok_or(ScoError::InvalidPropertySet)?;
    Ok(object
        .iter()
        .map(|(key, value)| serde_json::json!({"key": key, "value": value}))
        .collect())
}

/// Convert a JSON mapping of option values into the `{name, value}` list
/// the API expects.
pub(crate) fn options_payload(options: &serde_json::Value) -> Result<Vec<serde_json::Value>, ScoError> {
    let object = options.as_object().ok_or(ScoError::InvalidOptionSet)?;
    Ok(object
        .iter()
        .map(|(name, value)| serde_json::json!({"name": name, "value": value}))
        .collect())
}

/// Read the HATEOAS link list out of a create/update response body.
pub(crate) fn links_from_response(response: &serde_json::Value) -> Result<Links, ScoError> {
    let references: Vec<Reference> = serde_json::from_value(
        response
            .get("links")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    )
    .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
    Ok(Links::from_references(&references))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingObject {
    pub count: u64,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Fetch a resource listing and convert each item into a [`ResourceHandle`].
///
/// When `options.properties` names additional attributes, the server includes
/// them as top-level fields of each item; they are copied into the handle's
/// property map. Without an attribute selection the property map stays unset.
pub(crate) fn get_resource_listing<T: Transport>(
    transport: &T,
    url: &str,
    options: &ListingOptions,
) -> Result<Vec<ResourceHandle>, ScoError> {
    let listing_url = options.decorate(url);
    let body = transport.get_json(&listing_url)?;
    let listing: ListingObject = serde_json::from_value(body)
        .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
    let mut resources = Vec::new();
    if listing.count == 0 {
        return Ok(resources);
    }
    for item in listing.items {
        let mut handle = ResourceHandle::from_json(item.clone())?;
        if let Some(properties) = &options.properties {
            let mut values = HashMap::new();
            for name in properties {
                if let Some(value) = item.get(name) {
                    values.insert(name.clone(), crate::resource::value_to_string(value));
                }
            }
            handle.properties = Some(values);
        }
        resources.push(handle);
    }
    Ok(resources)
}
