//! Base handle for Web API resources.

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScoError;
use crate::rest::{Links, REF_SELF, Reference};

/// Timestamp format used by the Web API (ISO-8601, UTC, microseconds).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameValuePair {
    pub name: String,
    pub value: Value,
}

/// Raw resource representation as returned by the Web API.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceObject {
    pub id: String,
    pub name: String,
    pub timestamp: String,
    pub links: Vec<Reference>,
    #[serde(default)]
    pub properties: Option<Vec<KeyValuePair>>,
}

/// Generic handle for one Web API resource.
///
/// Immutable once constructed; a fresh fetch is required to observe
/// server-side changes. `properties` is populated only when additional
/// attributes were requested at listing time — callers must not assume it
/// is present.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub identifier: String,
    pub name: String,
    /// Creation timestamp, converted from UTC to the local time zone.
    pub timestamp: DateTime<Local>,
    /// Self reference URL.
    pub url: String,
    pub links: Links,
    pub properties: Option<HashMap<String, String>>,
}

impl ResourceHandle {
    pub fn from_object(object: ResourceObject) -> Result<Self, ScoError> {
        let links = Links::from_references(&object.links);
        let url = links.get(REF_SELF)?.to_string();
        let timestamp = parse_timestamp(&object.timestamp)?;
        let properties = object.properties.map(|pairs| {
            pairs
                .into_iter()
                .map(|pair| (pair.key, value_to_string(&pair.value)))
                .collect()
        });
        Ok(Self {
            identifier: object.id,
            name: object.name,
            timestamp,
            url,
            links,
            properties,
        })
    }

    pub fn from_json(value: Value) -> Result<Self, ScoError> {
        let object: ResourceObject = serde_json::from_value(value)
            .map_err(|err| ScoError::ResourceUnavailable(err.to_string()))?;
        Self::from_object(object)
    }

    /// Whether the resource has a downloadable file associated with it.
    pub fn has_file(&self) -> bool {
        self.links.contains(crate::rest::REF_DOWNLOAD)
    }
}

/// Parse a Web API timestamp and convert it to local time. One-way; the
/// original UTC string is not retained.
pub(crate) fn parse_timestamp(timestamp: &str) -> Result<DateTime<Local>, ScoError> {
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| ScoError::InvalidTimestamp(timestamp.to_string()))?;
    Ok(naive.and_utc().with_timezone(&Local))
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
