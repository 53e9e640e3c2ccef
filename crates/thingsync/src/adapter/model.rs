//! Wire shapes of the probe endpoint.
//!
//! A location answers with either a single device object
//!
//! ```json
//! {"name": "lamp", "type": "light", "properties": {"on": {"href": "/on", "value": false}}}
//! ```
//!
//! or a mapping of arbitrary keys to such objects. A top-level object that
//! has a `properties` key is treated as the single form.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use super::error::ProbeError;

/// Description of one property as sent by the device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PropertyDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Path appended to the device URL to reach this property
    pub href: String,

    /// Initial value, cached until the first refresh answers
    #[serde(default)]
    pub value: Value,

    /// Anything else the device says about the property (type, title,
    /// bounds, ...). Carried along, never interpreted.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// A device object as it appears in the probe response.
#[derive(Debug, Deserialize)]
struct DeviceObject {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    description: Option<String>,
    properties: IndexMap<String, PropertyDescriptor>,
}

/// A fully-resolved device description, ready to become a `Device`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub kind: String,
    pub description: String,
    /// Base URL that property hrefs are appended to
    pub url: String,
    pub properties: IndexMap<String, PropertyDescriptor>,
}

impl DeviceDescriptor {
    fn from_object(object: DeviceObject, url: &str, fallback_name: &str) -> Self {
        Self {
            name: object.name.unwrap_or_else(|| fallback_name.to_string()),
            kind: object.kind,
            description: object.description.unwrap_or_default(),
            url: url.to_string(),
            properties: object.properties,
        }
    }
}

/// Turn the JSON body fetched from `url` into device descriptors.
///
/// In the mapping form, entries that are not device objects are skipped with
/// a warning; the document is only rejected when nothing usable remains.
pub fn parse_probe_document(url: &str, document: Value) -> Result<Vec<DeviceDescriptor>, ProbeError> {
    let Value::Object(map) = document else {
        return Err(ProbeError::Document {
            url: url.to_string(),
            reason: "top-level JSON is not an object".to_string(),
        });
    };

    if map.contains_key("properties") {
        let object: DeviceObject =
            serde_json::from_value(Value::Object(map)).map_err(|e| ProbeError::Document {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(vec![DeviceDescriptor::from_object(object, url, url)]);
    }

    let mut devices = Vec::new();
    for (key, value) in map {
        match serde_json::from_value::<DeviceObject>(value) {
            Ok(object) => devices.push(DeviceDescriptor::from_object(object, url, &key)),
            Err(e) => warn!("Skipping entry {:?} at {}: {}", key, url, e),
        }
    }

    if devices.is_empty() {
        return Err(ProbeError::Document {
            url: url.to_string(),
            reason: "no device objects found".to_string(),
        });
    }

    Ok(devices)
}
