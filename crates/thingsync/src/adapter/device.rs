use indexmap::IndexMap;
use reqwest::Url;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::error::FetchError;
use super::model::DeviceDescriptor;
use super::model::PropertyDescriptor;

/// A property of a discovered device.
///
/// The owning device is referenced by id only; anything that needs the
/// device goes back through the registry.
#[derive(Debug, Clone)]
pub struct Property {
    pub device_id: String,
    pub name: String,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub href: String,
    pub metadata: Map<String, Value>,

    /// Locally cached value, authoritative until the next refresh
    value: Value,

    /// Bumped by every local write
    generation: u64,
}

impl Property {
    pub fn from_descriptor(device_id: &str, name: &str, descriptor: PropertyDescriptor) -> Self {
        Self {
            device_id: device_id.to_string(),
            name: name.to_string(),
            unit: descriptor.unit,
            description: descriptor.description,
            href: descriptor.href,
            metadata: descriptor.metadata,
            value: descriptor.value,
            generation: 0,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_cached_value(&mut self, value: Value) {
        self.value = value;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a local write, returning the new generation.
    pub(crate) fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Remote endpoint: the device URL with the href appended verbatim.
    pub fn endpoint(&self, device_url: &str) -> String {
        format!("{}{}", device_url, self.href)
    }

    pub fn change(&self) -> PropertyChange {
        PropertyChange {
            device_id: self.device_id.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }

    pub fn snapshot(&self) -> PropertyDescription {
        PropertyDescription {
            name: self.name.clone(),
            unit: self.unit.clone(),
            description: self.description.clone(),
            href: self.href.clone(),
            value: self.value.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Build the write URL: `<endpoint>?<name>=<value>`.
///
/// Strings are sent as-is, every other value as compact JSON text
/// (`true`, `42`, `[1,2]`). The pair is query-encoded.
pub fn write_url(endpoint: &str, name: &str, value: &Value) -> Result<String, FetchError> {
    let mut url = Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    url.query_pairs_mut().append_pair(name, &text);

    Ok(url.into())
}

/// A device discovered at some location.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub url: String,
    pub properties: IndexMap<String, Property>,
}

impl Device {
    pub fn from_descriptor(id: String, descriptor: DeviceDescriptor) -> Self {
        let properties = descriptor
            .properties
            .into_iter()
            .map(|(name, desc)| {
                let property = Property::from_descriptor(&id, &name, desc);
                (name, property)
            })
            .collect();

        Self {
            id,
            name: descriptor.name,
            kind: descriptor.kind,
            description: descriptor.description,
            url: descriptor.url,
            properties,
        }
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn find_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    pub fn snapshot(&self) -> DeviceDescription {
        DeviceDescription {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
            properties: self
                .properties
                .iter()
                .map(|(name, p)| (name.clone(), p.snapshot()))
                .collect(),
        }
    }
}

/// Snapshot of a device handed to the host on registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescription {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub url: String,
    pub properties: IndexMap<String, PropertyDescription>,
}

/// Snapshot of a property, also the answer to a lookup by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub href: String,
    pub value: Value,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// A property's cached value changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    pub device_id: String,
    pub name: String,
    pub value: Value,
}
