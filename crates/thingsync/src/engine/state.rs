use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::adapter::DeviceDescription;

/// Last known state of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub url: String,
    /// Cached property values, in the order the device described them
    pub properties: IndexMap<String, Value>,
}

impl From<&DeviceDescription> for DeviceState {
    fn from(device: &DeviceDescription) -> Self {
        Self {
            name: device.name.clone(),
            kind: device.kind.clone(),
            description: device.description.clone(),
            url: device.url.clone(),
            properties: device
                .properties
                .iter()
                .map(|(name, p)| (name.clone(), p.value.clone()))
                .collect(),
        }
    }
}

/// Centralized snapshot of everything the engine knows, keyed by device id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub devices: BTreeMap<String, DeviceState>,
}
