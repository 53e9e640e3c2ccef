use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;
use serde_json::Map;
use serde_json::Value;

use super::device::Device;
use super::device::DeviceDescription;
use super::device::PropertyChange;
use super::device::PropertyDescription;
use super::error::SyncError;

/// Where a reconciliation response came from.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    /// Property whose endpoint was fetched
    pub property: &'a str,
    /// That property's generation when the request was issued
    pub generation: u64,
}

/// Outcome of applying a flat `{name: value}` response to a device.
#[derive(Debug, Default, PartialEq)]
pub struct Reconciliation {
    /// Properties whose cached value was overwritten, in response order
    pub changes: Vec<PropertyChange>,
    /// Keys naming no property of the device
    pub unknown: Vec<String>,
    /// Keys dropped because the property was written after the request
    pub stale: Vec<String>,
}

/// Every device this adapter has created, keyed by device id.
///
/// Also owns the id counter: ids are `<adapter name>:<n>` with `n` counting
/// up from 1 for the lifetime of the adapter.
#[derive(Debug)]
pub struct DeviceRegistry {
    adapter_name: String,
    next_id: AtomicU64,
    devices: Mutex<IndexMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new(adapter_name: impl Into<String>) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            next_id: AtomicU64::new(1),
            devices: Mutex::new(IndexMap::new()),
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}", self.adapter_name, n)
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Device>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, device: Device) -> DeviceDescription {
        let description = device.snapshot();
        self.lock().insert(device.id.clone(), device);
        description
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceDescription> {
        self.lock().get(device_id).map(Device::snapshot)
    }

    pub fn devices(&self) -> Vec<DeviceDescription> {
        self.lock().values().map(Device::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Look a property up by name on one device.
    pub fn find_property(&self, device_id: &str, name: &str) -> Option<PropertyDescription> {
        self.lock()
            .get(device_id)
            .and_then(|d| d.find_property(name))
            .map(|p| p.snapshot())
    }

    /// Endpoint and current generation of a property.
    pub(crate) fn endpoint(&self, device_id: &str, name: &str) -> Result<(String, u64), SyncError> {
        let devices = self.lock();
        let device = devices
            .get(device_id)
            .ok_or_else(|| SyncError::UnknownDevice(device_id.to_string()))?;
        let property = device
            .find_property(name)
            .ok_or_else(|| SyncError::UnknownProperty {
                device_id: device_id.to_string(),
                name: name.to_string(),
            })?;
        Ok((property.endpoint(&device.url), property.generation()))
    }

    /// Optimistically cache a locally written value.
    ///
    /// Returns the change to announce, the property endpoint, and the
    /// generation the write was recorded under.
    pub(crate) fn write_local(
        &self,
        device_id: &str,
        name: &str,
        value: Value,
    ) -> Result<(PropertyChange, String, u64), SyncError> {
        let mut devices = self.lock();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| SyncError::UnknownDevice(device_id.to_string()))?;
        let url = device.url.clone();
        let property = device
            .find_property_mut(name)
            .ok_or_else(|| SyncError::UnknownProperty {
                device_id: device_id.to_string(),
                name: name.to_string(),
            })?;

        property.set_cached_value(value);
        let generation = property.bump_generation();
        Ok((property.change(), property.endpoint(&url), generation))
    }

    /// Overwrite cached values from a device response.
    ///
    /// Every key is matched against the device's properties by name, not just
    /// the one whose endpoint was fetched. With `discard_stale` set, the
    /// origin property's own key is skipped when it was written locally after
    /// the request went out.
    pub(crate) fn apply(
        &self,
        device_id: &str,
        updates: Map<String, Value>,
        origin: Origin<'_>,
        discard_stale: bool,
    ) -> Result<Reconciliation, SyncError> {
        let mut devices = self.lock();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| SyncError::UnknownDevice(device_id.to_string()))?;

        let mut result = Reconciliation::default();
        for (name, value) in updates {
            let Some(property) = device.find_property_mut(&name) else {
                result.unknown.push(name);
                continue;
            };

            if discard_stale && name == origin.property && property.generation() != origin.generation {
                result.stale.push(name);
                continue;
            }

            property.set_cached_value(value);
            result.changes.push(property.change());
        }

        Ok(result)
    }
}
