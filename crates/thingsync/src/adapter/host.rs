//! The narrow surface the adapter needs from whatever hosts it.

use async_trait::async_trait;

use super::device::DeviceDescription;
use super::device::PropertyChange;

/// Sink for newly discovered devices.
#[async_trait]
pub trait DeviceRegistrar: Send + Sync {
    async fn register_device(&self, device: &DeviceDescription);
}

/// Sink for cached-value changes.
#[async_trait]
pub trait PropertyNotifier: Send + Sync {
    async fn property_changed(&self, change: &PropertyChange);
}

/// Both sinks together.
pub trait Host: DeviceRegistrar + PropertyNotifier {}

impl<T: DeviceRegistrar + PropertyNotifier> Host for T {}

#[cfg(test)]
pub use recording::{HostEvent, RecordingHost};
