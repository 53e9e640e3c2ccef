mod client;
mod dedup;
mod device;
mod error;
mod host;
mod model;
mod prober;
mod registry;
mod session;
pub mod ssdp;
mod sync;
#[allow(clippy::module_inception)]
mod adapter;

pub use adapter::Adapter;
pub use client::HttpClient;
pub use client::ReqwestClient;
pub use dedup::SeenLocations;
pub use device::Device;
pub use device::DeviceDescription;
pub use device::Property;
pub use device::PropertyChange;
pub use device::PropertyDescription;
pub use error::FetchError;
pub use error::PairingError;
pub use error::ProbeError;
pub use error::SyncError;
pub use host::DeviceRegistrar;
pub use host::Host;
pub use host::PropertyNotifier;
pub use model::DeviceDescriptor;
pub use model::PropertyDescriptor;
pub use model::parse_probe_document;
pub use prober::Prober;
pub use registry::DeviceRegistry;
pub use registry::Reconciliation;
pub use session::PairingSession;
pub use sync::PropertySync;

#[cfg(test)]
pub(crate) use client::MockHttpClient;
#[cfg(test)]
pub(crate) use host::RecordingHost;
