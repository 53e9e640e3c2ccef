//! Property read/write protocol.
//!
//! Both flows end the same way: the device answers with a flat
//! `{name: value}` object and every named property of the device is
//! overwritten and announced. Responses are applied in arrival order, so a
//! slow refresh can undo a newer optimistic write unless stale discarding is
//! switched on.
//!
//! Every cache update of a device and the notifications it produces happen
//! under that device's notification lock, so the host sees changes in the
//! order the cache took them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::HttpClient;
use super::device::write_url;
use super::error::SyncError;
use super::host::Host;
use super::registry::DeviceRegistry;
use super::registry::Origin;
use super::registry::Reconciliation;

pub struct PropertySync {
    registry: Arc<DeviceRegistry>,
    client: Arc<dyn HttpClient>,
    host: Arc<dyn Host>,
    discard_stale: bool,
    /// One lock per device id, held from cache update until the host has
    /// been told about it
    notify_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PropertySync {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        client: Arc<dyn HttpClient>,
        host: Arc<dyn Host>,
        discard_stale: bool,
    ) -> Self {
        Self {
            registry,
            client,
            host,
            discard_stale,
            notify_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize cache updates and notifications for one device.
    pub(crate) async fn lock_device(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.notify_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(device_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Fetch a property's endpoint and reconcile the answer.
    pub async fn refresh(&self, device_id: &str, name: &str) -> Result<Reconciliation, SyncError> {
        let (url, generation) = self.registry.endpoint(device_id, name)?;
        info!("Fetching {}", url);

        let response = self.client.get_json(&url).await?;
        let origin = Origin {
            property: name,
            generation,
        };
        self.reconcile(device_id, &url, response, origin).await
    }

    /// Run [`refresh`](Self::refresh) in the background, logging any failure.
    pub fn spawn_refresh(self: &Arc<Self>, device_id: String, name: String) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = sync.refresh(&device_id, &name).await {
                log_failure("refresh", &device_id, &name, &e);
            }
        })
    }

    /// Write a value.
    ///
    /// The value is cached and announced straight away and returned to the
    /// caller; the device is told afterwards, in the background, and its
    /// answer may replace the value again. The returned value is therefore
    /// not a promise about the final state.
    ///
    /// Only fails when the property does not exist.
    pub async fn set_value(
        self: &Arc<Self>,
        device_id: &str,
        name: &str,
        value: Value,
    ) -> Result<Value, SyncError> {
        let (endpoint, generation) = {
            let _guard = self.lock_device(device_id).await;
            let (change, endpoint, generation) =
                self.registry.write_local(device_id, name, value.clone())?;
            self.host.property_changed(&change).await;
            (endpoint, generation)
        };

        let sync = Arc::clone(self);
        let device_id = device_id.to_string();
        let name = name.to_string();
        let written = value.clone();
        tokio::spawn(async move {
            let result = async {
                let url = write_url(&endpoint, &name, &written)?;
                info!("Getting {}", url);
                let response = sync.client.get_json(&url).await?;
                let origin = Origin {
                    property: &name,
                    generation,
                };
                sync.reconcile(&device_id, &url, response, origin).await
            }
            .await;

            if let Err(e) = result {
                log_failure("write", &device_id, &name, &e);
            }
        });

        Ok(value)
    }

    async fn reconcile(
        &self,
        device_id: &str,
        url: &str,
        response: Value,
        origin: Origin<'_>,
    ) -> Result<Reconciliation, SyncError> {
        let Value::Object(updates) = response else {
            return Err(SyncError::NotAnObject {
                url: url.to_string(),
            });
        };

        let guard = self.lock_device(device_id).await;
        let result = self
            .registry
            .apply(device_id, updates, origin, self.discard_stale)?;

        for change in &result.changes {
            debug!("{}/{} = {}", change.device_id, change.name, change.value);
            self.host.property_changed(change).await;
        }
        drop(guard);

        for name in &result.stale {
            debug!(
                "Discarding stale value for {}/{} from {}",
                device_id, name, url
            );
        }
        for name in &result.unknown {
            let e = SyncError::UnknownProperty {
                device_id: device_id.to_string(),
                name: name.clone(),
            };
            error!("Response from {}: {}", url, e);
        }

        Ok(result)
    }
}

fn log_failure(flow: &str, device_id: &str, name: &str, e: &SyncError) {
    if e.is_data_error() {
        error!("{} of {}/{} failed: {}", flow, device_id, name, e);
    } else {
        warn!("{} of {}/{} failed: {}", flow, device_id, name, e);
    }
}
