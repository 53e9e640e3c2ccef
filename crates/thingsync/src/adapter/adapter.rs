use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;

use super::client::HttpClient;
use super::device::DeviceDescription;
use super::device::PropertyDescription;
use super::error::PairingError;
use super::error::SyncError;
use super::host::Host;
use super::prober::Prober;
use super::registry::DeviceRegistry;
use super::registry::Reconciliation;
use super::session::PairingSession;
use super::sync::PropertySync;
use crate::config::Config;

/// Generic SSDP + HTTP/JSON adapter
///
/// Discovers devices announcing themselves with SSDP NOTIFY, builds them from
/// their JSON self-description and keeps their property values in step with
/// the devices.
pub struct Adapter {
    registry: Arc<DeviceRegistry>,
    sync: Arc<PropertySync>,
    prober: Arc<Prober>,
    session: PairingSession,
    pairing_timeout: Duration,
}

impl Adapter {
    pub fn new(config: &Config, host: Arc<dyn Host>, client: Arc<dyn HttpClient>) -> Self {
        let registry = Arc::new(DeviceRegistry::new(config.adapter.name.clone()));
        let sync = Arc::new(PropertySync::new(
            registry.clone(),
            client.clone(),
            host.clone(),
            config.adapter.discard_stale_reconciliation,
        ));
        let prober = Arc::new(Prober::new(client, registry.clone(), host, sync.clone()));
        let session = PairingSession::new(config.discovery.clone(), prober.clone());

        Self {
            registry,
            sync,
            prober,
            session,
            pairing_timeout: config.discovery.pairing_timeout(),
        }
    }

    pub fn name(&self) -> &str {
        self.registry.adapter_name()
    }

    /// Pairing window from the configuration
    pub fn pairing_timeout(&self) -> Duration {
        self.pairing_timeout
    }

    pub fn start_pairing(&self, timeout: Duration) -> Result<(), PairingError> {
        self.session.start(timeout)
    }

    pub fn start_pairing_with_socket(
        &self,
        socket: UdpSocket,
        timeout: Duration,
    ) -> Result<(), PairingError> {
        self.session.start_with_socket(socket, timeout)
    }

    pub fn cancel_pairing(&self) {
        self.session.cancel();
    }

    pub fn is_pairing(&self) -> bool {
        self.session.is_pairing()
    }

    /// Probe a location directly, outside of any pairing session.
    pub async fn probe(&self, location: &str) -> Vec<String> {
        self.prober.probe(location).await
    }

    pub async fn set_property(
        &self,
        device_id: &str,
        name: &str,
        value: Value,
    ) -> Result<Value, SyncError> {
        self.sync.set_value(device_id, name, value).await
    }

    pub async fn refresh_property(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Reconciliation, SyncError> {
        self.sync.refresh(device_id, name).await
    }

    pub fn find_property(&self, device_id: &str, name: &str) -> Option<PropertyDescription> {
        self.registry.find_property(device_id, name)
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceDescription> {
        self.registry.device(device_id)
    }

    pub fn devices(&self) -> Vec<DeviceDescription> {
        self.registry.devices()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapter::client::MockHttpClient;
    use crate::adapter::host::RecordingHost;

    const LOCATION: &str = "http://10.0.0.5/thing";

    fn adapter(toml: &str) -> (Arc<MockHttpClient>, Arc<RecordingHost>, Adapter) {
        let config = Config::from_toml(toml).unwrap();
        let client = Arc::new(MockHttpClient::new());
        let host = Arc::new(RecordingHost::new());
        let adapter = Adapter::new(&config, host.clone(), client.clone());
        (client, host, adapter)
    }

    #[tokio::test]
    async fn test_adapter_name_prefixes_ids() {
        let (client, _host, adapter) = adapter("[adapter]\nname = \"porch\"");
        client.respond_json(LOCATION, json!({"name": "lamp", "type": "light", "properties": {}}));

        assert_eq!(adapter.name(), "porch");
        assert_eq!(adapter.probe(LOCATION).await, vec!["porch:1".to_string()]);
        assert_eq!(adapter.devices().len(), 1);
        assert_eq!(adapter.device("porch:1").unwrap().name, "lamp");
    }

    #[tokio::test]
    async fn test_write_then_manual_refresh() {
        let (client, host, adapter) = adapter("");
        client.respond_json(
            LOCATION,
            json!({"name": "lamp", "type": "light", "properties": {"on": {"href": "/on", "value": false}}}),
        );
        client.respond_json(&format!("{LOCATION}/on"), json!({"on": false}));
        client.respond_json(&format!("{LOCATION}/on?on=true"), json!({"on": true}));

        let id = adapter.probe(LOCATION).await.remove(0);
        client.wait_for(&format!("{LOCATION}/on"), 1).await;
        host.wait_for_changes(2).await;

        let resolved = adapter.set_property(&id, "on", json!(true)).await.unwrap();
        assert_eq!(resolved, json!(true));
        assert_eq!(adapter.find_property(&id, "on").unwrap().value, json!(true));
        host.wait_for_changes(4).await;

        let result = adapter.refresh_property(&id, "on").await.unwrap();
        assert_eq!(result.changes[0].value, json!(false));
        assert_eq!(client.count(&format!("{LOCATION}/on")), 2);
    }

    #[test]
    fn test_pairing_timeout_from_config() {
        let (_client, _host, adapter) = adapter("[discovery]\npairing_timeout_secs = 12");
        assert_eq!(adapter.pairing_timeout(), Duration::from_secs(12));
        assert!(!adapter.is_pairing());
        adapter.cancel_pairing();
    }
}
