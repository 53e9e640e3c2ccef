use std::sync::Arc;

use tracing::info;
use tracing::warn;

use super::client::HttpClient;
use super::device::Device;
use super::device::PropertyChange;
use super::error::ProbeError;
use super::host::Host;
use super::model::DeviceDescriptor;
use super::model::parse_probe_document;
use super::registry::DeviceRegistry;
use super::sync::PropertySync;

/// Turns a location URL into registered devices.
pub struct Prober {
    client: Arc<dyn HttpClient>,
    registry: Arc<DeviceRegistry>,
    host: Arc<dyn Host>,
    sync: Arc<PropertySync>,
}

impl Prober {
    pub fn new(
        client: Arc<dyn HttpClient>,
        registry: Arc<DeviceRegistry>,
        host: Arc<dyn Host>,
        sync: Arc<PropertySync>,
    ) -> Self {
        Self {
            client,
            registry,
            host,
            sync,
        }
    }

    /// Probe `location` once, returning the ids of the devices it produced.
    ///
    /// Never fails: an unreachable location or an unusable document is
    /// logged and yields no devices. There is no retry; the device will
    /// announce itself again.
    pub async fn probe(&self, location: &str) -> Vec<String> {
        info!("Trying {}", location);
        match self.try_probe(location).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Probe of {} failed: {}", location, e);
                Vec::new()
            }
        }
    }

    async fn try_probe(&self, location: &str) -> Result<Vec<String>, ProbeError> {
        let document = self.client.get_json(location).await?;
        let descriptors = parse_probe_document(location, document)?;

        let mut ids = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            ids.push(self.add_device(descriptor).await);
        }
        Ok(ids)
    }

    /// Register the device, announce its initial values, then start one
    /// refresh per property so the cache catches up with the device.
    async fn add_device(&self, descriptor: DeviceDescriptor) -> String {
        let id = self.registry.allocate_id();
        let device = Device::from_descriptor(id.clone(), descriptor);
        let initial: Vec<PropertyChange> = device.properties.values().map(|p| p.change()).collect();

        let guard = self.sync.lock_device(&id).await;
        let description = self.registry.insert(device);
        self.host.register_device(&description).await;
        info!("Added thing->{} ({})", description.name, id);

        for change in &initial {
            self.host.property_changed(change).await;
        }
        drop(guard);
        for change in initial {
            self.sync.spawn_refresh(id.clone(), change.name);
        }

        id
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapter::client::{MockHttpClient, MockResponse};
    use crate::adapter::host::{HostEvent, RecordingHost};

    const LOCATION: &str = "http://10.0.0.5/thing";

    struct Fixture {
        client: Arc<MockHttpClient>,
        host: Arc<RecordingHost>,
        registry: Arc<DeviceRegistry>,
        prober: Prober,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(MockHttpClient::new());
        let host = Arc::new(RecordingHost::new());
        let registry = Arc::new(DeviceRegistry::new("GenericSSDPAdapter"));
        let sync = Arc::new(PropertySync::new(
            registry.clone(),
            client.clone(),
            host.clone(),
            false,
        ));
        let prober = Prober::new(client.clone(), registry.clone(), host.clone(), sync);
        Fixture {
            client,
            host,
            registry,
            prober,
        }
    }

    #[tokio::test]
    async fn test_probe_lamp() {
        let f = fixture();
        f.client.respond_json(
            LOCATION,
            json!({"name": "lamp", "type": "light", "properties": {"on": {"href": "/on", "value": false}}}),
        );
        f.client
            .respond_json(&format!("{LOCATION}/on"), json!({"on": true}));

        let ids = f.prober.probe(LOCATION).await;
        assert_eq!(ids, vec!["GenericSSDPAdapter:1".to_string()]);

        let events = f.host.events();
        let HostEvent::Registered(lamp) = &events[0] else {
            panic!("expected registration first, got {:?}", events);
        };
        assert_eq!(lamp.name, "lamp");
        assert_eq!(lamp.kind, "light");
        assert_eq!(lamp.properties["on"].value, json!(false));
        assert!(matches!(&events[1], HostEvent::Changed(c) if c.name == "on" && c.value == json!(false)));

        f.client.wait_for(&format!("{LOCATION}/on"), 1).await;
        f.host.wait_for_changes(2).await;
        assert_eq!(f.registry.find_property(&ids[0], "on").unwrap().value, json!(true));
    }

    #[tokio::test]
    async fn test_probe_http_500_registers_nothing() {
        let f = fixture();
        f.client.respond(LOCATION, MockResponse::Status(500));

        assert!(f.prober.probe(LOCATION).await.is_empty());
        assert!(f.host.events().is_empty());
        assert!(f.registry.is_empty());
        assert_eq!(f.client.requests(), vec![LOCATION.to_string()]);
    }

    #[tokio::test]
    async fn test_probe_unparseable_body_registers_nothing() {
        let f = fixture();
        f.client.respond(LOCATION, MockResponse::Garbage);

        assert!(f.prober.probe(LOCATION).await.is_empty());
        assert!(f.host.events().is_empty());
    }

    #[tokio::test]
    async fn test_probe_mapping_yields_several_devices() {
        let f = fixture();
        f.client.respond_json(
            LOCATION,
            json!({
                "porch": {"type": "light", "properties": {"on": {"href": "/porch/on", "value": false}}},
                "garage": {"type": "light", "properties": {"on": {"href": "/garage/on", "value": true}}}
            }),
        );

        let ids = f.prober.probe(LOCATION).await;
        assert_eq!(
            ids,
            vec![
                "GenericSSDPAdapter:1".to_string(),
                "GenericSSDPAdapter:2".to_string()
            ]
        );
        let names: Vec<_> = f.host.registered().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["porch", "garage"]);

        f.client.wait_for(&format!("{LOCATION}/porch/on"), 1).await;
        f.client.wait_for(&format!("{LOCATION}/garage/on"), 1).await;
    }

    #[tokio::test]
    async fn test_ids_keep_counting_across_probes() {
        let f = fixture();
        let doc = json!({"name": "lamp", "type": "light", "properties": {}});
        f.client.respond_json(LOCATION, doc.clone());
        f.client.respond_json("http://10.0.0.6/thing", doc);

        assert_eq!(f.prober.probe(LOCATION).await, vec!["GenericSSDPAdapter:1".to_string()]);
        assert_eq!(
            f.prober.probe("http://10.0.0.6/thing").await,
            vec!["GenericSSDPAdapter:2".to_string()]
        );
    }
}
