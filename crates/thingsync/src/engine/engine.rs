use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use super::message::FromAdapterMessage;
use super::message::FromAdapterReceiver;
use super::message::FromAdapterSender;
use super::state::DeviceState;
use super::state::State;
use crate::adapter::DeviceDescription;
use crate::adapter::DeviceRegistrar;
use crate::adapter::PropertyChange;
use crate::adapter::PropertyNotifier;

/// Capacity for the adapter→engine message channel
/// Provides backpressure when the adapter reports faster than the engine can process
const FROM_ADAPTER_CHANNEL_SIZE: usize = 1024;

/// thingsync engine
///
/// The in-process host of the adapter: receives device registrations and
/// property changes and keeps a view of the world in `State`.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Receive messages from the adapter
    message_rx: Mutex<FromAdapterReceiver>,

    /// Sender handed to the adapter through `EngineHandle`
    message_tx: FromAdapterSender,
}

impl Engine {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_ADAPTER_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            message_rx: Mutex::new(message_rx),
            message_tx,
        }
    }

    /// Host handle to give to the adapter
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.message_tx.clone(),
        }
    }

    /// Run the engine's main event loop
    pub async fn run(&self) {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    fn handle_event(&self, msg: FromAdapterMessage) {
        match msg {
            FromAdapterMessage::DeviceAdded { device } => {
                info!("Device added: {} ({}, {})", device.id, device.name, device.kind);

                let mut state = State::clone(&self.state.load());
                state
                    .devices
                    .insert(device.id.clone(), DeviceState::from(&device));
                self.state.store(Arc::new(state));
            }
            FromAdapterMessage::PropertyChanged { change } => {
                let mut state = State::clone(&self.state.load());
                let Some(device) = state.devices.get_mut(&change.device_id) else {
                    warn!(
                        "Property change for unknown device: {}/{}",
                        change.device_id, change.name
                    );
                    return;
                };

                info!(
                    "Property changed: {}/{} -> {}",
                    change.device_id, change.name, change.value
                );
                device.properties.insert(change.name, change.value);
                self.state.store(Arc::new(state));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sender side of the engine, implementing the adapter's host traits.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: FromAdapterSender,
}

#[async_trait]
impl DeviceRegistrar for EngineHandle {
    async fn register_device(&self, device: &DeviceDescription) {
        let msg = FromAdapterMessage::DeviceAdded {
            device: device.clone(),
        };
        if let Err(e) = self.tx.send(msg).await {
            warn!("Failed to send DeviceAdded message: {}", e);
        }
    }
}

#[async_trait]
impl PropertyNotifier for EngineHandle {
    async fn property_changed(&self, change: &PropertyChange) {
        let msg = FromAdapterMessage::PropertyChanged {
            change: change.clone(),
        };
        if let Err(e) = self.tx.send(msg).await {
            warn!("Failed to send PropertyChanged message: {}", e);
        }
    }
}
