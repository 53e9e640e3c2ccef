//! Messages from the adapter to the engine.

use tokio::sync::mpsc;

use crate::adapter::DeviceDescription;
use crate::adapter::PropertyChange;

/// Bounded so a chatty adapter is slowed down rather than buffered forever
pub type FromAdapterSender = mpsc::Sender<FromAdapterMessage>;
pub type FromAdapterReceiver = mpsc::Receiver<FromAdapterMessage>;

/// Messages FROM the adapter TO the engine
#[derive(Debug, Clone)]
pub enum FromAdapterMessage {
    /// A device was discovered and fully described
    DeviceAdded { device: DeviceDescription },

    /// A property's cached value changed (local write or device report)
    PropertyChanged { change: PropertyChange },
}
