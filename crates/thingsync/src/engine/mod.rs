#[allow(clippy::module_inception)]
mod engine;
mod message;
pub mod state;

pub use engine::Engine;
pub use engine::EngineHandle;
pub use message::FromAdapterMessage;
pub use message::FromAdapterReceiver;
pub use message::FromAdapterSender;
pub use state::DeviceState;
pub use state::State;
