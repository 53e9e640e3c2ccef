pub mod adapter;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod engine;

pub use adapter::Adapter;
pub use config::Config;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::State;
