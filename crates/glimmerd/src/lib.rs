#[cfg(feature = "api")]
pub mod api;
pub mod brightness;
pub mod color;
pub mod config;
pub mod engine;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::Dispatcher;
pub use engine::DispatcherSettings;
pub use engine::Event;
pub use engine::LightState;
pub use engine::Registry;
