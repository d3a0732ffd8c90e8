mod client;
mod config;
mod integration;
mod messages;

pub use client::MqttClient;
pub use client::RumqttcClient;
pub use config::HermesConfig;
pub use config::MqttConfig;
pub use integration::HermesIntegration;
pub use messages::DecodeError;
pub use messages::Topics;
