//! Home Assistant as the light transport.

mod client;
mod config;

pub use client::HassClient;
pub use config::HassConfig;
