pub mod hass;
pub mod hermes;
