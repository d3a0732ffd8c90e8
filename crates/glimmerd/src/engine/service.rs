use std::time::Duration;

use async_trait::async_trait;

use super::state::LightState;
use crate::color::Rgb;

/// Errors reported by a [`LightService`].
#[derive(Debug, thiserror::Error)]
pub enum LightServiceError {
    #[error("Light not found: {0}")]
    NotFound(String),

    #[error("Light unavailable: {0}")]
    Unavailable(String),

    #[error("Light service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Light service returned status {status} for {entity_id}")]
    Status { entity_id: String, status: u16 },
}

/// A `turn_on` request.
///
/// `wait` asks the service to return only once the command has completed; without
/// it the request is dispatched and the call returns immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOn {
    pub entity_id: String,
    pub transition: Duration,
    pub rgb_color: Option<Rgb>,
    pub brightness: Option<u8>,
    pub wait: bool,
}

impl TurnOn {
    pub fn new(entity_id: impl Into<String>, transition: Duration) -> Self {
        Self {
            entity_id: entity_id.into(),
            transition,
            rgb_color: None,
            brightness: None,
            wait: false,
        }
    }

    pub fn color(mut self, rgb: Option<Rgb>) -> Self {
        self.rgb_color = rgb;
        self
    }

    pub fn brightness(mut self, brightness: Option<u8>) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }
}

/// Remote light control.
///
/// This trait is the seam between the dispatcher and the device transport, and
/// allows the transport to be mocked in tests.
#[async_trait]
pub trait LightService: Send + Sync {
    /// Turn a light on, optionally changing colour and brightness.
    async fn turn_on(&self, cmd: TurnOn) -> Result<(), LightServiceError>;

    /// Turn a light off.
    async fn turn_off(
        &self,
        entity_id: &str,
        transition: Duration,
        wait: bool,
    ) -> Result<(), LightServiceError>;

    /// Read a light's current state.
    async fn get_state(&self, entity_id: &str) -> Result<LightState, LightServiceError>;
}

/// A command recorded by [`MockLightService`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TurnOn {
        entity_id: String,
        rgb_color: Option<Rgb>,
        brightness: Option<u8>,
    },
    TurnOff {
        entity_id: String,
    },
}

#[cfg(test)]
impl Command {
    pub fn entity_id(&self) -> &str {
        match self {
            Command::TurnOn { entity_id, .. } | Command::TurnOff { entity_id } => entity_id,
        }
    }
}

/// Simulated device. Colour and brightness persist while the light is off, as
/// they do on real bulbs, but are only reported while it is on.
#[cfg(test)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockDevice {
    pub on: bool,
    pub rgb_color: Option<Rgb>,
    pub brightness: Option<u8>,
}

/// In-memory light service for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockLightService {
    devices: std::sync::Mutex<std::collections::HashMap<String, MockDevice>>,
    commands: std::sync::Mutex<Vec<Command>>,
}

#[cfg(test)]
impl MockLightService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_light(&self, entity_id: &str, device: MockDevice) {
        self.devices
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), device);
    }

    /// Simulate a device disappearing from the light service
    pub fn remove_light(&self, entity_id: &str) {
        self.devices.lock().unwrap().remove(entity_id);
    }

    pub fn device(&self, entity_id: &str) -> Option<MockDevice> {
        self.devices.lock().unwrap().get(entity_id).cloned()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_for(&self, entity_id: &str) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|c| c.entity_id() == entity_id)
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl LightService for MockLightService {
    async fn turn_on(&self, cmd: TurnOn) -> Result<(), LightServiceError> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .get_mut(&cmd.entity_id)
            .ok_or_else(|| LightServiceError::NotFound(cmd.entity_id.clone()))?;
        device.on = true;
        if cmd.rgb_color.is_some() {
            device.rgb_color = cmd.rgb_color;
        }
        if cmd.brightness.is_some() {
            device.brightness = cmd.brightness;
        }
        self.commands.lock().unwrap().push(Command::TurnOn {
            entity_id: cmd.entity_id,
            rgb_color: cmd.rgb_color,
            brightness: cmd.brightness,
        });
        Ok(())
    }

    async fn turn_off(
        &self,
        entity_id: &str,
        _transition: Duration,
        _wait: bool,
    ) -> Result<(), LightServiceError> {
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .get_mut(entity_id)
            .ok_or_else(|| LightServiceError::NotFound(entity_id.to_string()))?;
        device.on = false;
        self.commands.lock().unwrap().push(Command::TurnOff {
            entity_id: entity_id.to_string(),
        });
        Ok(())
    }

    async fn get_state(&self, entity_id: &str) -> Result<LightState, LightServiceError> {
        let devices = self.devices.lock().unwrap();
        let device = devices
            .get(entity_id)
            .ok_or_else(|| LightServiceError::NotFound(entity_id.to_string()))?;
        if device.on {
            Ok(LightState {
                on: true,
                rgb_color: device.rgb_color,
                brightness: device.brightness,
            })
        } else {
            Ok(LightState::off())
        }
    }
}
