//! Configuration file parsing and structures.
//!
//! glimmerd uses a single TOML file. Everything except the broker and Home
//! Assistant connection details has a default, so a minimal file only needs
//! `[mqtt]`, `[hass]`, and at least one room.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::brightness::BrightnessConfig;
use crate::color::Rgb;
use crate::integrations::hass::HassConfig;
use crate::integrations::hermes::HermesConfig;
use crate::integrations::hermes::MqttConfig;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub hass: HassConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub hermes: HermesConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub brightness: BrightnessConfig,
    #[serde(default)]
    pub sunrise: SunriseConfig,
    #[serde(default)]
    pub responses: ResponsesConfig,

    /// Custom colour names, consulted before the built-in CSS names
    #[serde(default)]
    pub colors: HashMap<String, Rgb>,

    #[serde(default)]
    pub rooms: BTreeMap<String, RoomConfig>,

    /// Voice site id -> room name
    #[serde(default)]
    pub sites: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target overrides, e.g. `"glimmerd::engine::flash" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

fn default_api_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8566
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_listen_color() -> Rgb {
    Rgb(0, 0, 255)
}

fn default_load_color() -> Rgb {
    Rgb(0, 255, 255)
}

fn default_speak_color() -> Rgb {
    Rgb(0, 255, 0)
}

/// Notification flash configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FlashConfig {
    /// Designated flash light. Overrides the `flash_light` of the room that
    /// contains it.
    #[serde(default)]
    pub light: Option<String>,

    #[serde(default = "default_listen_color")]
    pub listen: Rgb,

    #[serde(default = "default_load_color")]
    pub load: Rgb,

    #[serde(default = "default_speak_color")]
    pub speak: Rgb,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            light: None,
            listen: default_listen_color(),
            load: default_load_color(),
            speak: default_speak_color(),
        }
    }
}

fn default_sunrise_color() -> Rgb {
    Rgb(255, 147, 41)
}

fn default_tick_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SunriseConfig {
    #[serde(default = "default_sunrise_color")]
    pub color: Rgb,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SunriseConfig {
    fn default() -> Self {
        Self {
            color: default_sunrise_color(),
            tick_ms: default_tick_ms(),
        }
    }
}

/// Texts spoken back to the user
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponsesConfig {
    pub not_configured: String,
    pub no_matching_lights: String,
    pub color_not_understood: String,
    pub no_value_given: String,
    pub which_color: String,
    /// `{room}` is replaced with the room name
    pub color_changed_in_room: String,
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            not_configured: "This site is not configured.".to_string(),
            no_matching_lights: "There are no such lights.".to_string(),
            color_not_understood: "I did not understand the color.".to_string(),
            no_value_given: "You did not say a value.".to_string(),
            which_color: "Which color?".to_string(),
            color_changed_in_room: "The color was changed in {room}.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Lights in this room, in order
    pub lights: Vec<LightConfig>,

    /// Light used for voice notification flashes
    #[serde(default)]
    pub flash_light: Option<String>,

    /// Light driven by sunrise ramps; defaults to the flash light, then the first light
    #[serde(default)]
    pub sunrise_light: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightConfig {
    pub entity_id: String,

    /// Free-form light type matched against the `type` intent slot
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        if let Some(light) = config.flash.light.clone() {
            config.apply_flash_override(&light)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Make `entity_id` the flash light of the room that contains it.
    pub fn apply_flash_override(&mut self, entity_id: &str) -> Result<(), ConfigError> {
        let room = self
            .rooms
            .values_mut()
            .find(|room| room.lights.iter().any(|l| l.entity_id == entity_id))
            .ok_or_else(|| {
                ConfigError::Invalid(vec![format!(
                    "flash light '{}' is not a light of any room",
                    entity_id
                )])
            })?;
        room.flash_light = Some(entity_id.to_string());
        self.flash.light = Some(entity_id.to_string());
        Ok(())
    }

    /// Check cross-field constraints, reporting every problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for (name, room) in &self.rooms {
            let ids: Vec<&str> = room.lights.iter().map(|l| l.entity_id.as_str()).collect();
            for id in &ids {
                if !seen.insert(*id) {
                    problems.push(format!("light '{}' is listed in more than one room", id));
                }
            }
            for (field, value) in [
                ("flash_light", &room.flash_light),
                ("sunrise_light", &room.sunrise_light),
            ] {
                if let Some(id) = value {
                    if !ids.contains(&id.as_str()) {
                        problems.push(format!(
                            "rooms.{}.{}: '{}' is not a light of this room",
                            name, field, id
                        ));
                    }
                }
            }
        }

        let mut sites: Vec<_> = self.sites.iter().collect();
        sites.sort();
        for (site, room) in sites {
            if !self.rooms.contains_key(room) {
                problems.push(format!("sites.{}: unknown room '{}'", site, room));
            }
        }

        let b = &self.brightness;
        if b.max > 100 {
            problems.push(format!("brightness.max: {} is above 100", b.max));
        }
        if b.min > b.max {
            problems.push(format!(
                "brightness.min: {} is above brightness.max ({})",
                b.min, b.max
            ));
        }
        if b.step == 0 {
            problems.push("brightness.step: must be greater than 0".to_string());
        }
        if self.sunrise.tick_ms == 0 {
            problems.push("sunrise.tick_ms: must be greater than 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}
