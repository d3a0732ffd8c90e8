use serde::Deserialize;
use serde::Serialize;

use crate::color::Rgb;

/// State of a light entity as reported by the light service.
///
/// Home Assistant only reports colour and brightness while a light is on; an off
/// light reports `None` for both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    /// Whether the light is on or off.
    pub on: bool,

    /// Current colour, if supported and on.
    pub rgb_color: Option<Rgb>,

    /// Brightness level (0-255), if supported and on.
    pub brightness: Option<u8>,
}

impl LightState {
    pub fn off() -> Self {
        Self::default()
    }
}
