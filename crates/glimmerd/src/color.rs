//! Colour values and colour-name resolution.
//!
//! Voice intents carry colour names as free text. Names are looked up first in the
//! user's `[colors]` table and then among the CSS colour keywords.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// An RGB triple as used by Home Assistant's `rgb_color` attribute.
///
/// Serializes as a three-element array (`[255, 0, 0]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Look up a CSS colour keyword (the full CSS3 named set, including the `grey`
/// spellings). Only plain names are accepted, not hex or functional notation.
fn css_keyword(name: &str) -> Option<Rgb> {
    if name.is_empty() || name == "transparent" || !name.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    let [r, g, b, _] = csscolorparser::parse(name).ok()?.to_rgba8();
    Some(Rgb(r, g, b))
}

/// Resolves spoken colour names to RGB values.
#[derive(Debug, Clone, Default)]
pub struct ColorResolver {
    custom: HashMap<String, Rgb>,
}

impl ColorResolver {
    pub fn new(custom: &HashMap<String, Rgb>) -> Self {
        Self {
            custom: custom
                .iter()
                .map(|(name, rgb)| (normalize(name), *rgb))
                .collect(),
        }
    }

    /// Look up a colour name. Case and inner whitespace are ignored, so
    /// "Light Blue" and "lightblue" resolve to the same colour.
    pub fn resolve(&self, name: &str) -> Option<Rgb> {
        let key = normalize(name);
        if let Some(rgb) = self.custom.get(&key) {
            return Some(*rgb);
        }
        css_keyword(&key)
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<String>().to_lowercase()
}
