//! Brightness arithmetic.
//!
//! Voice commands speak in percent, Home Assistant in a native 0-255 scale. Every
//! value written to a device passes through [`BrightnessConfig::clamp_native`], so the
//! applied brightness always lies within the configured floor/ceiling.

use serde::Deserialize;
use strum::EnumString;

/// How relative dim actions ("brighter", "darker") move the brightness.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessCurve {
    /// Fixed step of `step` percent of full scale.
    #[serde(alias = "lin")]
    Linear,
    /// Step of `step` percent of the current brightness.
    #[default]
    #[serde(alias = "exp")]
    Exponential,
}

/// A relative or absolute dim request from the `action` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DimAction {
    Higher,
    Lower,
    Highest,
    Lowest,
}

fn default_step() -> u8 {
    20
}

fn default_min() -> u8 {
    2
}

fn default_max() -> u8 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrightnessConfig {
    #[serde(default)]
    pub curve: BrightnessCurve,

    /// Step size in percent
    #[serde(default = "default_step")]
    pub step: u8,

    /// Floor in percent
    #[serde(default = "default_min")]
    pub min: u8,

    /// Ceiling in percent
    #[serde(default = "default_max")]
    pub max: u8,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            curve: BrightnessCurve::default(),
            step: default_step(),
            min: default_min(),
            max: default_max(),
        }
    }
}

impl BrightnessConfig {
    /// Smallest native value that is not below `min` percent.
    pub fn floor_native(&self) -> u8 {
        ((u32::from(self.min) * 255 + 99) / 100).min(255) as u8
    }

    /// Largest native value that is not above `max` percent.
    pub fn ceiling_native(&self) -> u8 {
        (u32::from(self.max) * 255 / 100).min(255) as u8
    }

    /// Clamp a native value into the configured range.
    pub fn clamp_native(&self, value: i64) -> u8 {
        let floor = i64::from(self.floor_native());
        let ceiling = i64::from(self.ceiling_native()).max(floor);
        value.clamp(floor, ceiling) as u8
    }

    /// Convert a spoken percentage to a native brightness, clamping first.
    pub fn from_percent(&self, percent: f64) -> u8 {
        let percent = if percent.is_nan() {
            f64::from(self.min)
        } else {
            percent.max(f64::from(self.min)).min(f64::from(self.max))
        };
        self.clamp_native((percent * 255.0 / 100.0).round() as i64)
    }

    /// Apply a dim action to the current native brightness.
    ///
    /// An off light has a current brightness of 0; the exponential curve cannot grow
    /// from 0, so it takes a linear step instead. Returns `None` when dimming would
    /// reach zero or below, which leaves the light as it is.
    pub fn apply(&self, action: DimAction, current: u8) -> Option<u8> {
        let current = i64::from(current);
        let linear_step = i64::from(self.step) * 255 / 100;
        let relative_step = current * i64::from(self.step) / 100;
        let step = match self.curve {
            BrightnessCurve::Linear => linear_step,
            BrightnessCurve::Exponential if current == 0 => linear_step,
            BrightnessCurve::Exponential => relative_step,
        };

        let target = match action {
            DimAction::Higher => current + step,
            DimAction::Lower => current - step,
            DimAction::Highest => return Some(self.ceiling_native()),
            DimAction::Lowest => return Some(self.floor_native()),
        };
        (target > 0).then(|| self.clamp_native(target))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn config(curve: BrightnessCurve) -> BrightnessConfig {
        BrightnessConfig {
            curve,
            ..Default::default()
        }
    }

    #[test]
    fn test_percent_above_ceiling_clamps_to_full_scale() {
        let cfg = BrightnessConfig::default();
        assert_eq!(cfg.from_percent(150.0), 255);
        assert_eq!(cfg.from_percent(100.0), 255);
    }

    #[test]
    fn test_percent_below_floor_clamps_to_floor() {
        let cfg = BrightnessConfig::default();
        assert_eq!(cfg.floor_native(), 6);
        assert_eq!(cfg.from_percent(0.0), 6);
        assert_eq!(cfg.from_percent(-20.0), 6);
        assert_eq!(cfg.from_percent(f64::NAN), 6);
    }

    #[test]
    fn test_applied_brightness_always_within_bounds() {
        for (min, max) in [(2u8, 100u8), (10, 80), (0, 0), (33, 34), (0, 100)] {
            let cfg = BrightnessConfig {
                min,
                max,
                ..Default::default()
            };
            let lo = f64::from(min) * 2.55;
            let hi = f64::from(max) * 2.55;
            for percent in -50..=250 {
                let native = f64::from(cfg.from_percent(f64::from(percent)));
                assert!(
                    native >= lo - 1e-9 && native <= hi + 1e-9,
                    "{}% with [{}, {}] gave {}",
                    percent,
                    min,
                    max,
                    native
                );
            }
        }
    }

    #[test]
    fn test_linear_steps() {
        let cfg = config(BrightnessCurve::Linear);
        assert_eq!(cfg.apply(DimAction::Higher, 100), Some(151));
        assert_eq!(cfg.apply(DimAction::Lower, 100), Some(49));
        assert_eq!(cfg.apply(DimAction::Lower, 55), Some(6));
        assert_eq!(cfg.apply(DimAction::Lower, 10), None);
        assert_eq!(cfg.apply(DimAction::Higher, 250), Some(255));
    }

    #[test]
    fn test_exponential_steps() {
        let cfg = config(BrightnessCurve::Exponential);
        assert_eq!(cfg.apply(DimAction::Higher, 100), Some(120));
        assert_eq!(cfg.apply(DimAction::Lower, 100), Some(80));
        assert_eq!(cfg.apply(DimAction::Higher, 0), Some(51));
        assert_eq!(cfg.apply(DimAction::Lower, 0), None);
    }

    #[test]
    fn test_extreme_actions() {
        let cfg = config(BrightnessCurve::Exponential);
        assert_eq!(cfg.apply(DimAction::Highest, 17), Some(255));
        assert_eq!(cfg.apply(DimAction::Lowest, 200), Some(6));
    }

    #[test]
    fn test_parse_action_and_curve() {
        assert_eq!(DimAction::from_str("Higher").unwrap(), DimAction::Higher);
        assert!(DimAction::from_str("sideways").is_err());

        #[derive(Deserialize)]
        struct Wrapper {
            curve: BrightnessCurve,
        }
        let w: Wrapper = toml::from_str(r#"curve = "lin""#).unwrap();
        assert_eq!(w.curve, BrightnessCurve::Linear);
        let w: Wrapper = toml::from_str(r#"curve = "exponential""#).unwrap();
        assert_eq!(w.curve, BrightnessCurve::Exponential);
    }
}
