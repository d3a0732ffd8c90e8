//! Voice commands addressed to lights.
//!
//! Every intent ends its dialogue session, speaking a response when there is one,
//! except a colour change without a colour, which asks which colour to use.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::dispatcher::Dispatcher;
use super::event::IntentKind;
use super::event::IntentMessage;
use super::flash::WriteThrough;
use super::message::ToBusMessage;
use super::registry::LightHandle;
use super::registry::ResolveError;
use super::service::TurnOn;
use crate::brightness::DimAction;
use crate::color::Rgb;

const TRANSITION: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
enum IntentError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unknown colour {0:?}")]
    UnknownColor(String),

    #[error("no brightness or action given")]
    NoValue,
}

#[derive(Debug, Clone, Copy)]
enum DimTarget {
    Absolute(u8),
    Relative(DimAction),
}

enum Outcome {
    /// End the session, optionally speaking a text
    Done(Option<String>),
    /// Ask which colour to apply to these lights
    AskColor(Vec<String>),
}

impl Dispatcher {
    pub(super) async fn handle_intent(&mut self, intent: IntentMessage) {
        debug!("Intent {:?} from {}", intent.kind, intent.site_id);

        let outcome = match intent.kind {
            IntentKind::LightsOn => self.lights_on(&intent).await,
            IntentKind::LightsOff => self.lights_off(&intent).await,
            IntentKind::ColorChange => self.color_change(&intent).await,
            IntentKind::DimLights => self.dim_lights(&intent).await,
        };

        let session_id = intent.session_id;
        let msg = match outcome {
            Ok(Outcome::Done(text)) => ToBusMessage::EndSession { session_id, text },
            Ok(Outcome::AskColor(entity_ids)) => ToBusMessage::ContinueSession {
                session_id,
                text: self.settings.responses.which_color.clone(),
                intent_filter: vec![self.settings.color_change_intent.clone()],
                custom_data: Some(entity_ids.join(";")),
                slot: Some("color".to_string()),
            },
            Err(e) => {
                info!("{:?} from {} failed: {}", intent.kind, intent.site_id, e);
                ToBusMessage::EndSession {
                    session_id,
                    text: Some(self.error_text(&e)),
                }
            }
        };
        self.send_to_bus(msg);
    }

    fn error_text(&self, error: &IntentError) -> String {
        let responses = &self.settings.responses;
        match error {
            IntentError::Resolve(ResolveError::NotConfigured) => responses.not_configured.clone(),
            IntentError::Resolve(ResolveError::NoMatchingLights) => {
                responses.no_matching_lights.clone()
            }
            IntentError::UnknownColor(_) => responses.color_not_understood.clone(),
            IntentError::NoValue => responses.no_value_given.clone(),
        }
    }

    fn targets(&self, intent: &IntentMessage) -> Result<Vec<LightHandle>, ResolveError> {
        let ids = self.registry.resolve_targets(
            intent.slots.get_str("location"),
            intent.slots.get_str("type"),
            &intent.site_id,
        )?;
        Ok(self.handles(&ids))
    }

    fn handles(&self, ids: &[String]) -> Vec<LightHandle> {
        ids.iter()
            .filter_map(|id| self.registry.light(id).cloned())
            .collect()
    }

    /// The colour slot, if the intent has one
    fn color_slot(&self, intent: &IntentMessage) -> Result<Option<Rgb>, IntentError> {
        if !intent.slots.contains("color") {
            return Ok(None);
        }
        let name = intent.slots.get_str("color").unwrap_or_default();
        match self.settings.colors.resolve(name) {
            Some(rgb) => Ok(Some(rgb)),
            None => Err(IntentError::UnknownColor(name.to_string())),
        }
    }

    /// Turn a light on, or record the command in its flash snapshot.
    async fn apply_on(&self, light: &LightHandle, rgb_color: Option<Rgb>, brightness: Option<u8>) {
        let entity_id = {
            let mut light = light.lock().await;
            if light.session.write_through(WriteThrough::On {
                rgb_color,
                brightness,
            }) {
                info!("{} is flashing, updated the state it restores to", light.entity_id);
                return;
            }
            light.entity_id.clone()
        };

        let cmd = TurnOn::new(&entity_id, TRANSITION)
            .color(rgb_color)
            .brightness(brightness);
        if let Err(e) = self.service.turn_on(cmd).await {
            warn!("Failed to turn on {}: {}", entity_id, e);
        }
    }

    async fn lights_on(&mut self, intent: &IntentMessage) -> Result<Outcome, IntentError> {
        let lights = self.targets(intent)?;
        let rgb_color = self.color_slot(intent)?;
        let brightness = intent
            .slots
            .get_number("brightness")
            .map(|percent| self.settings.brightness.from_percent(percent));

        for light in &lights {
            self.apply_on(light, rgb_color, brightness).await;
        }
        Ok(Outcome::Done(None))
    }

    async fn lights_off(&mut self, intent: &IntentMessage) -> Result<Outcome, IntentError> {
        for light in self.targets(intent)? {
            let entity_id = {
                let mut light = light.lock().await;
                if light.session.write_through(WriteThrough::Off) {
                    info!("{} is flashing, will restore to off", light.entity_id);
                    continue;
                }
                light.entity_id.clone()
            };
            if let Err(e) = self.service.turn_off(&entity_id, TRANSITION, false).await {
                warn!("Failed to turn off {}: {}", entity_id, e);
            }
        }
        Ok(Outcome::Done(None))
    }

    async fn color_change(&mut self, intent: &IntentMessage) -> Result<Outcome, IntentError> {
        // A follow-up answer carries the lights chosen by the original request
        let ids = match intent.custom_data.as_deref().filter(|d| !d.is_empty()) {
            Some(data) => {
                let ids = self.registry.known_lights(data.split(';'));
                if ids.is_empty() {
                    return Err(ResolveError::NoMatchingLights.into());
                }
                ids
            }
            None => self.registry.resolve_targets(
                intent.slots.get_str("location"),
                intent.slots.get_str("type"),
                &intent.site_id,
            )?,
        };

        let Some(rgb_color) = self.color_slot(intent)? else {
            return Ok(Outcome::AskColor(ids));
        };

        for light in &self.handles(&ids) {
            self.apply_on(light, Some(rgb_color), None).await;
        }

        // Confirm when the change happened somewhere the user cannot see
        let here = self.registry.room_for_site(&intent.site_id).map(|r| r.name.as_str());
        let text = intent
            .slots
            .get_str("location")
            .filter(|loc| {
                !self.registry.is_all_keyword(loc)
                    && !self.registry.is_here_keyword(loc)
                    && Some(*loc) != here
            })
            .map(|room| {
                self.settings
                    .responses
                    .color_changed_in_room
                    .replace("{room}", room)
            });
        Ok(Outcome::Done(text))
    }

    async fn dim_lights(&mut self, intent: &IntentMessage) -> Result<Outcome, IntentError> {
        let lights = self.targets(intent)?;
        let percent = intent.slots.get_number("brightness");
        let action = intent
            .slots
            .get_str("action")
            .and_then(|a| DimAction::from_str(a).ok());

        let config = &self.settings.brightness;
        let target = match (percent, action) {
            (Some(percent), _) => DimTarget::Absolute(config.from_percent(percent)),
            (None, Some(action)) => DimTarget::Relative(action),
            (None, None) => return Err(IntentError::NoValue),
        };

        for light in &lights {
            let brightness = match target {
                DimTarget::Absolute(brightness) => brightness,
                DimTarget::Relative(action) => {
                    let Some(current) = self.current_brightness(light).await else {
                        continue;
                    };
                    match config.apply(action, current) {
                        Some(brightness) => brightness,
                        None => {
                            debug!("Not dimming {} below off", light.lock().await.entity_id);
                            continue;
                        }
                    }
                }
            };
            self.apply_on(light, None, Some(brightness)).await;
        }
        Ok(Outcome::Done(None))
    }

    /// Brightness a relative dim command starts from.
    ///
    /// A flashing light dims from its saved brightness; an off light from zero.
    async fn current_brightness(&self, light: &LightHandle) -> Option<u8> {
        let entity_id = {
            let light = light.lock().await;
            if light.session.accepts_write_through() {
                return Some(
                    light
                        .session
                        .saved()
                        .filter(|s| s.on)
                        .and_then(|s| s.brightness)
                        .unwrap_or(0),
                );
            }
            light.entity_id.clone()
        };

        match self.service.get_state(&entity_id).await {
            Ok(state) if state.on => Some(state.brightness.unwrap_or(0)),
            Ok(_) => Some(0),
            Err(e) => {
                warn!("Failed to read brightness of {}: {}", entity_id, e);
                None
            }
        }
    }
}
