use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::flash::FlashSession;
use crate::config::Config;

/// A light known to the dispatcher, together with its notification state.
#[derive(Debug)]
pub struct Light {
    /// Entity ID (e.g., "light.bedside")
    pub entity_id: String,

    /// Name of the room this light belongs to
    pub room: String,

    /// Free-form type, matched against the `type` intent slot
    pub kind: Option<String>,

    pub session: FlashSession,
}

pub type LightHandle = Arc<Mutex<Light>>;

#[derive(Debug, Clone)]
pub struct RoomLight {
    pub entity_id: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub lights: Vec<RoomLight>,
    pub flash_light: Option<String>,
    pub sunrise_light: Option<String>,
}

impl Room {
    /// Light driven by sunrise ramps in this room
    pub fn sunrise_target(&self) -> Option<&str> {
        self.sunrise_light
            .as_deref()
            .or(self.flash_light.as_deref())
            .or_else(|| self.lights.first().map(|l| l.entity_id.as_str()))
    }

    fn matching<'a>(
        &'a self,
        kind: Option<&'a str>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.lights
            .iter()
            .filter(move |l| kind.is_none() || l.kind.as_deref() == kind)
            .map(|l| l.entity_id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("site or room is not configured")]
    NotConfigured,

    #[error("no matching lights")]
    NoMatchingLights,
}

/// Every light and room the daemon manages.
///
/// The set of lights is fixed at startup; only their flash sessions change.
#[derive(Debug, Default)]
pub struct Registry {
    lights: HashMap<String, LightHandle>,
    rooms: BTreeMap<String, Room>,
    sites: HashMap<String, String>,
    all_keyword: String,
    here_keyword: String,
}

impl Registry {
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Registry {
            sites: config.sites.clone(),
            all_keyword: config.hermes.all_keyword.clone(),
            here_keyword: config.hermes.here_keyword.clone(),
            ..Default::default()
        };

        for (name, room_config) in &config.rooms {
            let room = Room {
                name: name.clone(),
                lights: room_config
                    .lights
                    .iter()
                    .map(|l| RoomLight {
                        entity_id: l.entity_id.clone(),
                        kind: l.kind.clone(),
                    })
                    .collect(),
                flash_light: room_config.flash_light.clone(),
                sunrise_light: room_config.sunrise_light.clone(),
            };
            registry.add_room(room);
        }

        registry
    }

    fn add_room(&mut self, room: Room) {
        for light in &room.lights {
            self.lights.insert(
                light.entity_id.clone(),
                Arc::new(Mutex::new(Light {
                    entity_id: light.entity_id.clone(),
                    room: room.name.clone(),
                    kind: light.kind.clone(),
                    session: FlashSession::default(),
                })),
            );
        }
        self.rooms.insert(room.name.clone(), room);
    }

    pub fn light(&self, entity_id: &str) -> Option<&LightHandle> {
        self.lights.get(entity_id)
    }

    /// All lights, ordered by entity id
    pub fn lights(&self) -> Vec<(&str, &LightHandle)> {
        let mut lights: Vec<_> = self
            .lights
            .iter()
            .map(|(id, handle)| (id.as_str(), handle))
            .collect();
        lights.sort_by_key(|(id, _)| *id);
        lights
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn room_for_site(&self, site_id: &str) -> Option<&Room> {
        self.sites.get(site_id).and_then(|name| self.rooms.get(name))
    }

    /// The designated flash light of the site's room
    pub fn flash_light_for_site(&self, site_id: &str) -> Option<&LightHandle> {
        let room = self.room_for_site(site_id)?;
        self.light(room.flash_light.as_deref()?)
    }

    /// Filter a list of entity ids down to lights this registry knows
    pub fn known_lights<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ids.into_iter()
            .map(str::trim)
            .filter(|id| self.lights.contains_key(*id))
            .map(str::to_string)
            .collect()
    }

    /// Resolve the lights a voice command refers to.
    ///
    /// `location` may name a room, the "all" keyword, or the "here" keyword; without
    /// a location the requesting site's room is used. `kind` narrows the result to
    /// lights of that type.
    pub fn resolve_targets(
        &self,
        location: Option<&str>,
        kind: Option<&str>,
        site_id: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let ids: Vec<&str> = match location {
            Some(loc) if self.rooms.contains_key(loc) => self.rooms[loc].matching(kind).collect(),
            Some(loc) if loc == self.all_keyword => {
                self.rooms.values().flat_map(|r| r.matching(kind)).collect()
            }
            Some(loc) if loc != self.here_keyword => return Err(ResolveError::NoMatchingLights),
            _ => self
                .room_for_site(site_id)
                .ok_or(ResolveError::NotConfigured)?
                .matching(kind)
                .collect(),
        };

        if ids.is_empty() {
            return Err(ResolveError::NoMatchingLights);
        }
        Ok(ids.into_iter().map(str::to_string).collect())
    }

    pub fn is_all_keyword(&self, location: &str) -> bool {
        location == self.all_keyword
    }

    pub fn is_here_keyword(&self, location: &str) -> bool {
        location == self.here_keyword
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let config = Config::from_toml(
            r#"
            [mqtt]
            broker = "localhost"

            [hass]
            url = "http://hass.local:8123"
            token = "secret"

            [rooms.bedroom]
            lights = [
                { entity_id = "light.bed", type = "bed" },
                { entity_id = "light.desk", type = "desk" },
            ]
            flash_light = "light.bed"

            [rooms.kitchen]
            lights = [
                { entity_id = "light.ceiling", type = "ceiling" },
                { entity_id = "light.counter" },
            ]

            [sites]
            bedroom = "bedroom"
            kitchen = "kitchen"
            "#,
        )
        .unwrap();
        Registry::from_config(&config)
    }

    #[test]
    fn test_resolve_named_room() {
        let r = registry();
        assert_eq!(
            r.resolve_targets(Some("kitchen"), None, "bedroom").unwrap(),
            vec!["light.ceiling", "light.counter"]
        );
        assert_eq!(
            r.resolve_targets(Some("bedroom"), Some("desk"), "kitchen")
                .unwrap(),
            vec!["light.desk"]
        );
    }

    #[test]
    fn test_resolve_all_rooms() {
        let r = registry();
        let all = r.resolve_targets(Some("all"), None, "nowhere").unwrap();
        assert_eq!(all.len(), 4);
        let beds = r.resolve_targets(Some("all"), Some("bed"), "nowhere").unwrap();
        assert_eq!(beds, vec!["light.bed"]);
    }

    #[test]
    fn test_resolve_site_room() {
        let r = registry();
        assert_eq!(
            r.resolve_targets(None, None, "bedroom").unwrap(),
            vec!["light.bed", "light.desk"]
        );
        assert_eq!(
            r.resolve_targets(Some("here"), Some("ceiling"), "kitchen")
                .unwrap(),
            vec!["light.ceiling"]
        );
    }

    #[test]
    fn test_resolve_errors() {
        let r = registry();
        assert_eq!(
            r.resolve_targets(None, None, "garage"),
            Err(ResolveError::NotConfigured)
        );
        assert_eq!(
            r.resolve_targets(Some("here"), None, "garage"),
            Err(ResolveError::NotConfigured)
        );
        assert_eq!(
            r.resolve_targets(Some("attic"), None, "bedroom"),
            Err(ResolveError::NoMatchingLights)
        );
        assert_eq!(
            r.resolve_targets(None, Some("lamp"), "bedroom"),
            Err(ResolveError::NoMatchingLights)
        );
    }

    #[tokio::test]
    async fn test_flash_light_lookup() {
        let r = registry();
        let light = r.flash_light_for_site("bedroom").unwrap();
        let light = light.lock().await;
        assert_eq!(light.entity_id, "light.bed");
        assert_eq!(light.room, "bedroom");

        assert!(r.flash_light_for_site("kitchen").is_none());
        assert!(r.flash_light_for_site("garage").is_none());
    }

    #[test]
    fn test_sunrise_target_fallbacks() {
        let r = registry();
        assert_eq!(r.room("bedroom").unwrap().sunrise_target(), Some("light.bed"));
        assert_eq!(
            r.room("kitchen").unwrap().sunrise_target(),
            Some("light.ceiling")
        );
    }

    #[test]
    fn test_known_lights_and_ordering() {
        let r = registry();
        assert_eq!(
            r.known_lights("light.desk; light.ghost;light.counter".split(';')),
            vec!["light.desk", "light.counter"]
        );
        let ids: Vec<&str> = r.lights().into_iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec!["light.bed", "light.ceiling", "light.counter", "light.desk"]
        );
    }
}
