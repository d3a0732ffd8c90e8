use std::collections::HashMap;

/// Events delivered to the dispatcher from the message bus (or the HTTP API).
///
/// Bus payloads are decoded into these at the integration boundary, so the
/// dispatcher never sees raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The voice front-end started listening at a site.
    StartListening { site_id: String },

    /// Speech recognition captured text at a site.
    TextCaptured { site_id: String },

    /// Text-to-speech started speaking at a site.
    Say { site_id: String },

    /// A dialogue session at a site ended.
    SessionEnded { site_id: String },

    /// A recognized voice intent.
    Intent(IntentMessage),

    /// Start a sunrise ramp in a room.
    SunriseStart { room: String, minutes: f64 },

    /// Cancel a room's sunrise ramp.
    SunriseStop { room: String },
}

/// Voice intents handled by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    LightsOn,
    LightsOff,
    ColorChange,
    DimLights,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntentMessage {
    pub kind: IntentKind,
    pub session_id: String,
    pub site_id: String,
    pub slots: Slots,
    /// Continuation data from a previous `continueSession`
    pub custom_data: Option<String>,
}

/// Slot values of an intent, keyed by slot name.
///
/// Values keep their JSON type: the recognizer sends numbers for numeric slots and
/// strings for custom ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slots(HashMap<String, serde_json::Value>);

impl Slots {
    pub fn new(values: HashMap<String, serde_json::Value>) -> Self {
        Self(values)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    /// Numeric slot value. Numeric strings are accepted as well.
    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.0.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromIterator<(String, serde_json::Value)> for Slots {
    fn from_iter<T: IntoIterator<Item = (String, serde_json::Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Feedback from tasks spawned by the dispatcher.
///
/// These travel on a channel private to the dispatcher and are never published on
/// the message bus.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    /// A flash start or oscillation step completed.
    FlashStepFinished { entity_id: String },

    /// A restore sequence completed.
    FlashRestored { entity_id: String },

    /// A flash sequence failed part-way.
    FlashFailed { entity_id: String, reason: String },

    /// A sunrise job ran to completion.
    SunriseFinished { room: String, job_id: u64 },
}
