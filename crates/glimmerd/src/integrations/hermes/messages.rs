//! Wire schemas of the hermes dialogue protocol.
//!
//! Every consumed topic has a payload struct; payloads are validated here and
//! turned into engine [`Event`]s. Nothing past this module sees raw JSON.

use serde::Deserialize;
use serde::Serialize;

use super::client::MqttMessage;
use super::HermesConfig;
use crate::engine::Event;
use crate::engine::IntentKind;
use crate::engine::IntentMessage;
use crate::engine::Slots;
use crate::engine::ToBusMessage;

/// Resolved topic names.
#[derive(Debug, Clone)]
pub struct Topics {
    pub start_listening: String,
    pub text_captured: String,
    pub say: String,
    pub session_ended: String,
    pub end_session: String,
    pub continue_session: String,
    pub intents: Vec<(String, IntentKind)>,
    pub sunrise_start: String,
    pub sunrise_stop: String,
}

impl Topics {
    pub fn new(config: &HermesConfig) -> Self {
        let p = &config.prefix;
        let intent = |name: &str| format!("{}/intent/{}", p, name);
        Self {
            start_listening: format!("{}/asr/startListening", p),
            text_captured: format!("{}/asr/textCaptured", p),
            say: format!("{}/tts/say", p),
            session_ended: format!("{}/dialogueManager/sessionEnded", p),
            end_session: format!("{}/dialogueManager/endSession", p),
            continue_session: format!("{}/dialogueManager/continueSession", p),
            intents: vec![
                (intent(&config.lights_on), IntentKind::LightsOn),
                (intent(&config.lights_off), IntentKind::LightsOff),
                (intent(&config.color_change), IntentKind::ColorChange),
                (intent(&config.dim_lights), IntentKind::DimLights),
            ],
            sunrise_start: config.sunrise_start_topic.clone(),
            sunrise_stop: config.sunrise_stop_topic.clone(),
        }
    }

    /// Every topic the integration subscribes to
    pub fn subscriptions(&self) -> Vec<&str> {
        let mut topics = vec![
            self.start_listening.as_str(),
            self.text_captured.as_str(),
            self.say.as_str(),
            self.session_ended.as_str(),
        ];
        topics.extend(self.intents.iter().map(|(t, _)| t.as_str()));
        topics.push(&self.sunrise_start);
        topics.push(&self.sunrise_stop);
        topics
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid payload on {topic}: {source}")]
    Json {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid payload on {topic}: {message}")]
    Invalid { topic: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SitePayload {
    site_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentPayload {
    session_id: String,
    site_id: String,
    #[serde(default)]
    slots: Vec<SlotPayload>,
    #[serde(default)]
    custom_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotPayload {
    slot_name: String,
    value: SlotValue,
}

#[derive(Debug, Deserialize)]
struct SlotValue {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SunriseStartPayload {
    room: String,
    minutes: f64,
}

#[derive(Debug, Deserialize)]
struct SunriseStopPayload {
    room: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndSessionPayload<'a> {
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContinueSessionPayload<'a> {
    session_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    intent_filter: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<&'a str>,
}

fn parse<'de, T: Deserialize<'de>>(msg: &'de MqttMessage) -> Result<T, DecodeError> {
    serde_json::from_slice(&msg.payload).map_err(|source| DecodeError::Json {
        topic: msg.topic.clone(),
        source,
    })
}

/// Decode a bus message into an engine event.
///
/// Returns `Ok(None)` for topics this daemon does not handle.
pub fn decode(topics: &Topics, msg: &MqttMessage) -> Result<Option<Event>, DecodeError> {
    let topic = msg.topic.as_str();

    let event = if topic == topics.start_listening {
        let p: SitePayload = parse(msg)?;
        Event::StartListening { site_id: p.site_id }
    } else if topic == topics.text_captured {
        let p: SitePayload = parse(msg)?;
        Event::TextCaptured { site_id: p.site_id }
    } else if topic == topics.say {
        let p: SitePayload = parse(msg)?;
        Event::Say { site_id: p.site_id }
    } else if topic == topics.session_ended {
        let p: SitePayload = parse(msg)?;
        Event::SessionEnded { site_id: p.site_id }
    } else if topic == topics.sunrise_start {
        let p: SunriseStartPayload = parse(msg)?;
        if !p.minutes.is_finite() || p.minutes < 0.0 {
            return Err(DecodeError::Invalid {
                topic: msg.topic.clone(),
                message: format!("minutes must be a non-negative number, got {}", p.minutes),
            });
        }
        Event::SunriseStart {
            room: p.room,
            minutes: p.minutes,
        }
    } else if topic == topics.sunrise_stop {
        let p: SunriseStopPayload = parse(msg)?;
        Event::SunriseStop { room: p.room }
    } else if let Some((_, kind)) = topics.intents.iter().find(|(t, _)| t == topic) {
        let p: IntentPayload = parse(msg)?;
        Event::Intent(IntentMessage {
            kind: *kind,
            session_id: p.session_id,
            site_id: p.site_id,
            slots: p
                .slots
                .into_iter()
                .map(|s| (s.slot_name, s.value.value))
                .collect::<Slots>(),
            custom_data: p.custom_data,
        })
    } else {
        return Ok(None);
    };

    Ok(Some(event))
}

/// Encode an outbound message as `(topic, payload)`.
pub fn encode(topics: &Topics, msg: &ToBusMessage) -> Result<(String, Vec<u8>), serde_json::Error> {
    match msg {
        ToBusMessage::EndSession { session_id, text } => {
            let payload = serde_json::to_vec(&EndSessionPayload {
                session_id,
                text: text.as_deref(),
            })?;
            Ok((topics.end_session.clone(), payload))
        }
        ToBusMessage::ContinueSession {
            session_id,
            text,
            intent_filter,
            custom_data,
            slot,
        } => {
            let payload = serde_json::to_vec(&ContinueSessionPayload {
                session_id,
                text,
                intent_filter: (!intent_filter.is_empty()).then_some(intent_filter.as_slice()),
                custom_data: custom_data.as_deref(),
                slot: slot.as_deref(),
            })?;
            Ok((topics.continue_session.clone(), payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new(&HermesConfig::default())
    }

    fn message(topic: &str, payload: &str) -> MqttMessage {
        MqttMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_decode_site_events() {
        let topics = topics();
        let event = decode(
            &topics,
            &message("hermes/asr/startListening", r#"{"siteId":"bedroom","sessionId":"x"}"#),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(Event::StartListening {
                site_id: "bedroom".to_string()
            })
        );

        let event = decode(
            &topics,
            &message("hermes/dialogueManager/sessionEnded", r#"{"siteId":"kitchen"}"#),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(Event::SessionEnded {
                site_id: "kitchen".to_string()
            })
        );
    }

    #[test]
    fn test_decode_intent_with_mixed_slots() {
        let payload = r#"{
            "sessionId": "s1",
            "siteId": "bedroom",
            "intent": {"intentName": "LightsOn"},
            "slots": [
                {"slotName": "brightness", "value": {"kind": "Number", "value": 150.0}},
                {"slotName": "color", "value": {"kind": "Custom", "value": "red"}}
            ],
            "customData": null
        }"#;
        let event = decode(&topics(), &message("hermes/intent/LightsOn", payload))
            .unwrap()
            .unwrap();
        let Event::Intent(intent) = event else {
            panic!("expected intent, got {:?}", event);
        };
        assert_eq!(intent.kind, IntentKind::LightsOn);
        assert_eq!(intent.session_id, "s1");
        assert_eq!(intent.slots.get_number("brightness"), Some(150.0));
        assert_eq!(intent.slots.get_str("color"), Some("red"));
        assert_eq!(intent.custom_data, None);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let topics = topics();
        let err = decode(&topics, &message("hermes/tts/say", "{not json")).unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));

        let err = decode(&topics, &message("hermes/tts/say", r#"{"text":"hi"}"#)).unwrap_err();
        assert!(err.to_string().contains("hermes/tts/say"));

        let err = decode(
            &topics,
            &message("glimmerd/sunrise/start", r#"{"room":"bedroom","minutes":-5}"#),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { .. }));
    }

    #[test]
    fn test_decode_sunrise_and_unknown_topics() {
        let topics = topics();
        let event = decode(
            &topics,
            &message("glimmerd/sunrise/start", r#"{"room":"bedroom","minutes":30}"#),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(Event::SunriseStart {
                room: "bedroom".to_string(),
                minutes: 30.0
            })
        );

        assert_eq!(
            decode(&topics, &message("hermes/hotword/toggleOn", "{}")).unwrap(),
            None
        );
    }

    #[test]
    fn test_custom_prefix_and_intent_names() {
        let config = HermesConfig {
            prefix: "voice".to_string(),
            lights_off: "domi:LampenAusSchalten".to_string(),
            ..Default::default()
        };
        let topics = Topics::new(&config);
        assert!(topics
            .subscriptions()
            .contains(&"voice/intent/domi:LampenAusSchalten"));
        assert_eq!(topics.end_session, "voice/dialogueManager/endSession");
        assert_eq!(topics.subscriptions().len(), 10);
    }

    #[test]
    fn test_encode_end_session() {
        let (topic, payload) = encode(
            &topics(),
            &ToBusMessage::EndSession {
                session_id: "abc".to_string(),
                text: Some("Done".to_string()),
            },
        )
        .unwrap();
        assert_eq!(topic, "hermes/dialogueManager/endSession");
        insta::assert_snapshot!(String::from_utf8(payload).unwrap(), @r#"{"sessionId":"abc","text":"Done"}"#);

        let (_, payload) = encode(
            &topics(),
            &ToBusMessage::EndSession {
                session_id: "abc".to_string(),
                text: None,
            },
        )
        .unwrap();
        insta::assert_snapshot!(String::from_utf8(payload).unwrap(), @r#"{"sessionId":"abc"}"#);
    }

    #[test]
    fn test_encode_continue_session() {
        let (topic, payload) = encode(
            &topics(),
            &ToBusMessage::ContinueSession {
                session_id: "abc".to_string(),
                text: "Which color?".to_string(),
                intent_filter: vec!["ColorChange".to_string()],
                custom_data: Some("light.bed;light.desk".to_string()),
                slot: Some("color".to_string()),
            },
        )
        .unwrap();
        assert_eq!(topic, "hermes/dialogueManager/continueSession");
        insta::assert_snapshot!(
            String::from_utf8(payload).unwrap(),
            @r#"{"sessionId":"abc","text":"Which color?","intentFilter":["ColorChange"],"customData":"light.bed;light.desk","slot":"color"}"#
        );
    }
}
