use serde::Deserialize;

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "glimmerd".to_string()
}

/// Configuration for the MQTT connection
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,
}

/// Topic and intent naming on the voice-assistant bus
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HermesConfig {
    /// Topic prefix of the dialogue pipeline (default: "hermes")
    pub prefix: String,

    pub lights_on: String,
    pub lights_off: String,
    pub color_change: String,
    pub dim_lights: String,

    pub sunrise_start_topic: String,
    pub sunrise_stop_topic: String,

    /// `location` slot value meaning every room
    pub all_keyword: String,

    /// `location` slot value meaning the room of the requesting site
    pub here_keyword: String,
}

impl Default for HermesConfig {
    fn default() -> Self {
        Self {
            prefix: "hermes".to_string(),
            lights_on: "LightsOn".to_string(),
            lights_off: "LightsOff".to_string(),
            color_change: "ColorChange".to_string(),
            dim_lights: "DimLights".to_string(),
            sunrise_start_topic: "glimmerd/sunrise/start".to_string(),
            sunrise_stop_topic: "glimmerd/sunrise/stop".to_string(),
            all_keyword: "all".to_string(),
            here_keyword: "here".to_string(),
        }
    }
}
