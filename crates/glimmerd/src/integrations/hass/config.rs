use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    10
}

/// Connection to the Home Assistant REST API
#[derive(Debug, Clone, Deserialize)]
pub struct HassConfig {
    /// Base URL, e.g. "http://homeassistant.local:8123"
    pub url: String,

    /// Long-lived access token
    pub token: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}
