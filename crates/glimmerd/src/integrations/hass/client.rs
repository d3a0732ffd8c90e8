use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::HassConfig;
use crate::color::Rgb;
use crate::engine::LightService;
use crate::engine::LightServiceError;
use crate::engine::LightState;
use crate::engine::TurnOn;

/// Home Assistant REST client for the `light` domain
#[derive(Debug, Clone)]
pub struct HassClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ServicePayload<'a> {
    entity_id: &'a str,
    transition: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    rgb_color: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    state: String,
    #[serde(default)]
    attributes: StateAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct StateAttributes {
    #[serde(default)]
    rgb_color: Option<Rgb>,
    #[serde(default)]
    brightness: Option<u8>,
}

impl HassClient {
    pub fn new(config: &HassConfig) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .context("Home Assistant token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn call_service(
        &self,
        service: &str,
        payload: &ServicePayload<'_>,
    ) -> Result<(), LightServiceError> {
        let url = format!("{}/api/services/light/{}", self.base_url, service);
        debug!("POST {} {:?}", url, payload);

        let response = self.http.post(&url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(LightServiceError::Status {
                entity_id: payload.entity_id.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Run a service call, either awaiting it or leaving it to a background task.
    async fn dispatch(
        &self,
        service: &'static str,
        entity_id: &str,
        transition: Duration,
        rgb_color: Option<Rgb>,
        brightness: Option<u8>,
        wait: bool,
    ) -> Result<(), LightServiceError> {
        if wait {
            let payload = ServicePayload {
                entity_id,
                transition: transition.as_secs_f64(),
                rgb_color,
                brightness,
            };
            return self.call_service(service, &payload).await;
        }

        let client = self.clone();
        let entity_id = entity_id.to_string();
        tokio::spawn(async move {
            let payload = ServicePayload {
                entity_id: &entity_id,
                transition: transition.as_secs_f64(),
                rgb_color,
                brightness,
            };
            if let Err(e) = client.call_service(service, &payload).await {
                warn!("light.{} for {} failed: {}", service, entity_id, e);
            }
        });
        Ok(())
    }
}

#[async_trait]
impl LightService for HassClient {
    async fn turn_on(&self, cmd: TurnOn) -> Result<(), LightServiceError> {
        self.dispatch(
            "turn_on",
            &cmd.entity_id,
            cmd.transition,
            cmd.rgb_color,
            cmd.brightness,
            cmd.wait,
        )
        .await
    }

    async fn turn_off(
        &self,
        entity_id: &str,
        transition: Duration,
        wait: bool,
    ) -> Result<(), LightServiceError> {
        self.dispatch("turn_off", entity_id, transition, None, None, wait)
            .await
    }

    async fn get_state(&self, entity_id: &str) -> Result<LightState, LightServiceError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(LightServiceError::NotFound(entity_id.to_string())),
            status if !status.is_success() => {
                return Err(LightServiceError::Status {
                    entity_id: entity_id.to_string(),
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        let body: StateResponse = response.json().await?;
        match body.state.as_str() {
            "on" => Ok(LightState {
                on: true,
                rgb_color: body.attributes.rgb_color,
                brightness: body.attributes.brightness,
            }),
            "off" => Ok(LightState::off()),
            _ => Err(LightServiceError::Unavailable(entity_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    use super::*;

    fn client(server: &MockServer) -> HassClient {
        HassClient::new(&HassConfig {
            url: format!("{}/", server.uri()),
            token: "secret".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_turn_on_posts_service_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "entity_id": "light.bed",
                "transition": 0.3,
                "rgb_color": [0, 0, 255],
                "brightness": 128
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let cmd = TurnOn::new("light.bed", Duration::from_millis(300))
            .color(Some(Rgb(0, 0, 255)))
            .brightness(Some(128))
            .wait();
        client(&server).turn_on(cmd).await.unwrap();
    }

    #[tokio::test]
    async fn test_turn_off_without_wait_runs_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_off"))
            .and(body_json(json!({"entity_id": "light.bed", "transition": 0.3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        client(&server)
            .turn_off("light.bed", Duration::from_millis(300), false)
            .await
            .unwrap();

        for _ in 0..100 {
            let received = server.received_requests().await.unwrap_or_default();
            if !received.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("turn_off request never reached the server");
    }

    #[tokio::test]
    async fn test_failed_service_call_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .turn_on(TurnOn::new("light.bed", Duration::ZERO).wait())
            .await
            .unwrap_err();
        assert!(matches!(err, LightServiceError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_get_state_on() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/light.bed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity_id": "light.bed",
                "state": "on",
                "attributes": {"rgb_color": [255, 120, 0], "brightness": 200, "friendly_name": "Bed"}
            })))
            .mount(&server)
            .await;

        let state = client(&server).get_state("light.bed").await.unwrap();
        assert_eq!(
            state,
            LightState {
                on: true,
                rgb_color: Some(Rgb(255, 120, 0)),
                brightness: Some(200),
            }
        );
    }

    #[tokio::test]
    async fn test_get_state_off_drops_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/light.bed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "off",
                "attributes": {"rgb_color": null, "brightness": null}
            })))
            .mount(&server)
            .await;

        let state = client(&server).get_state("light.bed").await.unwrap();
        assert_eq!(state, LightState::off());
    }

    #[tokio::test]
    async fn test_get_state_unknown_entity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/light.ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/states/light.flaky"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"state": "unavailable"})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.get_state("light.ghost").await,
            Err(LightServiceError::NotFound(_))
        ));
        assert!(matches!(
            client.get_state("light.flaky").await,
            Err(LightServiceError::Unavailable(_))
        ));
    }
}
