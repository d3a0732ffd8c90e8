use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessageReceiver;
use super::messages::decode;
use super::messages::encode;
use super::messages::Topics;
use super::MqttConfig;
use crate::engine::EventSender;
use crate::engine::Integration;
use crate::engine::ToBusMessage;

/// Voice-assistant bus integration
///
/// Subscribes to the dialogue pipeline's MQTT topics, decodes them into dispatcher
/// events, and publishes the dispatcher's dialogue responses.
pub struct HermesIntegration<C: MqttClient> {
    client: Arc<Mutex<C>>,
    config: MqttConfig,
    topics: Topics,
    /// Handle to the background message processing task
    _message_task: Option<JoinHandle<()>>,
}

impl<C: MqttClient> HermesIntegration<C> {
    /// Create a new hermes integration
    pub fn new(client: C, config: &MqttConfig, topics: Topics) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            config: config.clone(),
            topics,
            _message_task: None,
        }
    }

    /// Decode incoming MQTT messages and forward them to the dispatcher
    ///
    /// Runs until the broker connection ends or the dispatcher goes away.
    async fn process_messages_task(
        mut messages: MqttMessageReceiver,
        topics: Topics,
        to_dispatcher: EventSender,
    ) {
        while let Some(msg) = messages.recv().await {
            debug!("Received message on topic: {}", msg.topic);

            match decode(&topics, &msg) {
                Ok(Some(event)) => {
                    if to_dispatcher.send(event).await.is_err() {
                        info!("Dispatcher closed, stopping message processing");
                        break;
                    }
                }
                Ok(None) => debug!("Ignoring message on unhandled topic {}", msg.topic),
                Err(e) => warn!("Dropping message: {}", e),
            }
        }
        info!("Hermes message processing task exiting");
    }
}

#[async_trait]
impl<C: MqttClient + 'static> Integration for HermesIntegration<C> {
    fn name(&self) -> &str {
        "hermes"
    }

    async fn setup(&mut self, tx: EventSender) -> Result<(), Box<dyn Error + Send>> {
        info!(
            "Connecting to MQTT broker at {}:{}",
            self.config.broker, self.config.port
        );

        let messages = {
            let mut client = self.client.lock().await;
            client.connect().await?;
            for topic in self.topics.subscriptions() {
                debug!("Subscribing to {}", topic);
                client.subscribe(topic).await?;
            }
            client.take_messages().ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "MQTT message stream unavailable",
                ))
            })?
        };

        let topics = self.topics.clone();
        let task = tokio::spawn(async move {
            Self::process_messages_task(messages, topics, tx).await;
        });
        self._message_task = Some(task);

        info!("Hermes integration ready");
        Ok(())
    }

    async fn handle_message(&mut self, msg: ToBusMessage) -> Result<(), Box<dyn Error + Send>> {
        let (topic, payload) =
            encode(&self.topics, &msg).map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        {
            let mut client = self.client.lock().await;
            client.publish(&topic, &payload).await?;
        }

        debug!("Published {}", topic);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Hermes integration shutting down");
        if let Some(task) = self._message_task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::Event;
    use crate::integrations::hermes::client::MockMqttClient;
    use crate::integrations::hermes::HermesConfig;

    fn mqtt_config() -> MqttConfig {
        MqttConfig {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "test".to_string(),
            username: None,
            password: None,
        }
    }

    fn integration() -> HermesIntegration<MockMqttClient> {
        HermesIntegration::new(
            MockMqttClient::new(),
            &mqtt_config(),
            Topics::new(&HermesConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_setup_subscribes_to_all_topics() {
        let mut integration = integration();
        let (tx, _rx) = mpsc::channel(8);
        integration.setup(tx).await.unwrap();

        let client = integration.client.lock().await;
        assert!(client.is_connected);
        assert_eq!(client.subscriptions.len(), 10);
        assert!(client
            .subscriptions
            .contains(&"hermes/dialogueManager/sessionEnded".to_string()));
        assert!(client
            .subscriptions
            .contains(&"hermes/intent/ColorChange".to_string()));
    }

    #[tokio::test]
    async fn test_incoming_messages_become_events() {
        let mut integration = integration();
        let (tx, mut rx) = mpsc::channel(8);
        integration.setup(tx).await.unwrap();

        {
            let client = integration.client.lock().await;
            client.add_message("hermes/tts/say", b"garbage");
            client.add_message("hermes/hotword/detected", b"{}");
            client.add_message("hermes/tts/say", br#"{"siteId":"bedroom","text":"hi"}"#);
        }

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            Event::Say {
                site_id: "bedroom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_processing_stops_when_connection_closes() {
        let mut integration = integration();
        let (tx, mut rx) = mpsc::channel(8);
        integration.setup(tx).await.unwrap();

        integration.client.lock().await.disconnect();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handle_message_publishes_response() {
        let mut integration = integration();
        let (tx, _rx) = mpsc::channel(8);
        integration.setup(tx).await.unwrap();

        integration
            .handle_message(ToBusMessage::EndSession {
                session_id: "s1".to_string(),
                text: None,
            })
            .await
            .unwrap();

        let client = integration.client.lock().await;
        assert_eq!(client.published.len(), 1);
        assert_eq!(client.published[0].0, "hermes/dialogueManager/endSession");
        assert_eq!(client.published[0].1, br#"{"sessionId":"s1"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_publish_before_setup_fails() {
        let mut integration = integration();
        let result = integration
            .handle_message(ToBusMessage::EndSession {
                session_id: "s1".to_string(),
                text: None,
            })
            .await;
        assert!(result.is_err());
    }
}
