use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Stream of messages from subscribed topics
pub type MqttMessageReceiver = mpsc::UnboundedReceiver<MqttMessage>;

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Publish a message to an MQTT topic
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Box<dyn Error + Send>>;

    /// Take the stream of incoming messages
    ///
    /// Returns None before `connect()` or if the stream was already taken. The
    /// stream ends when the connection is dropped.
    fn take_messages(&mut self) -> Option<MqttMessageReceiver>;
}

fn not_connected() -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "MQTT client not connected. Call connect() first.",
    ))
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug)]
pub struct MockMqttClient {
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub is_connected: bool,
    inbound_tx: Option<mpsc::UnboundedSender<MqttMessage>>,
    inbound_rx: Option<MqttMessageReceiver>,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        if !self.is_connected {
            return Err(not_connected());
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Box<dyn Error + Send>> {
        if !self.is_connected {
            return Err(not_connected());
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn take_messages(&mut self) -> Option<MqttMessageReceiver> {
        self.inbound_rx.take()
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscriptions: Vec::new(),
            published: Vec::new(),
            is_connected: false,
            inbound_tx: Some(tx),
            inbound_rx: Some(rx),
        }
    }

    /// Queue a message as if the broker had delivered it
    pub fn add_message(&self, topic: &str, payload: &[u8]) {
        if let Some(tx) = &self.inbound_tx {
            let _ = tx.send(MqttMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
    }

    /// Simulate the broker connection closing
    pub fn disconnect(&mut self) {
        self.inbound_tx = None;
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<MqttMessageReceiver>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &super::MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 64);

        let (message_tx, message_rx) = mpsc::unbounded_channel();

        // rumqttc only makes progress while its event loop is polled
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        // Send to channel; if receiver dropped, exit
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("MQTT connection established");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        Ok(())
    }

    fn take_messages(&mut self) -> Option<MqttMessageReceiver> {
        self.message_rx.take()
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
