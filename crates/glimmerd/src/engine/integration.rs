use std::error::Error;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::event::Event;
use super::message::ToBusMessage;

/// Channel types for events FROM integrations TO the dispatcher
/// These are bounded channels to provide backpressure
pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Channel types for messages FROM the dispatcher TO integrations (unbounded - dispatcher must not block)
pub type ToBusSender = mpsc::UnboundedSender<ToBusMessage>;
pub type ToBusReceiver = mpsc::UnboundedReceiver<ToBusMessage>;

/// Integration trait that all bus integrations must implement
#[async_trait]
pub trait Integration: Send + Sync {
    /// Get the name/identifier of this integration
    fn name(&self) -> &str;

    /// Set up the integration - connect, subscribe to topics, etc.
    ///
    /// The integration receives a sender to deliver decoded events to the
    /// dispatcher.
    async fn setup(&mut self, tx: EventSender) -> Result<(), Box<dyn Error + Send>>;

    /// Handle an outbound message from the dispatcher
    async fn handle_message(&mut self, msg: ToBusMessage) -> Result<(), Box<dyn Error + Send>>;

    /// Shut down the integration gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// Run an integration in a background task
///
/// The task sets the integration up, then forwards outbound messages to it until
/// the dispatcher drops its sender.
pub fn spawn_integration(
    mut integration: Box<dyn Integration>,
    tx: EventSender,
    mut rx: ToBusReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = integration.name().to_string();

        if let Err(e) = integration.setup(tx).await {
            warn!("Integration '{}' setup failed: {}", name, e);
            return;
        }

        while let Some(msg) = rx.recv().await {
            if let Err(e) = integration.handle_message(msg).await {
                warn!("Integration '{}' failed to handle message: {}", name, e);
            }
        }

        if let Err(e) = integration.shutdown().await {
            warn!("Integration '{}' shutdown failed: {}", name, e);
        }
    })
}
