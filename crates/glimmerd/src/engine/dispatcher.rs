use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::event::Event;
use super::event::InternalEvent;
use super::flash;
use super::flash::FlashRequest;
use super::flash::FlashTiming;
use super::flash::StepAction;
use super::integration::spawn_integration;
use super::integration::EventReceiver;
use super::integration::EventSender;
use super::integration::Integration;
use super::integration::ToBusSender;
use super::message::ToBusMessage;
use super::registry::LightHandle;
use super::registry::Registry;
use super::service::LightService;
use super::service::LightServiceError;
use super::sunrise::SunriseJob;
use super::sunrise::SunriseSettings;
use crate::brightness::BrightnessConfig;
use crate::color::ColorResolver;
use crate::color::Rgb;
use crate::config::Config;
use crate::config::ResponsesConfig;

/// Capacity for the bus→dispatcher event channel
/// Provides backpressure when the bus delivers faster than the dispatcher can process
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Notification colours for the dialogue phases
#[derive(Debug, Clone, Copy)]
pub struct FlashPalette {
    pub listen: Rgb,
    pub load: Rgb,
    pub speak: Rgb,
}

/// Everything the dispatcher needs from configuration besides the registry
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub palette: FlashPalette,
    pub timing: FlashTiming,
    pub brightness: BrightnessConfig,
    pub sunrise: SunriseSettings,
    pub colors: ColorResolver,
    pub responses: ResponsesConfig,
    /// Intent name used to filter the colour follow-up question
    pub color_change_intent: String,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            palette: FlashPalette {
                listen: config.flash.listen,
                load: config.flash.load,
                speak: config.flash.speak,
            },
            timing: FlashTiming::default(),
            brightness: config.brightness.clone(),
            sunrise: SunriseSettings {
                color: config.sunrise.color,
                tick: Duration::from_millis(config.sunrise.tick_ms),
            },
            colors: ColorResolver::new(&config.colors),
            responses: config.responses.clone(),
            color_change_intent: config.hermes.color_change.clone(),
        }
    }
}

/// glimmerd dispatcher
///
/// Owns every flash session and sunrise job. Bus events and completions of the
/// tasks it spawns are processed one at a time, so session state only changes
/// here and in the short critical sections of its sequence tasks.
pub struct Dispatcher {
    pub(super) registry: Arc<Registry>,
    pub(super) service: Arc<dyn LightService>,
    pub(super) settings: DispatcherSettings,

    /// Receive events from integrations and the API
    events_rx: EventReceiver,

    /// Sender handed to integrations
    events_tx: EventSender,

    /// Completions of flash sequences and sunrise jobs
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,

    /// Channels to bus integrations (for dialogue responses)
    bus_channels: Vec<ToBusSender>,

    /// Active sunrise per room
    pub(super) sunrise_jobs: HashMap<String, SunriseJob>,
    next_job_id: u64,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        service: Arc<dyn LightService>,
        settings: DispatcherSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            service,
            settings,
            events_rx,
            events_tx,
            internal_rx,
            internal_tx,
            bus_channels: Vec::new(),
            sunrise_jobs: HashMap::new(),
            next_job_id: 0,
            integration_handles: Vec::new(),
        }
    }

    /// Sender for delivering events to this dispatcher
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Register a bus integration
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, integration: Box<dyn Integration>) {
        let (to_bus_tx, to_bus_rx) = mpsc::unbounded_channel();
        self.bus_channels.push(to_bus_tx);
        let handle = spawn_integration(integration, self.events_tx.clone(), to_bus_rx);
        self.integration_handles.push(handle);
    }

    /// Run the dispatcher's main event loop
    pub async fn run(&mut self) {
        info!("Dispatcher starting");
        loop {
            tokio::select! {
                Some(event) = self.internal_rx.recv() => self.handle_internal(event).await,
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        info!("Dispatcher shutting down");
    }

    /// Stop all sunrise jobs and integrations
    pub async fn shutdown(&mut self) {
        for (room, job) in self.sunrise_jobs.drain() {
            debug!("Cancelling sunrise {} in {}", job.id, room);
            job.cancel();
        }
        // Integrations exit once their outbound channel closes
        self.bus_channels.clear();
        for handle in self.integration_handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Integration task failed: {}", e);
            }
        }
    }

    pub(super) fn send_to_bus(&self, msg: ToBusMessage) {
        if self.bus_channels.is_empty() {
            debug!("No bus integration for {:?}", msg);
        }
        for tx in &self.bus_channels {
            if tx.send(msg.clone()).is_err() {
                warn!("Bus integration channel closed");
            }
        }
    }

    /// Handle an event from the bus or the API
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::StartListening { site_id } => {
                self.notify(&site_id, self.settings.palette.listen).await
            }
            Event::TextCaptured { site_id } => {
                self.update_color(&site_id, self.settings.palette.load).await
            }
            Event::Say { site_id } => self.notify(&site_id, self.settings.palette.speak).await,
            Event::SessionEnded { site_id } => self.end_session(&site_id).await,
            Event::Intent(intent) => self.handle_intent(intent).await,
            Event::SunriseStart { room, minutes } => self.start_sunrise(&room, minutes),
            Event::SunriseStop { room } => self.stop_sunrise(&room),
        }
    }

    /// Handle completion of a task spawned by the dispatcher
    pub async fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::FlashStepFinished { entity_id } => {
                self.step_finished(&entity_id).await
            }
            InternalEvent::FlashRestored { entity_id } => {
                let Some(light) = self.registry.light(&entity_id).cloned() else {
                    return;
                };
                info!("Restored {}", entity_id);
                let restart = light.lock().await.session.restored();
                if restart {
                    debug!("Starting deferred flash on {}", entity_id);
                    self.start_flashing(light).await;
                }
            }
            InternalEvent::FlashFailed { entity_id, reason } => {
                warn!("Flashing {} failed: {}", entity_id, reason);
                let Some(light) = self.registry.light(&entity_id).cloned() else {
                    return;
                };
                let restart = light.lock().await.session.abort();
                if restart {
                    info!("Starting deferred flash on {} after failed restore", entity_id);
                    self.start_flashing(light).await;
                }
            }
            InternalEvent::SunriseFinished { room, job_id } => {
                if self.sunrise_jobs.get(&room).map(|job| job.id) == Some(job_id) {
                    self.sunrise_jobs.remove(&room);
                }
            }
        }
    }

    async fn notify(&mut self, site_id: &str, color: Rgb) {
        let Some(light) = self.registry.flash_light_for_site(site_id).cloned() else {
            debug!("No flash light for site {}", site_id);
            return;
        };

        let request = light.lock().await.session.request(color);
        match request {
            FlashRequest::Start => self.start_flashing(light).await,
            FlashRequest::Updated => debug!("Flash colour for {} now {}", site_id, color),
            FlashRequest::Rearmed => info!("Flashing resumed at {}", site_id),
            FlashRequest::Deferred => debug!("Flash at {} waits for restore", site_id),
        }
    }

    async fn update_color(&mut self, site_id: &str, color: Rgb) {
        if let Some(light) = self.registry.flash_light_for_site(site_id) {
            if light.lock().await.session.update_color(color) {
                debug!("Flash colour for {} now {}", site_id, color);
            }
        }
    }

    async fn end_session(&mut self, site_id: &str) {
        if let Some(light) = self.registry.flash_light_for_site(site_id) {
            if light.lock().await.session.end() {
                info!("Session ended at {}, restoring after current step", site_id);
            }
        }
    }

    async fn start_flashing(&mut self, light: LightHandle) {
        let entity_id = light.lock().await.entity_id.clone();

        let state = match self.service.get_state(&entity_id).await {
            Ok(state) => state,
            Err(LightServiceError::NotFound(_)) => {
                debug!("Not flashing unknown light {}", entity_id);
                return;
            }
            Err(e) => {
                warn!("Not flashing {}: {}", entity_id, e);
                return;
            }
        };

        light.lock().await.session.begin(&state);
        info!("Flashing {}", entity_id);

        let sequence = flash::run_start(
            self.service.clone(),
            light,
            entity_id.clone(),
            state.on,
            self.settings.timing,
        );
        self.spawn_flash(
            entity_id.clone(),
            sequence,
            InternalEvent::FlashStepFinished { entity_id },
        );
    }

    async fn step_finished(&mut self, entity_id: &str) {
        let Some(light) = self.registry.light(entity_id) else {
            warn!("Step finished for unknown light {}", entity_id);
            return;
        };

        let action = light.lock().await.session.step_finished();
        let entity_id = entity_id.to_string();
        match action {
            StepAction::Oscillate(color) => {
                let sequence = flash::run_step(
                    self.service.clone(),
                    entity_id.clone(),
                    color,
                    self.settings.timing,
                );
                self.spawn_flash(
                    entity_id.clone(),
                    sequence,
                    InternalEvent::FlashStepFinished { entity_id },
                );
            }
            StepAction::Restore(saved) => {
                debug!("Restoring {} to {:?}", entity_id, saved);
                let sequence = flash::run_restore(
                    self.service.clone(),
                    entity_id.clone(),
                    saved,
                    self.settings.timing,
                );
                self.spawn_flash(
                    entity_id.clone(),
                    sequence,
                    InternalEvent::FlashRestored { entity_id },
                );
            }
            StepAction::Nothing => debug!("Ignoring stray step for {}", entity_id),
        }
    }

    /// Run a flash sequence, reporting `done` or a failure when it completes
    fn spawn_flash<F>(&self, entity_id: String, sequence: F, done: InternalEvent)
    where
        F: Future<Output = Result<(), LightServiceError>> + Send + 'static,
    {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let event = match sequence.await {
                Ok(()) => done,
                Err(e) => InternalEvent::FlashFailed {
                    entity_id,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn start_sunrise(&mut self, room_name: &str, minutes: f64) {
        let Ok(duration) = Duration::try_from_secs_f64(minutes * 60.0) else {
            warn!("Ignoring sunrise in {} with invalid duration {}", room_name, minutes);
            return;
        };
        let Some(room) = self.registry.room(room_name) else {
            warn!("Sunrise requested for unknown room {}", room_name);
            return;
        };
        let Some(target) = room.sunrise_target() else {
            warn!("Room {} has no lights for a sunrise", room_name);
            return;
        };

        let mut watched_ids = vec![target];
        if let Some(flash_light) = room.flash_light.as_deref() {
            if flash_light != target {
                watched_ids.push(flash_light);
            }
        }
        let watched: Vec<LightHandle> = watched_ids
            .into_iter()
            .filter_map(|id| self.registry.light(id).cloned())
            .collect();

        if let Some(previous) = self.sunrise_jobs.remove(room_name) {
            info!("Replacing sunrise {} in {}", previous.id, room_name);
            previous.cancel();
        }

        self.next_job_id += 1;
        let job = SunriseJob::spawn(
            self.next_job_id,
            room_name,
            target,
            duration,
            watched,
            self.service.clone(),
            self.settings.sunrise,
            self.internal_tx.clone(),
        );
        self.sunrise_jobs.insert(room_name.to_string(), job);
    }

    fn stop_sunrise(&mut self, room_name: &str) {
        match self.sunrise_jobs.remove(room_name) {
            Some(job) => {
                info!("Stopping sunrise {} in {}", job.id, room_name);
                job.cancel();
            }
            None => debug!("No sunrise running in {}", room_name),
        }
    }

    #[cfg(test)]
    pub(super) async fn next_internal(&mut self) -> InternalEvent {
        match self.internal_rx.recv().await {
            Some(event) => event,
            None => unreachable!("dispatcher holds an internal sender"),
        }
    }

    #[cfg(test)]
    pub(super) fn subscribe_bus(&mut self) -> super::integration::ToBusReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus_channels.push(tx);
        rx
    }
}
