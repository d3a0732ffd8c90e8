//! Sunrise alarms: a light fading up from dark to full brightness over a given
//! number of minutes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::event::InternalEvent;
use super::registry::LightHandle;
use super::service::LightService;
use super::service::TurnOn;
use crate::color::Rgb;

/// Brightness of the ramp after `elapsed` out of `duration`.
///
/// Grows linearly from 0 to 255; a zero-length ramp is at full brightness at once.
pub fn ramp_brightness(elapsed: Duration, duration: Duration) -> u8 {
    if duration.is_zero() {
        return u8::MAX;
    }
    let fraction = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
    (255.0 * fraction).floor() as u8
}

#[derive(Debug, Clone, Copy)]
pub struct SunriseSettings {
    pub color: Rgb,
    pub tick: Duration,
}

/// A running sunrise ramp. Dropping the job cancels it.
#[derive(Debug)]
pub struct SunriseJob {
    pub id: u64,
    token: CancellationToken,
    _guard: DropGuard,
}

struct Ramp {
    id: u64,
    room: String,
    entity_id: String,
    duration: Duration,
    started: Instant,
    /// Lights whose flash sessions pause the ramp
    watched: Vec<LightHandle>,
    service: Arc<dyn LightService>,
    settings: SunriseSettings,
    token: CancellationToken,
    done: mpsc::UnboundedSender<InternalEvent>,
}

impl SunriseJob {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: u64,
        room: &str,
        entity_id: &str,
        duration: Duration,
        watched: Vec<LightHandle>,
        service: Arc<dyn LightService>,
        settings: SunriseSettings,
        done: mpsc::UnboundedSender<InternalEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let ramp = Ramp {
            id,
            room: room.to_string(),
            entity_id: entity_id.to_string(),
            duration,
            started: Instant::now(),
            watched,
            service,
            settings,
            token: token.clone(),
            done,
        };
        tokio::spawn(ramp.run());

        Self {
            id,
            _guard: token.clone().drop_guard(),
            token,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Ramp {
    async fn deferring(&self) -> bool {
        for light in &self.watched {
            if light.lock().await.session.is_busy() {
                return true;
            }
        }
        false
    }

    async fn run(self) {
        info!(
            "Sunrise {} in {} on {} over {:?}",
            self.id, self.room, self.entity_id, self.duration
        );

        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Brightness 0 is never written; the ramp starts from whatever dark is
        let mut applied: u8 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("Sunrise {} in {} cancelled", self.id, self.room);
                    return;
                }
                _ = ticker.tick() => {}
            }

            let target = ramp_brightness(self.started.elapsed(), self.duration);
            if target == applied {
                continue;
            }
            if self.deferring().await {
                debug!("Sunrise {} waiting for notification flash", self.id);
                continue;
            }

            let cmd = TurnOn::new(&self.entity_id, self.settings.tick)
                .color(Some(self.settings.color))
                .brightness(Some(target));
            match self.service.turn_on(cmd).await {
                Ok(()) => {
                    debug!("Sunrise {} at {}", self.id, target);
                    applied = target;
                }
                Err(e) => warn!("Sunrise {} failed to set {}: {}", self.id, self.entity_id, e),
            }

            if applied == u8::MAX {
                break;
            }
        }

        info!("Sunrise {} in {} complete", self.id, self.room);
        let _ = self.done.send(InternalEvent::SunriseFinished {
            room: self.room,
            job_id: self.id,
        });
    }
}
