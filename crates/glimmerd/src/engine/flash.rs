//! Notification flashing.
//!
//! A [`FlashSession`] tracks one light's flash cycle: Idle, then Flashing while the
//! dialogue is active, then back to Idle once the pre-flash state has been restored.
//! The session itself is a plain state machine; the device work happens in the
//! sequence functions at the bottom of this module, which the dispatcher runs as
//! tasks and which report back through internal events.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use super::registry::LightHandle;
use super::service::LightService;
use super::service::LightServiceError;
use super::service::TurnOn;
use super::state::LightState;
use crate::color::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashStatus {
    Idle,
    Flashing,
}

/// The light's state before flashing began, restored when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedState {
    pub on: bool,
    pub rgb_color: Option<Rgb>,
    pub brightness: Option<u8>,
}

/// A user command addressed to a light that may be flashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteThrough {
    Off,
    On {
        rgb_color: Option<Rgb>,
        brightness: Option<u8>,
    },
}

/// Outcome of a flash request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashRequest {
    /// The session was idle; the caller must run the start sequence.
    Start,
    /// Already flashing; the next step uses the new colour.
    Updated,
    /// A step was still running after the session ended, so flashing resumes
    /// without restoring first.
    Rearmed,
    /// A restore is running; flashing starts again once it completes.
    Deferred,
}

/// What to do after an oscillation step completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Oscillate(Rgb),
    Restore(SavedState),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Oscillate,
    Restore,
}

#[derive(Debug, Clone)]
pub struct FlashSession {
    status: FlashStatus,
    saved: Option<SavedState>,
    target_color: Rgb,
    in_flight: Option<Sequence>,
    start_after_restore: bool,
}

impl Default for FlashSession {
    fn default() -> Self {
        Self {
            status: FlashStatus::Idle,
            saved: None,
            target_color: Rgb(255, 255, 255),
            in_flight: None,
            start_after_restore: false,
        }
    }
}

impl FlashSession {
    pub fn status(&self) -> FlashStatus {
        self.status
    }

    pub fn is_flashing(&self) -> bool {
        self.status == FlashStatus::Flashing
    }

    /// Flashing, or still running a start, step, or restore sequence
    pub fn is_busy(&self) -> bool {
        self.is_flashing() || self.in_flight.is_some()
    }

    pub fn target_color(&self) -> Rgb {
        self.target_color
    }

    pub fn saved(&self) -> Option<&SavedState> {
        self.saved.as_ref()
    }

    /// Ask the light to flash in `color`.
    pub fn request(&mut self, color: Rgb) -> FlashRequest {
        self.target_color = color;
        match (self.status, self.in_flight) {
            (FlashStatus::Flashing, _) => FlashRequest::Updated,
            (FlashStatus::Idle, Some(Sequence::Oscillate)) if self.saved.is_some() => {
                self.status = FlashStatus::Flashing;
                FlashRequest::Rearmed
            }
            (FlashStatus::Idle, Some(_)) => {
                self.start_after_restore = true;
                FlashRequest::Deferred
            }
            (FlashStatus::Idle, None) => FlashRequest::Start,
        }
    }

    /// Change the colour of the remaining steps. Ignored unless flashing.
    pub fn update_color(&mut self, color: Rgb) -> bool {
        if !self.is_flashing() {
            return false;
        }
        self.target_color = color;
        true
    }

    /// Capture the pre-flash state and enter Flashing.
    ///
    /// An off light reports no attributes, so only the power state is saved; the
    /// start sequence fills in colour and brightness once it has turned it on.
    pub fn begin(&mut self, state: &LightState) {
        self.saved = Some(if state.on {
            SavedState {
                on: true,
                rgb_color: state.rgb_color,
                brightness: state.brightness,
            }
        } else {
            SavedState {
                on: false,
                rgb_color: None,
                brightness: None,
            }
        });
        self.status = FlashStatus::Flashing;
        self.in_flight = Some(Sequence::Oscillate);
        self.start_after_restore = false;
    }

    /// Fill in attributes the snapshot is still missing. Values already present,
    /// including any written through by the user, are kept.
    pub fn record_attributes(&mut self, rgb_color: Option<Rgb>, brightness: Option<u8>) {
        if let Some(saved) = self.saved.as_mut() {
            saved.rgb_color = saved.rgb_color.or(rgb_color);
            saved.brightness = saved.brightness.or(brightness);
        }
    }

    /// Leave Flashing. The restore begins when the current step completes.
    ///
    /// Returns whether the session was flashing.
    pub fn end(&mut self) -> bool {
        self.start_after_restore = false;
        let was_flashing = self.is_flashing();
        self.status = FlashStatus::Idle;
        was_flashing
    }

    pub fn step_finished(&mut self) -> StepAction {
        if self.in_flight != Some(Sequence::Oscillate) {
            return StepAction::Nothing;
        }
        match self.status {
            FlashStatus::Flashing => StepAction::Oscillate(self.target_color),
            FlashStatus::Idle => match self.saved.take() {
                Some(saved) => {
                    self.in_flight = Some(Sequence::Restore);
                    StepAction::Restore(saved)
                }
                None => {
                    self.in_flight = None;
                    StepAction::Nothing
                }
            },
        }
    }

    /// The restore sequence completed. Returns whether a deferred start is pending.
    pub fn restored(&mut self) -> bool {
        self.in_flight = None;
        std::mem::take(&mut self.start_after_restore)
    }

    /// Abandon the session after a failed sequence. Returns whether a start was
    /// waiting on the failed restore.
    pub fn abort(&mut self) -> bool {
        let pending = self.start_after_restore;
        *self = Self {
            target_color: self.target_color,
            ..Self::default()
        };
        pending
    }

    /// Whether user commands should update the snapshot instead of the device.
    ///
    /// True while flashing, and in the window between the session ending and the
    /// running step completing, when the restore has not yet taken the snapshot.
    pub fn accepts_write_through(&self) -> bool {
        self.saved.is_some() && self.in_flight == Some(Sequence::Oscillate)
    }

    /// Apply a user command to the snapshot. Returns false if the command must go
    /// to the device instead.
    pub fn write_through(&mut self, command: WriteThrough) -> bool {
        if !self.accepts_write_through() {
            return false;
        }
        let Some(saved) = self.saved.as_mut() else {
            return false;
        };
        match command {
            WriteThrough::Off => saved.on = false,
            WriteThrough::On {
                rgb_color,
                brightness,
            } => {
                saved.on = true;
                if rgb_color.is_some() {
                    saved.rgb_color = rgb_color;
                }
                if brightness.is_some() {
                    saved.brightness = brightness;
                }
            }
        }
        true
    }
}

/// Transition and settle times of the flash sequences.
#[derive(Debug, Clone, Copy)]
pub struct FlashTiming {
    /// Transition of ordinary on/off commands
    pub transition: Duration,

    /// Transition of colour changes applied right after power-on
    pub quick_transition: Duration,

    /// Wait after powering a light on before it reports its attributes
    pub wake_settle: Duration,

    /// Wait after a colour change before the next step
    pub color_settle: Duration,

    /// Wait after each oscillation step
    pub step_settle: Duration,
}

impl Default for FlashTiming {
    fn default() -> Self {
        Self {
            transition: Duration::from_millis(300),
            quick_transition: Duration::from_millis(100),
            wake_settle: Duration::from_millis(100),
            color_settle: Duration::from_millis(300),
            step_settle: Duration::from_millis(400),
        }
    }
}

/// First step of a flash: darken a lit light, or light up a dark one in the
/// notification colour.
pub async fn run_start(
    service: Arc<dyn LightService>,
    light: LightHandle,
    entity_id: String,
    was_on: bool,
    timing: FlashTiming,
) -> Result<(), LightServiceError> {
    if was_on {
        service
            .turn_off(&entity_id, timing.transition, true)
            .await?;
        sleep(timing.step_settle).await;
        return Ok(());
    }

    service
        .turn_on(TurnOn::new(&entity_id, timing.transition).wait())
        .await?;
    sleep(timing.wake_settle).await;

    // Bulbs keep their last colour and brightness while off; capture them now that
    // the light reports them.
    let state = service.get_state(&entity_id).await?;
    let color = {
        let mut light = light.lock().await;
        light
            .session
            .record_attributes(state.rgb_color, state.brightness);
        light.session.target_color()
    };

    service
        .turn_on(
            TurnOn::new(&entity_id, timing.quick_transition)
                .color(Some(color))
                .wait(),
        )
        .await?;
    sleep(timing.color_settle).await;
    Ok(())
}

/// One oscillation: toggle the light, lighting it in `color` when turning on.
pub async fn run_step(
    service: Arc<dyn LightService>,
    entity_id: String,
    color: Rgb,
    timing: FlashTiming,
) -> Result<(), LightServiceError> {
    let state = service.get_state(&entity_id).await?;
    if state.on {
        service
            .turn_off(&entity_id, timing.transition, true)
            .await?;
    } else {
        service
            .turn_on(
                TurnOn::new(&entity_id, timing.transition)
                    .color(Some(color))
                    .wait(),
            )
            .await?;
    }
    sleep(timing.step_settle).await;
    Ok(())
}

/// Put the light back the way it was before flashing.
pub async fn run_restore(
    service: Arc<dyn LightService>,
    entity_id: String,
    saved: SavedState,
    timing: FlashTiming,
) -> Result<(), LightServiceError> {
    if !saved.on {
        // A bulb only accepts colour while on, so restore the attributes briefly and
        // then switch off; the next manual power-on comes back in the old colour.
        service
            .turn_on(TurnOn::new(&entity_id, timing.transition).wait())
            .await?;
        sleep(timing.color_settle).await;
        service
            .turn_on(
                TurnOn::new(&entity_id, timing.quick_transition)
                    .color(saved.rgb_color)
                    .brightness(saved.brightness),
            )
            .await?;
        sleep(timing.wake_settle).await;
        service
            .turn_off(&entity_id, timing.transition, false)
            .await?;
        return Ok(());
    }

    let state = service.get_state(&entity_id).await?;
    if state.on {
        service
            .turn_off(&entity_id, timing.transition, true)
            .await?;
        sleep(timing.step_settle).await;
    }
    service
        .turn_on(
            TurnOn::new(&entity_id, timing.transition)
                .color(saved.rgb_color)
                .brightness(saved.brightness)
                .wait(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;
    use crate::engine::registry::Light;
    use crate::engine::service::Command;
    use crate::engine::service::MockDevice;
    use crate::engine::service::MockLightService;

    const BLUE: Rgb = Rgb(0, 0, 255);
    const GREEN: Rgb = Rgb(0, 255, 0);
    const WARM: Rgb = Rgb(255, 147, 41);

    fn lit() -> LightState {
        LightState {
            on: true,
            rgb_color: Some(WARM),
            brightness: Some(180),
        }
    }

    #[test]
    fn test_request_from_idle_starts() {
        let mut session = FlashSession::default();
        assert_eq!(session.request(BLUE), FlashRequest::Start);
        assert_eq!(session.status(), FlashStatus::Idle);

        session.begin(&lit());
        assert!(session.is_flashing());
        assert_eq!(
            session.saved(),
            Some(&SavedState {
                on: true,
                rgb_color: Some(WARM),
                brightness: Some(180),
            })
        );

        assert_eq!(session.request(GREEN), FlashRequest::Updated);
        assert_eq!(session.target_color(), GREEN);
    }

    #[test]
    fn test_off_light_saves_power_state_only() {
        let mut session = FlashSession::default();
        session.begin(&LightState::off());
        assert_eq!(
            session.saved(),
            Some(&SavedState {
                on: false,
                rgb_color: None,
                brightness: None,
            })
        );

        session.record_attributes(Some(WARM), Some(90));
        assert_eq!(session.saved().unwrap().rgb_color, Some(WARM));
        assert_eq!(session.saved().unwrap().brightness, Some(90));
    }

    #[test]
    fn test_recorded_attributes_do_not_override_write_through() {
        let mut session = FlashSession::default();
        session.begin(&LightState::off());
        assert!(session.write_through(WriteThrough::On {
            rgb_color: Some(GREEN),
            brightness: None,
        }));

        session.record_attributes(Some(WARM), Some(90));
        let saved = session.saved().unwrap();
        assert!(saved.on);
        assert_eq!(saved.rgb_color, Some(GREEN));
        assert_eq!(saved.brightness, Some(90));
    }

    #[test]
    fn test_steps_alternate_until_end_then_restore() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());

        assert_eq!(session.step_finished(), StepAction::Oscillate(BLUE));
        assert!(session.update_color(GREEN));
        assert_eq!(session.step_finished(), StepAction::Oscillate(GREEN));

        assert!(session.end());
        assert!(session.is_busy());
        let StepAction::Restore(saved) = session.step_finished() else {
            panic!("expected restore");
        };
        assert_eq!(saved.brightness, Some(180));
        assert!(session.saved().is_none());
        assert!(session.is_busy());

        assert!(!session.restored());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_end_when_idle_is_noop() {
        let mut session = FlashSession::default();
        assert!(!session.end());
        assert_eq!(session.step_finished(), StepAction::Nothing);
        assert!(!session.update_color(GREEN));
    }

    #[test]
    fn test_rearm_keeps_snapshot() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());
        session.end();

        assert_eq!(session.request(GREEN), FlashRequest::Rearmed);
        assert!(session.is_flashing());
        assert_eq!(session.step_finished(), StepAction::Oscillate(GREEN));
        assert_eq!(session.saved().unwrap().rgb_color, Some(WARM));
    }

    #[test]
    fn test_request_during_restore_is_deferred() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());
        session.end();
        assert!(matches!(session.step_finished(), StepAction::Restore(_)));

        assert_eq!(session.request(GREEN), FlashRequest::Deferred);
        assert!(!session.is_flashing());
        assert!(session.restored());
        assert_eq!(session.target_color(), GREEN);
    }

    #[test]
    fn test_end_cancels_deferred_start() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());
        session.end();
        session.step_finished();
        session.request(GREEN);

        session.end();
        assert!(!session.restored());
    }

    #[test]
    fn test_write_through_windows() {
        let mut session = FlashSession::default();
        assert!(!session.write_through(WriteThrough::Off));

        session.request(BLUE);
        session.begin(&lit());
        assert!(session.write_through(WriteThrough::Off));
        assert!(!session.saved().unwrap().on);

        // Grace window: ended, but the step has not completed yet
        session.end();
        assert!(session.write_through(WriteThrough::On {
            rgb_color: None,
            brightness: Some(40),
        }));
        let saved = session.saved().unwrap();
        assert!(saved.on);
        assert_eq!(saved.rgb_color, Some(WARM));
        assert_eq!(saved.brightness, Some(40));

        session.step_finished();
        assert!(!session.write_through(WriteThrough::Off));
    }

    #[test]
    fn test_abort_resets_to_idle() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());
        assert!(!session.abort());
        assert_eq!(session.status(), FlashStatus::Idle);
        assert!(session.saved().is_none());
        assert!(!session.is_busy());
        assert_eq!(session.request(BLUE), FlashRequest::Start);
    }

    #[test]
    fn test_abort_reports_deferred_start() {
        let mut session = FlashSession::default();
        session.request(BLUE);
        session.begin(&lit());
        session.end();
        assert!(matches!(session.step_finished(), StepAction::Restore(_)));
        assert_eq!(session.request(BLUE), FlashRequest::Deferred);

        assert!(session.abort());
        assert!(!session.is_busy());
        assert_eq!(session.target_color(), BLUE);
    }

    fn handle(entity_id: &str) -> LightHandle {
        Arc::new(Mutex::new(Light {
            entity_id: entity_id.to_string(),
            room: "bedroom".to_string(),
            kind: None,
            session: FlashSession::default(),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_on_dark_light_captures_attributes() {
        let mock = Arc::new(MockLightService::new());
        mock.add_light(
            "light.bed",
            MockDevice {
                on: false,
                rgb_color: Some(WARM),
                brightness: Some(77),
            },
        );
        let light = handle("light.bed");
        {
            let mut l = light.lock().await;
            l.session.request(BLUE);
            l.session.begin(&LightState::off());
        }

        run_start(
            mock.clone(),
            light.clone(),
            "light.bed".to_string(),
            false,
            FlashTiming::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            light.lock().await.session.saved(),
            Some(&SavedState {
                on: false,
                rgb_color: Some(WARM),
                brightness: Some(77),
            })
        );
        assert_eq!(mock.device("light.bed").unwrap().rgb_color, Some(BLUE));
        assert!(mock.device("light.bed").unwrap().on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_dark_light_reapplies_attributes_then_turns_off() {
        let mock = Arc::new(MockLightService::new());
        mock.add_light(
            "light.bed",
            MockDevice {
                on: true,
                rgb_color: Some(BLUE),
                brightness: Some(255),
            },
        );

        let saved = SavedState {
            on: false,
            rgb_color: Some(WARM),
            brightness: Some(77),
        };
        run_restore(
            mock.clone(),
            "light.bed".to_string(),
            saved,
            FlashTiming::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            mock.commands().last(),
            Some(&Command::TurnOff {
                entity_id: "light.bed".to_string()
            })
        );
        assert_eq!(
            mock.device("light.bed").unwrap(),
            MockDevice {
                on: false,
                rgb_color: Some(WARM),
                brightness: Some(77),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_on_missing_light_fails() {
        let mock = Arc::new(MockLightService::new());
        let result = run_step(
            mock,
            "light.ghost".to_string(),
            BLUE,
            FlashTiming::default(),
        )
        .await;
        assert!(matches!(result, Err(LightServiceError::NotFound(_))));
    }
}
