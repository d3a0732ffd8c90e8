mod dispatcher;
mod event;
pub mod flash;
mod integration;
mod intents;
mod message;
pub mod registry;
mod service;
mod state;
pub mod sunrise;


pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherSettings;
pub use dispatcher::FlashPalette;
pub use event::Event;
pub use event::IntentKind;
pub use event::IntentMessage;
pub use event::InternalEvent;
pub use event::Slots;
pub use integration::EventSender;
pub use integration::Integration;
pub use integration::ToBusReceiver;
pub use integration::ToBusSender;
pub use message::ToBusMessage;
pub use registry::Registry;
pub use service::LightService;
pub use service::LightServiceError;
pub use service::TurnOn;
pub use state::LightState;
