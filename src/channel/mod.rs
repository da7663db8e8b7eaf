pub mod client;
pub mod message;
pub mod mode;
pub mod transport;

pub use client::{reconnect_delay, EventChannel};
pub use message::{decode, Inbound, PatientLookup, PushMessage};
pub use mode::{LinkState, Mode, ModePublisher, ModeReader, ModeSnapshot, ModeSubscription};
pub use transport::{events_url, PushConnection, PushTransport, WsTransport};
