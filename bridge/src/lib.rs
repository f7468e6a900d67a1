//! MQTT message-ingestion and device-discovery engine.
//!
//! A long-running reactive router that classifies arriving broker
//! messages into telemetry, device-status, or device-discovery
//! categories, grows its subscription set as new devices announce
//! themselves, and persists results through `mqttsink-store`.
//!
//! The receive loop is the sole driver: one message is classified,
//! persisted, and checked against the shutdown marker before the next
//! one is polled. Persistence faults are logged and never stop the
//! loop; an unrecoverable transport fault exits it, leaving recovery
//! to the external supervisor.

mod classify;
mod error;
mod message;
mod sentinel;
mod session;
mod subscribe;

pub use classify::{classify, Classification};
pub use error::{Error, Result};
pub use message::Message;
pub use sentinel::ShutdownSentinel;
pub use session::{Flow, Pipeline, Session, SessionConfig};
pub use subscribe::{SubscriptionManager, SubscriptionSet, STATUS_WILDCARD};
