//! Incoming message representation.

use bytes::Bytes;

/// A single message as delivered by the broker.
///
/// Exists only for the duration of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was published to ('/'-delimited hierarchy).
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Broker retain flag.
    pub retain: bool,
}

impl Message {
    /// Create a non-retained message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// Mark the message as retained.
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
