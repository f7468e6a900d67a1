//! Error types for the bridge.

use thiserror::Error;

/// Error type for broker-session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Broker connection failed or was lost.
    #[error("bridge: connection error: {0}")]
    Connection(String),

    /// Subscribe request could not be issued.
    #[error("bridge: subscribe error: {0}")]
    Subscribe(String),

    /// Broker did not complete the handshake within the bound.
    #[error("bridge: handshake timed out")]
    HandshakeTimeout,
}

/// Result type for broker-session operations.
pub type Result<T> = std::result::Result<T, Error>;
