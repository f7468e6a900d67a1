//! Persistence layer for the MQTT bridge.
//!
//! Provides a trait-based store interface with a MySQL implementation
//! for production, a dry-run implementation that logs the statements it
//! would have executed, and an in-memory implementation for tests.

pub mod clock;
pub mod dryrun;
pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database-level failure (connect, statement, constraint).
    #[error("store: database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal storage failure outside the database driver.
    #[error("store: storage error: {0}")]
    Storage(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations the message pipeline relies on.
///
/// Both operations commit before returning, so a handled message is
/// durable by the time the next one is processed. Implementations must
/// not retry: failures are reported once and the caller decides what
/// to log.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append one message-log row keyed by receive time.
    async fn insert_message(&self, topic: &str, message: &[u8]) -> StoreResult<()>;

    /// Insert or update one device record keyed by device id.
    ///
    /// On key conflict only the status time and message change; the
    /// device id is never mutated.
    async fn upsert_device(
        &self,
        device_id: &str,
        status_time: &str,
        message: &[u8],
    ) -> StoreResult<()>;
}

pub use clock::KeyClock;
pub use dryrun::DryRunStore;
pub use memory::MemoryStore;
pub use mysql::{MySqlConfig, MySqlStore};
