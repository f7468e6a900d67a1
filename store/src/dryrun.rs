//! Dry-run store: logs statements without touching a database.
//!
//! Used to verify classification and discovery behavior without a live
//! database. The statements logged are exactly the ones the MySQL
//! store would execute.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clock::KeyClock;
use crate::mysql::{insert_message_sql, upsert_device_sql};
use crate::{Store, StoreError, StoreResult};

/// Store that performs no writes and logs each statement instead.
pub struct DryRunStore {
    message_table: Option<String>,
    device_table: Option<String>,
    clock: Mutex<KeyClock>,
}

impl DryRunStore {
    pub fn new(message_table: Option<String>, device_table: Option<String>) -> Self {
        Self {
            message_table,
            device_table,
            clock: Mutex::new(KeyClock::new()),
        }
    }
}

#[async_trait]
impl Store for DryRunStore {
    async fn insert_message(&self, topic: &str, message: &[u8]) -> StoreResult<()> {
        let Some(table) = &self.message_table else {
            warn!(%topic, "no message table configured, dropping message-log write");
            return Ok(());
        };

        let rec_time = self
            .clock
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .next_key();

        info!(
            sql = %insert_message_sql(table),
            rec_time = %rec_time,
            %topic,
            message = %String::from_utf8_lossy(message),
            "dry run, skipping insert"
        );
        Ok(())
    }

    async fn upsert_device(
        &self,
        device_id: &str,
        status_time: &str,
        message: &[u8],
    ) -> StoreResult<()> {
        let Some(table) = &self.device_table else {
            warn!(device = %device_id, "no device table configured, dropping device upsert");
            return Ok(());
        };

        info!(
            sql = %upsert_device_sql(table),
            device = %device_id,
            %status_time,
            message = %String::from_utf8_lossy(message),
            "dry run, skipping upsert"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_never_fails() {
        let store = DryRunStore::new(Some("msgs".into()), Some("devices".into()));
        store.insert_message("a/b", b"1").await.unwrap();
        store.upsert_device("dev1", "2024-01-01 00:00:00", b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_tables_are_noops() {
        let store = DryRunStore::new(None, None);
        store.insert_message("a/b", b"1").await.unwrap();
        store.upsert_device("dev1", "2024-01-01 00:00:00", b"{}").await.unwrap();
    }
}
