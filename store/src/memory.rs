//! In-memory store implementation for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::clock::KeyClock;
use crate::{Store, StoreError, StoreResult};

/// One captured message-log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub rec_time: NaiveDateTime,
    pub topic: String,
    pub message: Vec<u8>,
}

/// One captured device record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    pub status_time: String,
    pub message: Vec<u8>,
}

/// A store backed by plain collections, mirroring the two tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    clock: KeyClock,
    messages: Vec<LogRow>,
    devices: HashMap<String, DeviceRow>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the message log.
    pub fn messages(&self) -> Vec<LogRow> {
        self.inner.lock().expect("store lock").messages.clone()
    }

    /// Snapshot of the device table.
    pub fn devices(&self) -> HashMap<String, DeviceRow> {
        self.inner.lock().expect("store lock").devices.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_message(&self, topic: &str, message: &[u8]) -> StoreResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let rec_time = inner.clock.next_key();
        inner.messages.push(LogRow {
            rec_time,
            topic: topic.to_string(),
            message: message.to_vec(),
        });
        Ok(())
    }

    async fn upsert_device(
        &self,
        device_id: &str,
        status_time: &str,
        message: &[u8],
    ) -> StoreResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        inner.devices.insert(
            device_id.to_string(),
            DeviceRow {
                status_time: status_time.to_string(),
                message: message.to_vec(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_preserves_topic_and_payload() {
        let store = MemoryStore::new();
        store.insert_message("sensors/livingroom/temp", b"23.5").await.unwrap();

        let rows = store.messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].topic, "sensors/livingroom/temp");
        assert_eq!(rows[0].message, b"23.5");
    }

    #[tokio::test]
    async fn test_insert_keys_are_unique_under_bursts() {
        let store = MemoryStore::new();
        for _ in 0..100 {
            store.insert_message("t", b"m").await.unwrap();
        }

        let rows = store.messages();
        for pair in rows.windows(2) {
            assert!(pair[0].rec_time < pair[1].rec_time);
        }
    }

    #[tokio::test]
    async fn test_upsert_merges_without_duplicating() {
        let store = MemoryStore::new();
        store.upsert_device("dev1", "2024-01-01 00:00:00", b"a").await.unwrap();
        store.upsert_device("dev1", "2024-01-02 00:00:00", b"b").await.unwrap();

        let devices = store.devices();
        assert_eq!(devices.len(), 1);
        let row = &devices["dev1"];
        assert_eq!(row.status_time, "2024-01-02 00:00:00");
        assert_eq!(row.message, b"b");
    }
}
