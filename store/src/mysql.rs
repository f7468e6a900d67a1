//! MySQL-backed store over sqlx.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::{debug, info, warn};

use crate::clock::KeyClock;
use crate::{Store, StoreError, StoreResult};

/// Connection and table parameters for the MySQL store.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub schema: String,
    /// Message-log table; absent degrades log inserts to a no-op.
    pub message_table: Option<String>,
    /// Device-state table; absent degrades upserts to a no-op.
    pub device_table: Option<String>,
}

/// Store writing to two MySQL tables: the message log and the device
/// state table.
///
/// The connection is held for the process lifetime with no reconnect.
/// Once it drops, every write fails and is reported to the caller;
/// recovery is a process restart.
pub struct MySqlStore {
    pool: MySqlPool,
    message_table: Option<String>,
    device_table: Option<String>,
    clock: Mutex<KeyClock>,
}

impl MySqlStore {
    /// Connect with a single pooled connection.
    pub async fn connect(config: &MySqlConfig) -> StoreResult<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.schema);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(
            host = %config.host,
            port = config.port,
            schema = %config.schema,
            "connected to MySQL"
        );

        Ok(Self {
            pool,
            message_table: config.message_table.clone(),
            device_table: config.device_table.clone(),
            clock: Mutex::new(KeyClock::new()),
        })
    }
}

#[async_trait]
impl Store for MySqlStore {
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

        let sql = insert_message_sql(table);
        debug!(%sql, rec_time = %rec_time, %topic, "inserting message-log row");

        sqlx::query(&sql)
            .bind(rec_time)
            .bind(topic)
            .bind(message)
            .execute(&self.pool)
            .await?;
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

        let sql = upsert_device_sql(table);
        debug!(%sql, device = %device_id, %status_time, "upserting device row");

        sqlx::query(&sql)
            .bind(device_id)
            .bind(status_time)
            .bind(message)
            .bind(status_time)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// INSERT for one message-log row. Table names cannot be bound, so the
/// configured name is formatted into the statement; values are bound.
pub(crate) fn insert_message_sql(table: &str) -> String {
    format!("INSERT INTO {table} (RecTime, Topic, Message) VALUES (?, ?, ?)")
}

/// Insert-or-update for one device record. The key column is never
/// touched by the update branch.
pub(crate) fn upsert_device_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (MachineID, StatusTime, Message) VALUES (?, ?, ?) \
         ON DUPLICATE KEY UPDATE StatusTime = ?, Message = ?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_shape() {
        let sql = insert_message_sql("mqttmessages");
        assert!(sql.starts_with("INSERT INTO mqttmessages "));
        assert_eq!(sql.matches('?').count(), 3);
    }

    #[test]
    fn test_upsert_statement_updates_without_key() {
        let sql = upsert_device_sql("devices");
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        let update = sql.split("ON DUPLICATE KEY UPDATE").nth(1).unwrap();
        assert!(!update.contains("MachineID"));
    }
}
