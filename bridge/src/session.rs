//! Broker session: connection, receive loop, per-message pipeline.
//!
//! The session owns the transport connection and is the sole driver:
//! classification, persistence, and the shutdown check all complete
//! for one message before the next event is polled, so no two messages
//! are ever in flight concurrently.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use mqttsink_store::Store;

use crate::classify::{classify, Classification};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::sentinel::ShutdownSentinel;
use crate::subscribe::{SubscriptionManager, SubscriptionSet};

/// Keep-alive interval, also the bound on the initial handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection parameters for a broker session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Statically configured topic patterns; the status wildcard is
    /// always added on top.
    pub topics: Vec<String>,
    /// Skip message-log writes, keep device discovery.
    pub devices_only: bool,
}

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Per-message pipeline: classification, persistence, shutdown check.
///
/// Store faults are logged here and never propagate; a failed write
/// must not stop an indefinitely-running session.
pub struct Pipeline {
    store: Arc<dyn Store>,
    subscriptions: SubscriptionManager,
    sentinel: ShutdownSentinel,
    devices_only: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        subscriptions: SubscriptionManager,
        sentinel: ShutdownSentinel,
        devices_only: bool,
    ) -> Self {
        Self {
            store,
            subscriptions,
            sentinel,
            devices_only,
        }
    }

    /// Handle one message, then check the shutdown marker.
    pub async fn handle(&mut self, msg: &Message) -> Flow {
        match classify(msg) {
            Classification::Telemetry => {
                if self.devices_only {
                    debug!(topic = %msg.topic, "devices-only mode, skipping message log");
                } else if let Err(e) = self.store.insert_message(&msg.topic, &msg.payload).await {
                    error!(topic = %msg.topic, error = %e, "message-log insert failed");
                }
            }
            Classification::DeviceStatus {
                device_id,
                status_time,
            } => {
                // Status announcements are what grow the subscription
                // set; discovery configs only update the device table.
                if let Err(e) = self.subscriptions.discover(&device_id).await {
                    warn!(device = %device_id, error = %e, "device subscribe failed");
                }
                self.upsert(&device_id, &status_time, msg).await;
            }
            Classification::DeviceConfig {
                device_id,
                status_time,
            } => {
                self.upsert(&device_id, &status_time, msg).await;
            }
            Classification::Unclassified => {}
        }

        if self.sentinel.triggered() {
            info!("shutdown marker consumed, stopping session");
            return Flow::Shutdown;
        }
        Flow::Continue
    }

    async fn upsert(&self, device_id: &str, status_time: &str, msg: &Message) {
        if let Err(e) = self
            .store
            .upsert_device(device_id, status_time, &msg.payload)
            .await
        {
            error!(device = %device_id, error = %e, "device upsert failed");
        }
    }

    /// Re-issue the full subscription set after a (re)connect.
    pub async fn resubscribe(&self) -> Result<()> {
        self.subscriptions.resubscribe_all().await
    }

    /// The current subscription set.
    pub fn subscriptions(&self) -> &SubscriptionSet {
        self.subscriptions.set()
    }
}

/// Owns the broker connection and drives the receive loop.
pub struct Session {
    eventloop: EventLoop,
    pipeline: Pipeline,
}

impl Session {
    /// Assemble a session: client, seeded subscription set, pipeline.
    ///
    /// The connection itself is established lazily by the receive
    /// loop's first poll.
    pub fn new(config: SessionConfig, store: Arc<dyn Store>, sentinel: ShutdownSentinel) -> Self {
        let mut options = MqttOptions::new(config.client_id, config.host, config.port);
        options.set_keep_alive(HANDSHAKE_TIMEOUT);
        if let (Some(user), Some(pass)) = (config.username, config.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let set = SubscriptionSet::seeded(&config.topics);
        let subscriptions = SubscriptionManager::new(client, set);
        let pipeline = Pipeline::new(store, subscriptions, sentinel, config.devices_only);

        Self { eventloop, pipeline }
    }

    /// Run the receive loop until shutdown or an unrecoverable error.
    ///
    /// Every ConnAck (first connect and reconnects) re-issues the full
    /// subscription set. A poll error exits the loop with the error;
    /// there is no internal retry, the external supervisor restarts
    /// the process.
    pub async fn run(&mut self) -> Result<()> {
        let mut connected = false;
        loop {
            let event = if connected {
                self.eventloop.poll().await
            } else {
                match timeout(HANDSHAKE_TIMEOUT, self.eventloop.poll()).await {
                    Ok(event) => event,
                    Err(_) => return Err(Error::HandshakeTimeout),
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    connected = true;
                    info!(code = ?ack.code, "connected to broker");
                    if let Err(e) = self.pipeline.resubscribe().await {
                        error!(error = %e, "resubscribe failed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        topic = %publish.topic,
                        retain = publish.retain,
                        "message received"
                    );
                    let msg = Message {
                        topic: publish.topic.clone(),
                        payload: Bytes::from(publish.payload.to_vec()),
                        retain: publish.retain,
                    };
                    if self.pipeline.handle(&msg).await == Flow::Shutdown {
                        return Ok(());
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Connection(e.to_string()));
                }
            }
        }
    }

    /// The per-message pipeline, exposed for inspection.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqttsink_store::MemoryStore;

    // The unpolled event loop is returned so the client's request
    // channel stays open for the duration of a test.
    fn pipeline(
        store: MemoryStore,
        dir: &std::path::Path,
        devices_only: bool,
    ) -> (Pipeline, EventLoop) {
        let (client, eventloop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 10);
        let subscriptions = SubscriptionManager::new(client, SubscriptionSet::seeded(&[]));
        let sentinel = ShutdownSentinel::at(dir.join(".CloseTest"));
        let pipeline = Pipeline::new(Arc::new(store), subscriptions, sentinel, devices_only);
        (pipeline, eventloop)
    }

    #[tokio::test]
    async fn test_telemetry_is_logged_verbatim() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), false);

        let msg = Message::new("sensors/livingroom/temp", "23.5");
        assert_eq!(pipeline.handle(&msg).await, Flow::Continue);

        let rows = store.messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].topic, "sensors/livingroom/temp");
        assert_eq!(rows[0].message, b"23.5");
        assert!(store.devices().is_empty());
    }

    #[tokio::test]
    async fn test_status_message_upserts_and_discovers() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), false);

        let payload = r#"{"MachineID":"dev1","StatusTime":"2024-01-01 00:00:00"}"#;
        let msg = Message::new("dev1/status", payload).retained();
        pipeline.handle(&msg).await;
        pipeline.handle(&msg).await;

        let devices = store.devices();
        assert_eq!(devices.len(), 1);
        let row = &devices["dev1"];
        assert_eq!(row.status_time, "2024-01-01 00:00:00");
        assert_eq!(row.message, payload.as_bytes());
        assert!(store.messages().is_empty());

        // Repeated status messages add the pattern at most once.
        assert!(pipeline.subscriptions().contains("dev1/#"));
        assert_eq!(
            pipeline
                .subscriptions()
                .iter()
                .filter(|p| *p == "dev1/#")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_discovery_config_upserts_without_subscribing() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), false);

        let msg = Message::new(
            "homeassistant/sensor/dev2/config",
            r#"{"uniq_id":"dev2","name":"Sensor"}"#,
        )
        .retained();
        pipeline.handle(&msg).await;

        assert!(store.devices().contains_key("dev2"));
        assert!(!pipeline.subscriptions().contains("dev2/#"));
    }

    #[tokio::test]
    async fn test_malformed_retained_payload_writes_nothing() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), false);

        let msg = Message::new("any/topic", "{not json").retained();
        assert_eq!(pipeline.handle(&msg).await, Flow::Continue);

        assert!(store.messages().is_empty());
        assert!(store.devices().is_empty());
    }

    #[tokio::test]
    async fn test_devices_only_skips_message_log() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), true);

        pipeline.handle(&Message::new("a/b", "1")).await;
        assert!(store.messages().is_empty());

        let payload = r#"{"MachineID":"dev1","StatusTime":"t"}"#;
        pipeline
            .handle(&Message::new("dev1/status", payload).retained())
            .await;
        assert_eq!(store.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_marker_stops_after_one_message() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(".CloseTest");
        let (mut pipeline, _eventloop) = pipeline(store.clone(), dir.path(), false);

        std::fs::write(&marker, b"").unwrap();
        let flow = pipeline.handle(&Message::new("a/b", "1")).await;

        assert_eq!(flow, Flow::Shutdown);
        assert!(!marker.exists());
        // The message that carried the signal was still processed.
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_session_seeds_subscriptions() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            host: "localhost".into(),
            port: 1883,
            client_id: "test".into(),
            username: None,
            password: None,
            topics: vec!["home/#".into()],
            devices_only: false,
        };
        let session = Session::new(
            config,
            Arc::new(MemoryStore::new()),
            ShutdownSentinel::at(dir.path().join(".CloseTest")),
        );

        let set = session.pipeline().subscriptions();
        assert!(set.contains("home/#"));
        assert!(set.contains(crate::subscribe::STATUS_WILDCARD));
    }
}
