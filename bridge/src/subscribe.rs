//! Subscription tracking and device discovery.

use rumqttc::{AsyncClient, QoS};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Pattern every device's status announcements arrive on, regardless
/// of the statically configured topics.
pub const STATUS_WILDCARD: &str = "+/status";

/// Ordered set of subscribed topic patterns.
///
/// Grows monotonically for the lifetime of a session; entries are
/// never removed at runtime. Adds are idempotent.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    patterns: Vec<String>,
}

impl SubscriptionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configured topics plus the fixed status wildcard.
    pub fn seeded(topics: &[String]) -> Self {
        let mut set = Self::new();
        for topic in topics {
            set.add(topic);
        }
        set.add(STATUS_WILDCARD);
        set
    }

    /// Add a pattern. Returns false if it was already a member.
    pub fn add(&mut self, pattern: &str) -> bool {
        if self.contains(pattern) {
            return false;
        }
        self.patterns.push(pattern.to_string());
        true
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Issues subscriptions on the live connection and remembers them for
/// resubscription after a reconnect.
pub struct SubscriptionManager {
    client: AsyncClient,
    set: SubscriptionSet,
}

impl SubscriptionManager {
    pub fn new(client: AsyncClient, set: SubscriptionSet) -> Self {
        Self { client, set }
    }

    /// Subscribe to a newly announced device's topics.
    ///
    /// The pattern is `<deviceId>/#`. Already-known devices are a
    /// no-op, so repeated status messages issue at most one subscribe
    /// call per device.
    pub async fn discover(&mut self, device_id: &str) -> Result<()> {
        let pattern = format!("{device_id}/#");
        if self.set.contains(&pattern) {
            debug!(%pattern, "device already subscribed");
            return Ok(());
        }

        info!(%pattern, "subscribing to discovered device");
        self.client
            .subscribe(pattern.clone(), QoS::AtMostOnce)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;
        self.set.add(&pattern);
        Ok(())
    }

    /// Re-issue every pattern in the set.
    ///
    /// Called on each connect so a reconnect never silently loses
    /// coverage.
    pub async fn resubscribe_all(&self) -> Result<()> {
        for pattern in self.set.iter() {
            debug!(%pattern, "subscribing");
            self.client
                .subscribe(pattern, QoS::AtMostOnce)
                .await
                .map_err(|e| Error::Subscribe(e.to_string()))?;
        }
        Ok(())
    }

    /// The current subscription set.
    pub fn set(&self) -> &SubscriptionSet {
        &self.set
    }
}
