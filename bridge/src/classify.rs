//! Message classification policy.
//!
//! Every incoming message is assigned exactly one category, which
//! determines its persistence path. The policy is a pure function of
//! (topic, retain flag, payload) plus the wall clock for discovery
//! configs, so it is unit-testable without a broker or a database.

use chrono::Local;
use serde_json::Value;
use tracing::debug;

use crate::message::Message;

/// Category assigned to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Plain telemetry; goes to the message log only.
    Telemetry,
    /// Device liveness report carrying its own status time.
    DeviceStatus {
        device_id: String,
        status_time: String,
    },
    /// Home-automation discovery config; the status time is
    /// synthesized since this message class carries none of its own.
    DeviceConfig {
        device_id: String,
        status_time: String,
    },
    /// Nothing to persist.
    Unclassified,
}

/// Classify one message.
///
/// Non-retained messages off status topics are telemetry. Everything
/// else is treated as structured device state: retained messages, and
/// also non-retained messages on `/status` topics, because some
/// firmware sets the retain flag inconsistently. Structured payloads
/// that fail to decode, or that lack their required fields, are
/// dropped with a debug diagnostic only.
pub fn classify(msg: &Message) -> Classification {
    if !msg.retain && !msg.topic.ends_with("/status") {
        return Classification::Telemetry;
    }

    let Some(text) = msg.payload_str() else {
        debug!(topic = %msg.topic, "dropping structured payload: not utf-8");
        return Classification::Unclassified;
    };
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(topic = %msg.topic, error = %e, "dropping structured payload: not json");
            return Classification::Unclassified;
        }
    };

    if msg.topic.ends_with("status") {
        let (Some(device_id), Some(status_time)) =
            (field_str(&value, "MachineID"), field_str(&value, "StatusTime"))
        else {
            debug!(topic = %msg.topic, "dropping status message: missing MachineID or StatusTime");
            return Classification::Unclassified;
        };
        return Classification::DeviceStatus {
            device_id,
            status_time,
        };
    }

    if msg.topic.starts_with("homeassistant") && msg.topic.ends_with("config") {
        let Some(device_id) = field_str(&value, "uniq_id") else {
            debug!(topic = %msg.topic, "dropping discovery config: missing uniq_id");
            return Classification::Unclassified;
        };
        return Classification::DeviceConfig {
            device_id,
            status_time: synthesized_status_time(),
        };
    }

    Classification::Unclassified
}

/// Extract a scalar field as a string. Numbers are accepted since some
/// devices report ids numerically.
fn field_str(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Current local time at second precision with a timezone label.
fn synthesized_status_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()
}
