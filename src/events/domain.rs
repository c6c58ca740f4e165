//! Channel set and wire envelope for the event plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed channel set; clients subscribe only to what they need.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// metric_updated, model_updated, training_completed
    Dashboard,
    /// anomaly_detected
    Anomalies,
    /// training_started, training_progress, training_completed
    Training,
    /// system_alert
    Events,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Dashboard,
        Channel::Anomalies,
        Channel::Training,
        Channel::Events,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Dashboard => "dashboard",
            Channel::Anomalies => "anomalies",
            Channel::Training => "training",
            Channel::Events => "events",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dashboard" => Some(Channel::Dashboard),
            "anomalies" => Some(Channel::Anomalies),
            "training" => Some(Channel::Training),
            "events" => Some(Channel::Events),
            _ => None,
        }
    }
}

/// One published message. Ephemeral: never persisted, delivery at most once.
#[derive(Clone, Debug, Serialize)]
pub struct EventMessage {
    pub channel: Channel,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl EventMessage {
    /// The `{type, data, timestamp}` envelope every connected client receives.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.event_type,
            "data": self.payload,
            "timestamp": self.published_at,
        })
    }
}
