//! Publish abstraction over the channel set.
//!
//! Delivery is at most once: if nothing is subscribed when a message is
//! published it is simply lost, and a lagging subscriber drops the oldest
//! messages. Multi-instance deployments must put a shared broker behind the
//! `Broker` trait instead of the in-memory one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::common::error::{CoreError, CoreResult};
use crate::common::time;

use super::domain::{Channel, EventMessage};

/// Broker capability: shared pub/sub across service instances.
pub trait Broker: Send + Sync {
    fn publish(&self, message: EventMessage) -> CoreResult<()>;
    fn subscribe(&self, channel: Channel) -> broadcast::Receiver<EventMessage>;
}

/// In-process broker over `tokio::sync::broadcast`, one sender per channel.
/// Single-instance only.
pub struct MemBroker {
    senders: HashMap<Channel, broadcast::Sender<EventMessage>>,
}

impl MemBroker {
    pub fn new(capacity: usize) -> Self {
        let senders = Channel::ALL
            .into_iter()
            .map(|ch| (ch, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self { senders }
    }
}

impl Broker for MemBroker {
    fn publish(&self, message: EventMessage) -> CoreResult<()> {
        let sender = self
            .senders
            .get(&message.channel)
            .ok_or_else(|| CoreError::broker("unknown channel"))?;
        // A send error only means nobody is listening; that is the
        // at-most-once contract, not a failure.
        let _ = sender.send(message);
        Ok(())
    }

    fn subscribe(&self, channel: Channel) -> broadcast::Receiver<EventMessage> {
        self.senders
            .get(&channel)
            .expect("all channels registered at construction")
            .subscribe()
    }
}

/// Thin fire-and-forget publish facade handed to the services.
#[derive(Clone)]
pub struct EventBus {
    broker: Arc<dyn Broker>,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Publish an event. Never blocks on subscriber processing and never
    /// fails the caller; broker errors are logged and swallowed.
    pub fn publish(&self, channel: Channel, event_type: &str, payload: serde_json::Value) {
        let message = EventMessage {
            channel,
            event_type: event_type.to_string(),
            payload,
            published_at: time::now(),
        };
        if let Err(err) = self.broker.publish(message) {
            warn!(channel = channel.as_str(), event_type, %err, "event publish failed");
        }
    }

    /// Subscribe to a channel's live stream.
    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<EventMessage> {
        self.broker.subscribe(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        EventBus::new(Arc::new(MemBroker::new(16)))
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_lost_not_an_error() {
        let bus = bus();
        bus.publish(Channel::Dashboard, "metric_updated", serde_json::json!({}));
        // A later subscriber sees nothing: no queue, no replay.
        let mut rx = bus.subscribe(Channel::Dashboard);
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn subscriber_receives_stamped_message() {
        let bus = bus();
        let mut rx = bus.subscribe(Channel::Anomalies);
        bus.publish(
            Channel::Anomalies,
            "anomaly_detected",
            serde_json::json!({ "machine_id": "press-1", "severity": "critical" }),
        );
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event_type, "anomaly_detected");
        assert_eq!(msg.payload["machine_id"], "press-1");
        assert!(msg.published_at <= time::now());
    }
}
