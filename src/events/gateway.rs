//! Live connection management and per-channel fan-out.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::time;

use super::bus::EventBus;
use super::domain::{Channel, EventMessage};

/// Metadata for one live client connection.
///
/// Owned exclusively by the registry; nothing outside the gateway holds a
/// reference to a connection.
#[derive(Clone, Debug)]
pub struct ClientConnection {
    pub connection_id: String,
    pub client_id: String,
    pub channel: Channel,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

struct ConnEntry {
    meta: ClientConnection,
    tx: mpsc::UnboundedSender<String>,
}

/// Explicit registry object with its own lifecycle, injected into the
/// gateway so tests and multiple instances each get isolated state.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<String, ConnEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections on a channel.
    pub fn count(&self, channel: Channel) -> usize {
        self.conns.iter().filter(|e| e.meta.channel == channel).count()
    }

    /// Drop every connection, closing all client queues.
    pub fn drain(&self) {
        self.conns.clear();
    }
}

/// Manages live client connections per channel, broadcasts events and drops
/// dead connections. One slow or dead client never blocks the others: each
/// connection has its own unbounded queue drained by its own socket task.
pub struct ConnectionGateway {
    registry: Arc<ConnectionRegistry>,
    heartbeat_interval_secs: u64,
    missed_heartbeat_limit: u32,
}

impl ConnectionGateway {
    pub fn new(registry: Arc<ConnectionRegistry>, heartbeat_interval_secs: u64, missed_heartbeat_limit: u32) -> Self {
        Self {
            registry,
            heartbeat_interval_secs,
            missed_heartbeat_limit,
        }
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    /// Register a connection and queue the handshake as its first message.
    /// Returns the connection id and the receiver its socket task drains.
    pub fn accept(&self, channel: Channel, client_id: &str) -> (String, mpsc::UnboundedReceiver<String>) {
        let connection_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let handshake = serde_json::json!({ "type": "connection", "status": "connected" });
        let _ = tx.send(handshake.to_string());
        let now = time::now();
        self.registry.conns.insert(
            connection_id.clone(),
            ConnEntry {
                meta: ClientConnection {
                    connection_id: connection_id.clone(),
                    client_id: client_id.to_string(),
                    channel,
                    connected_at: now,
                    last_heartbeat: now,
                },
                tx,
            },
        );
        info!(channel = channel.as_str(), client_id, %connection_id, "connection accepted");
        (connection_id, rx)
    }

    /// Send a message to every live connection on the channel. Connections
    /// whose queue is gone are treated as disconnected and removed.
    /// Returns the number of deliveries.
    pub fn broadcast(&self, channel: Channel, message: &EventMessage) -> usize {
        let text = message.envelope().to_string();
        let mut delivered = 0usize;
        let mut dead = Vec::new();
        for entry in self.registry.conns.iter() {
            if entry.meta.channel != channel {
                continue;
            }
            if entry.tx.send(text.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(entry.meta.connection_id.clone());
            }
        }
        for id in dead {
            self.registry.conns.remove(&id);
            warn!(connection_id = %id, channel = channel.as_str(), "dropped dead connection during broadcast");
        }
        delivered
    }

    /// Record heartbeat activity for a connection.
    pub fn touch(&self, connection_id: &str) {
        if let Some(mut entry) = self.registry.conns.get_mut(connection_id) {
            entry.meta.last_heartbeat = time::now();
        }
    }

    /// Remove a connection after its socket closed.
    pub fn remove(&self, connection_id: &str) {
        if self.registry.conns.remove(connection_id).is_some() {
            debug!(connection_id, "connection removed");
        }
    }

    /// Drop connections silent for more than the missed-heartbeat budget.
    /// Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let deadline = time::now()
            - Duration::seconds((self.heartbeat_interval_secs * self.missed_heartbeat_limit as u64) as i64);
        let stale: Vec<String> = self
            .registry
            .conns
            .iter()
            .filter(|e| e.meta.last_heartbeat < deadline)
            .map(|e| e.meta.connection_id.clone())
            .collect();
        let dropped = stale.len();
        for id in stale {
            self.registry.conns.remove(&id);
            warn!(connection_id = %id, "dropped silent connection");
        }
        dropped
    }

    pub fn connection_count(&self, channel: Channel) -> usize {
        self.registry.count(channel)
    }
}

/// One logical subscriber per channel forwarding bus traffic to the gateway.
pub fn spawn_forwarders(gateway: Arc<ConnectionGateway>, bus: &EventBus) {
    for channel in Channel::ALL {
        let mut rx = bus.subscribe(channel);
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        gateway.broadcast(channel, &message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // At-most-once: lagged messages are gone, keep going.
                        warn!(channel = channel.as_str(), skipped, "forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::MemBroker;
    use std::time::Duration as StdDuration;

    fn gateway() -> ConnectionGateway {
        ConnectionGateway::new(Arc::new(ConnectionRegistry::new()), 30, 3)
    }

    fn message(channel: Channel, event_type: &str, payload: serde_json::Value) -> EventMessage {
        EventMessage {
            channel,
            event_type: event_type.into(),
            payload,
            published_at: time::now(),
        }
    }

    #[tokio::test]
    async fn handshake_is_first_message() {
        let gw = gateway();
        let (_, mut rx) = gw.accept(Channel::Dashboard, "client-1");
        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "connection");
        assert_eq!(first["status"], "connected");
    }

    #[tokio::test]
    async fn broadcast_reaches_only_the_channel() {
        let gw = gateway();
        let (_, mut dash_rx) = gw.accept(Channel::Dashboard, "c1");
        let (_, mut train_rx) = gw.accept(Channel::Training, "c2");
        dash_rx.recv().await.unwrap(); // handshake
        train_rx.recv().await.unwrap();

        let delivered = gw.broadcast(
            Channel::Training,
            &message(Channel::Training, "training_started", serde_json::json!({ "job": 1 })),
        );
        assert_eq!(delivered, 1);
        let env: serde_json::Value = serde_json::from_str(&train_rx.recv().await.unwrap()).unwrap();
        assert_eq!(env["type"], "training_started");
        assert!(dash_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_connection_is_pruned_without_blocking_others() {
        let gw = gateway();
        let (_, dead_rx) = gw.accept(Channel::Events, "dead");
        let (_, mut live_rx) = gw.accept(Channel::Events, "live");
        drop(dead_rx);
        live_rx.recv().await.unwrap(); // handshake

        let delivered = gw.broadcast(
            Channel::Events,
            &message(Channel::Events, "system_alert", serde_json::json!({})),
        );
        assert_eq!(delivered, 1);
        assert_eq!(gw.connection_count(Channel::Events), 1);
        assert!(live_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn sweep_drops_silent_connections() {
        // Zero-second heartbeat budget: everything is immediately stale.
        let gw = ConnectionGateway::new(Arc::new(ConnectionRegistry::new()), 0, 3);
        let (_, _rx) = gw.accept(Channel::Anomalies, "quiet");
        assert_eq!(gw.sweep(), 1);
        assert_eq!(gw.connection_count(Channel::Anomalies), 0);
    }

    #[tokio::test]
    async fn anomaly_event_reaches_subscribed_connection() {
        // Full path: bus publish -> forwarder -> gateway -> connection.
        let bus = EventBus::new(Arc::new(MemBroker::new(16)));
        let gw = Arc::new(gateway());
        spawn_forwarders(Arc::clone(&gw), &bus);
        let (_, mut rx) = gw.accept(Channel::Anomalies, "observer");
        rx.recv().await.unwrap(); // handshake

        bus.publish(
            Channel::Anomalies,
            "anomaly_detected",
            serde_json::json!({ "machine_id": "machine-x", "severity": "critical" }),
        );

        let text = tokio::time::timeout(StdDuration::from_secs(1), rx.recv())
            .await
            .expect("event within one second")
            .unwrap();
        let env: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(env["type"], "anomaly_detected");
        assert_eq!(env["data"]["machine_id"], "machine-x");
        assert_eq!(env["data"]["severity"], "critical");
    }
}
