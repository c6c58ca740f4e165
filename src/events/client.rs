//! Client-side connection contract for the event plane.
//!
//! Reconnection is the client's job, not server state: on disconnect the
//! client retries with exponential backoff under a fresh client id and
//! re-subscribes to the same channel. The server never replays missed
//! events, so on every (re)connect the client is told to resynchronise
//! current state through the read-only REST surface.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::error::CoreResult;

use super::domain::Channel;

/// Connection state as observed by the client, e.g. for a status indicator
/// (Live / Connecting / Reconnecting / Offline).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Exponential backoff settings for reconnect attempts.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `retry` (zero-based): initial doubling up
    /// to the cap.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.initial.saturating_mul(factor).min(self.cap)
    }
}

/// Transport seam so the state machine is testable without sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, channel: Channel, client_id: &str) -> CoreResult<Box<dyn EventStream>>;
}

/// One established subscription; `None` means the connection closed.
#[async_trait]
pub trait EventStream: Send {
    async fn next_event(&mut self) -> Option<serde_json::Value>;
}

/// Everything the client surfaces to its caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    State(ConnectionState),
    Message(serde_json::Value),
    /// Connection (re)established; caller must re-fetch state via REST to
    /// close the delivery gap.
    Resync,
}

/// Reconnecting subscriber for one channel.
pub struct EventStreamClient<C> {
    channel: Channel,
    connector: C,
    policy: ReconnectPolicy,
}

impl<C: Connector> EventStreamClient<C> {
    pub fn new(channel: Channel, connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            channel,
            connector,
            policy,
        }
    }

    /// Run the connection loop until the retry budget is exhausted.
    pub async fn run<F>(&self, mut sink: F)
    where
        F: FnMut(ClientEvent) + Send,
    {
        let mut state = ConnectionState::Disconnected;
        let set_state = |next: ConnectionState, sink: &mut F, state: &mut ConnectionState| {
            if *state != next {
                *state = next;
                sink(ClientEvent::State(next));
            }
        };

        let mut failures: u32 = 0;
        set_state(ConnectionState::Connecting, &mut sink, &mut state);
        loop {
            // Fresh client id on every attempt; server-side identity does
            // not survive a reconnect.
            let client_id = Uuid::new_v4().to_string();
            match self.connector.connect(self.channel, &client_id).await {
                Ok(mut stream) => {
                    failures = 0;
                    info!(channel = self.channel.as_str(), %client_id, "connected");
                    set_state(ConnectionState::Connected, &mut sink, &mut state);
                    sink(ClientEvent::Resync);
                    while let Some(event) = stream.next_event().await {
                        sink(ClientEvent::Message(event));
                    }
                    debug!(channel = self.channel.as_str(), "connection closed");
                }
                Err(err) => {
                    warn!(channel = self.channel.as_str(), %err, "connect failed");
                }
            }
            set_state(ConnectionState::Reconnecting, &mut sink, &mut state);
            failures += 1;
            if failures >= self.policy.max_attempts {
                set_state(ConnectionState::Disconnected, &mut sink, &mut state);
                return;
            }
            sleep(self.policy.delay(failures - 1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::CoreError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Connector following a script of per-attempt outcomes; records the
    /// client ids it was handed.
    struct Scripted {
        // Each entry: number of events the established stream yields before
        // closing, or None for a failed connect.
        script: Mutex<Vec<Option<usize>>>,
        client_ids: Arc<Mutex<Vec<String>>>,
    }

    struct CannedStream {
        remaining: usize,
    }

    #[async_trait]
    impl EventStream for CannedStream {
        async fn next_event(&mut self) -> Option<serde_json::Value> {
            if self.remaining == 0 {
                None
            } else {
                self.remaining -= 1;
                Some(serde_json::json!({ "seq": self.remaining }))
            }
        }
    }

    #[async_trait]
    impl Connector for Scripted {
        async fn connect(&self, _channel: Channel, client_id: &str) -> CoreResult<Box<dyn EventStream>> {
            self.client_ids.lock().push(client_id.to_string());
            let mut script = self.script.lock();
            match if script.is_empty() { None } else { Some(script.remove(0)) } {
                Some(Some(events)) => Ok(Box::new(CannedStream { remaining: events })),
                _ => Err(CoreError::broker("refused")),
            }
        }
    }

    fn states(events: &[ClientEvent]) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_to_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(12), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_fresh_client_id_after_drop() {
        let client_ids = Arc::new(Mutex::new(Vec::new()));
        let connector = Scripted {
            script: Mutex::new(vec![Some(1), Some(2)]),
            client_ids: Arc::clone(&client_ids),
        };
        let client = EventStreamClient::new(
            Channel::Training,
            connector,
            ReconnectPolicy {
                max_attempts: 2,
                ..ReconnectPolicy::default()
            },
        );

        let mut seen = Vec::new();
        client.run(|e| seen.push(e)).await;

        // CONNECTED -> RECONNECTING -> CONNECTED, then budget exhaustion.
        assert_eq!(
            states(&seen),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Disconnected,
            ]
        );
        // Every attempt resubscribes under a new identity (two successful
        // connects plus the final refused attempt).
        let ids = client_ids.lock();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        // A resync follows every successful connect.
        let resyncs = seen.iter().filter(|e| matches!(e, ClientEvent::Resync)).count();
        assert_eq!(resyncs, 2);
        let messages = seen.iter().filter(|e| matches!(e, ClientEvent::Message(_))).count();
        assert_eq!(messages, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retry_budget() {
        let connector = Scripted {
            script: Mutex::new(Vec::new()),
            client_ids: Arc::new(Mutex::new(Vec::new())),
        };
        let client = EventStreamClient::new(
            Channel::Events,
            connector,
            ReconnectPolicy {
                max_attempts: 3,
                ..ReconnectPolicy::default()
            },
        );
        let mut seen = Vec::new();
        client.run(|e| seen.push(e)).await;
        assert_eq!(states(&seen).last(), Some(&ConnectionState::Disconnected));
        assert!(!seen.contains(&ClientEvent::State(ConnectionState::Connected)));
    }
}
