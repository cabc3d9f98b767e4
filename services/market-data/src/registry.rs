//! Client connection registry
//!
//! Tracks every connected real-time client and owns its outbound queue.
//!
//! Fan-out contract: every relay event goes to every connected client.
//! Declared subscriptions are recorded and acknowledged but never required.
//! `unsubscribe(channel)` mutes that channel for the calling client only:
//! muting the upstream topic mutes every relay event, muting a routing key
//! mutes that key. `subscribe(channel)` lifts a mute.

use std::collections::BTreeSet;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use types::errors::RelayError;
use types::ids::ConnectionId;

use crate::backpressure::{BackpressureConfig, ClientQueue, Delivery};
use crate::events::connected_frame;

/// Default upstream topic relayed to clients.
pub const DEFAULT_UPSTREAM_TOPIC: &str = "orders_and_prices";

/// Registry-local errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("client {0} not found")]
    UnknownClient(ConnectionId),

    #[error("max subscriptions ({limit}) reached")]
    SubscriptionLimit { limit: usize },
}

/// Per-client state.
#[derive(Debug)]
pub struct ClientState {
    pub client_id: ConnectionId,
    /// Channels the client declared interest in.
    pub subscriptions: BTreeSet<String>,
    /// Channels the client muted.
    pub muted: BTreeSet<String>,
    pub connected_at: Instant,
    queue: ClientQueue,
}

impl ClientState {
    fn new(client_id: ConnectionId, queue: ClientQueue) -> Self {
        Self {
            client_id,
            subscriptions: BTreeSet::new(),
            muted: BTreeSet::new(),
            connected_at: Instant::now(),
            queue,
        }
    }

    /// Whether an event for `event_key` should skip this client.
    pub fn is_muted(&self, upstream_topic: &str, event_key: &str) -> bool {
        self.muted.contains(upstream_topic) || self.muted.contains(event_key)
    }
}

/// Configuration for the registry.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Max declared subscriptions per client.
    pub max_subscriptions_per_client: usize,
    /// Upstream topic name; muting it mutes every relay event.
    pub upstream_topic: String,
    pub backpressure: BackpressureConfig,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_client: 50,
            upstream_topic: DEFAULT_UPSTREAM_TOPIC.to_string(),
            backpressure: BackpressureConfig::default(),
        }
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub muted: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

/// Connected clients, safe to share between the relay and socket tasks.
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, ClientState>,
    config: WsConfig,
}

impl ClientRegistry {
    pub fn new(config: WsConfig) -> Self {
        Self {
            clients: DashMap::new(),
            config,
        }
    }

    /// Register a new client. The returned receiver feeds its socket writer.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        self.insert_client(|_| None)
    }

    /// Register a new client with its `connected` greeting already queued,
    /// so the greeting precedes any broadcast.
    pub fn register_greeted(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        self.insert_client(|id| match connected_frame(&id.to_string()) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(client_id = %id, error = %e, "Failed to encode greeting");
                None
            }
        })
    }

    fn insert_client<F>(&self, greeting: F) -> (ConnectionId, mpsc::Receiver<String>)
    where
        F: FnOnce(ConnectionId) -> Option<String>,
    {
        let id = ConnectionId::new();
        let (mut queue, receiver) = ClientQueue::channel(
            self.config.backpressure.queue_capacity,
            self.config.backpressure.drop_policy,
        );
        // Queued before the client is visible to broadcasts.
        if let Some(frame) = greeting(id) {
            queue.offer(frame);
        }
        self.clients.insert(id, ClientState::new(id, queue));
        info!(client_id = %id, clients = self.clients.len(), "Client connected");
        (id, receiver)
    }

    /// Remove a client (disconnect).
    pub fn disconnect(&self, client_id: ConnectionId) -> bool {
        match self.clients.remove(&client_id) {
            Some((_, state)) => {
                info!(
                    client_id = %client_id,
                    connected_secs = state.connected_at.elapsed().as_secs(),
                    messages_dropped = state.queue.messages_dropped(),
                    "Client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Record interest in a channel and lift any mute on it.
    pub fn subscribe(&self, client_id: ConnectionId, channel: &str) -> Result<(), RegistryError> {
        let limit = self.config.max_subscriptions_per_client;
        let mut client = self
            .clients
            .get_mut(&client_id)
            .ok_or(RegistryError::UnknownClient(client_id))?;

        if !client.subscriptions.contains(channel) && client.subscriptions.len() >= limit {
            return Err(RegistryError::SubscriptionLimit { limit });
        }
        client.subscriptions.insert(channel.to_string());
        client.muted.remove(channel);
        Ok(())
    }

    /// Mute a channel for this client only.
    pub fn unsubscribe(&self, client_id: ConnectionId, channel: &str) -> Result<(), RegistryError> {
        let mut client = self
            .clients
            .get_mut(&client_id)
            .ok_or(RegistryError::UnknownClient(client_id))?;

        client.subscriptions.remove(channel);
        client.muted.insert(channel.to_string());
        Ok(())
    }

    /// Deliver `payload` for `event_key` to every connected, non-muted client.
    ///
    /// Never waits on a client. Clients whose queue is closed, or overflowed
    /// under the disconnect policy, are removed.
    pub fn broadcast(&self, event_key: &str, payload: &str) -> BroadcastReport {
        let topic = self.config.upstream_topic.as_str();
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for mut client in self.clients.iter_mut() {
            if client.is_muted(topic, event_key) {
                report.muted += 1;
                continue;
            }
            match client.queue.offer(payload.to_string()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                delivery @ (Delivery::Overflowed | Delivery::Closed) => {
                    failed.push((client.client_id, delivery));
                }
            }
        }

        // Removal happens after iteration; the shard locks are held above.
        for (client_id, delivery) in failed {
            let err = RelayError::DownstreamSendFailure {
                client_id: client_id.to_string(),
            };
            warn!(error = %err, ?delivery, "Dropping client from registry");
            if self.clients.remove(&client_id).is_some() {
                report.disconnected += 1;
            }
        }

        report
    }

    /// Deliver `payload` to one client, ignoring mutes.
    pub fn unicast(&self, client_id: ConnectionId, payload: String) -> Result<(), RelayError> {
        let delivery = match self.clients.get_mut(&client_id) {
            Some(mut client) => client.queue.offer(payload),
            None => Delivery::Closed,
        };

        if delivery.requires_disconnect() {
            self.clients.remove(&client_id);
            return Err(RelayError::DownstreamSendFailure {
                client_id: client_id.to_string(),
            });
        }
        Ok(())
    }

    /// Whether the client is still registered.
    pub fn contains(&self, client_id: ConnectionId) -> bool {
        self.clients.contains_key(&client_id)
    }

    /// Declared subscriptions of a client.
    pub fn subscriptions(&self, client_id: ConnectionId) -> Option<BTreeSet<String>> {
        self.clients.get(&client_id).map(|c| c.subscriptions.clone())
    }

    /// Clients currently marked as lagging.
    pub fn lagging_clients(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|c| c.queue.is_lagging())
            .map(|c| c.client_id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn upstream_topic(&self) -> &str {
        &self.config.upstream_topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::DropPolicy;

    fn default_registry() -> ClientRegistry {
        ClientRegistry::new(WsConfig::default())
    }

    #[test]
    fn test_client_registration() {
        let reg = default_registry();
        let (id1, _rx1) = reg.register();
        let (id2, _rx2) = reg.register();

        assert_ne!(id1, id2);
        assert_eq!(reg.client_count(), 2);
        assert!(reg.contains(id1));
    }

    #[test]
    fn test_greeting_is_first_frame() {
        let reg = default_registry();
        let (id, mut rx) = reg.register_greeted();
        reg.broadcast("AAPL", "tick");

        let greeting: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(greeting["event"], "connected");
        assert_eq!(greeting["data"]["client_id"], id.to_string());
        assert_eq!(rx.try_recv().unwrap(), "tick");
    }

    #[test]
    fn test_disconnect() {
        let reg = default_registry();
        let (id, _rx) = reg.register();
        assert!(reg.disconnect(id));
        assert!(!reg.disconnect(id));
        assert_eq!(reg.client_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_everyone_without_subscribing() {
        let reg = default_registry();
        let (_a, mut rx_a) = reg.register();
        let (b, mut rx_b) = reg.register();
        reg.subscribe(b, "MSFT").unwrap();

        let report = reg.broadcast("AAPL", "frame");

        assert_eq!(report.delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), "frame");
        assert_eq!(rx_b.try_recv().unwrap(), "frame");
    }

    #[test]
    fn test_unsubscribe_key_mutes_only_that_client() {
        let reg = default_registry();
        let (a, mut rx_a) = reg.register();
        let (_b, mut rx_b) = reg.register();

        reg.unsubscribe(a, "AAPL").unwrap();
        let report = reg.broadcast("AAPL", "aapl");
        reg.broadcast("MSFT", "msft");

        assert_eq!(report.muted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap(), "msft");
        assert_eq!(rx_b.try_recv().unwrap(), "aapl");
        assert_eq!(rx_b.try_recv().unwrap(), "msft");
    }

    #[test]
    fn test_unsubscribe_topic_mutes_everything_for_that_client() {
        let reg = default_registry();
        let (a, mut rx_a) = reg.register();
        reg.unsubscribe(a, DEFAULT_UPSTREAM_TOPIC).unwrap();

        reg.broadcast("AAPL", "x");
        assert!(rx_a.try_recv().is_err());

        reg.subscribe(a, DEFAULT_UPSTREAM_TOPIC).unwrap();
        reg.broadcast("AAPL", "y");
        assert_eq!(rx_a.try_recv().unwrap(), "y");
    }

    #[test]
    fn test_closed_client_is_dropped() {
        let reg = default_registry();
        let (gone, rx_gone) = reg.register();
        let (_alive, mut rx_alive) = reg.register();
        drop(rx_gone);

        let report = reg.broadcast("AAPL", "frame");

        assert_eq!(report.disconnected, 1);
        assert_eq!(report.delivered, 1);
        assert!(!reg.contains(gone));
        assert_eq!(rx_alive.try_recv().unwrap(), "frame");
    }

    #[test]
    fn test_slow_client_drops_messages_but_stays() {
        let config = WsConfig {
            backpressure: BackpressureConfig {
                queue_capacity: 1,
                drop_policy: DropPolicy::DropMessage,
            },
            ..WsConfig::default()
        };
        let reg = ClientRegistry::new(config);
        let (id, mut rx) = reg.register();

        reg.broadcast("AAPL", "1");
        let report = reg.broadcast("AAPL", "2");

        assert_eq!(report.dropped, 1);
        assert!(reg.contains(id));
        assert_eq!(reg.lagging_clients(), vec![id]);
        assert_eq!(rx.try_recv().unwrap(), "1");
    }

    #[test]
    fn test_slow_client_disconnected_under_disconnect_policy() {
        let config = WsConfig {
            backpressure: BackpressureConfig {
                queue_capacity: 1,
                drop_policy: DropPolicy::Disconnect,
            },
            ..WsConfig::default()
        };
        let reg = ClientRegistry::new(config);
        let (id, _rx) = reg.register();

        reg.broadcast("AAPL", "1");
        let report = reg.broadcast("AAPL", "2");

        assert_eq!(report.disconnected, 1);
        assert!(!reg.contains(id));
    }

    #[test]
    fn test_max_subscriptions() {
        let config = WsConfig {
            max_subscriptions_per_client: 2,
            ..WsConfig::default()
        };
        let reg = ClientRegistry::new(config);
        let (id, _rx) = reg.register();

        reg.subscribe(id, "AAPL").unwrap();
        reg.subscribe(id, "MSFT").unwrap();
        // Re-subscribing is not a new subscription
        reg.subscribe(id, "AAPL").unwrap();

        let result = reg.subscribe(id, "GOOG");
        assert_eq!(result, Err(RegistryError::SubscriptionLimit { limit: 2 }));
        assert_eq!(reg.subscriptions(id).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_client() {
        let reg = default_registry();
        let ghost = ConnectionId::new();
        assert_eq!(
            reg.subscribe(ghost, "AAPL"),
            Err(RegistryError::UnknownClient(ghost))
        );
        assert!(reg.unicast(ghost, "x".into()).is_err());
    }

    #[test]
    fn test_unicast_ignores_mutes() {
        let reg = default_registry();
        let (id, mut rx) = reg.register();
        reg.unsubscribe(id, DEFAULT_UPSTREAM_TOPIC).unwrap();

        reg.unicast(id, "ack".into()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "ack");
    }
}
