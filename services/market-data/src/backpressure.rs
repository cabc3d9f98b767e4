//! Backpressure and flow control for WebSocket broadcasting
//!
//! Every client gets a bounded outbound queue drained by its own socket
//! writer task. Broadcasting never awaits a client: a full queue triggers
//! the configured drop policy, a closed queue means the client is gone.
//!
//! Without backpressure, one stalled socket would hold up ingestion of every
//! subsequent upstream message.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Drop policy when a client's outbound queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Disconnect the lagging client immediately.
    Disconnect,
    /// Skip this message for the lagging client and keep it connected.
    DropMessage,
}

impl DropPolicy {
    /// Parse the config spelling (`disconnect` / `drop`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "disconnect" => Some(DropPolicy::Disconnect),
            "drop" | "drop_message" => Some(DropPolicy::DropMessage),
            _ => None,
        }
    }
}

/// Result of offering one message to a client queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued for the writer task.
    Queued,
    /// Queue full; message skipped for this client.
    Dropped,
    /// Queue full under `Disconnect`; client should be removed.
    Overflowed,
    /// Writer task is gone; client should be removed.
    Closed,
}

impl Delivery {
    /// Whether the client must be removed from the registry.
    pub fn requires_disconnect(&self) -> bool {
        matches!(self, Delivery::Overflowed | Delivery::Closed)
    }
}

/// Per-client outbound queue with bounded capacity.
#[derive(Debug)]
pub struct ClientQueue {
    sender: mpsc::Sender<String>,
    /// Drop policy on overflow.
    drop_policy: DropPolicy,
    /// Total messages dropped for this client.
    messages_dropped: u64,
    /// Whether this client is marked as lagging.
    is_lagging: bool,
}

impl ClientQueue {
    /// Create a queue and the receiver its writer task drains.
    pub fn channel(capacity: usize, drop_policy: DropPolicy) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                drop_policy,
                messages_dropped: 0,
                is_lagging: false,
            },
            receiver,
        )
    }

    /// Offer a message without waiting.
    pub fn offer(&mut self, payload: String) -> Delivery {
        match self.sender.try_send(payload) {
            Ok(()) => {
                // Clear lagging flag once the queue is back below 50% capacity
                if self.is_lagging && self.depth() < self.capacity() / 2 {
                    self.is_lagging = false;
                }
                Delivery::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.is_lagging = true;
                match self.drop_policy {
                    DropPolicy::Disconnect => Delivery::Overflowed,
                    DropPolicy::DropMessage => {
                        self.messages_dropped += 1;
                        debug!(
                            messages_dropped = self.messages_dropped,
                            "Client queue full, dropping message"
                        );
                        Delivery::Dropped
                    }
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Maximum queue capacity.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Number of messages currently queued.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Whether this client is currently lagging.
    pub fn is_lagging(&self) -> bool {
        self.is_lagging
    }

    /// Total messages dropped for this client.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Configuration for the backpressure system.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Maximum queue size per client.
    pub queue_capacity: usize,
    /// Drop policy on overflow.
    pub drop_policy: DropPolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            drop_policy: DropPolicy::DropMessage,
        }
    }
}
