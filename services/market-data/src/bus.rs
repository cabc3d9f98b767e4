//! Upstream pub/sub bus
//!
//! The relay reads one topic from the bus; clients may publish onto any
//! topic. `MessageBus` is the seam to the transport; `LocalBus` is the
//! in-process implementation built on `tokio::sync::broadcast`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use types::errors::RelayError;

/// Default per-topic buffer for `LocalBus`.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Publish/subscribe transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `message` on `topic`. Returns the number of live subscribers.
    async fn publish(&self, topic: &str, message: String) -> Result<usize, RelayError>;

    /// Lazy sequence of raw messages published on `topic` from now on.
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, RelayError>;

    /// Drop the process-wide subscription to `topic`; open streams end.
    async fn unsubscribe(&self, topic: &str) -> Result<(), RelayError>;
}

/// In-process bus. Topics are created lazily on first subscribe.
///
/// Clone-able via internal Arc.
#[derive(Clone)]
pub struct LocalBus {
    topics: Arc<DashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with an open subscription.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, message: String) -> Result<usize, RelayError> {
        let delivered = match self.topics.get(topic) {
            // No receivers is not an error for fire-and-forget pub/sub.
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        };
        debug!(topic, delivered, "Published to bus");
        Ok(delivered)
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, RelayError> {
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let topic = topic.to_string();
        let stream = stream::unfold((receiver, topic), |(mut receiver, topic)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, (receiver, topic))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Bus subscriber lagged, messages lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), RelayError> {
        // Dropping the only sender closes every receiver for the topic.
        if self.topics.remove(topic).is_some() {
            debug!(topic, "Bus topic closed");
        }
        Ok(())
    }
}
