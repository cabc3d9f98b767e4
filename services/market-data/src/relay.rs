//! Live update relay
//!
//! Consumes the multiplexed upstream topic, folds every per-key update into
//! the history store, and broadcasts the key's whole current history to all
//! connected clients. A client that missed ticks can rebuild a short
//! trailing window from the latest event alone.
//!
//! Failure isolation:
//! - an envelope that fails to decode is logged and dropped as a whole
//! - a key whose update fails to decode is skipped; other keys still apply
//! - nothing here stops the ingestion loop
//!
//! The relay is the single writer of the history store. Messages are handled
//! strictly one at a time, so per-key broadcast order equals arrival order.

use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use types::errors::RelayError;
use types::update::KeyedUpdate;

use crate::events::{relay_frame, UpstreamEnvelope};
use crate::history::{HistoryStore, UpsertOutcome};
use crate::registry::{BroadcastReport, ClientRegistry};

/// Result of relaying one upstream message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Keys upserted and broadcast.
    pub keys_relayed: usize,
    /// Keys skipped because their update failed.
    pub failed_keys: Vec<String>,
    /// Per-client deliveries summed over all keys.
    pub deliveries: usize,
    /// Clients removed during this message's broadcasts.
    pub disconnected: usize,
}

/// Upstream → history → clients.
pub struct LiveRelay {
    store: Arc<HistoryStore>,
    registry: Arc<ClientRegistry>,
    /// Total upstream messages relayed.
    messages_relayed: u64,
    /// Total envelopes dropped as malformed.
    messages_dropped: u64,
    /// Total per-key failures.
    keys_failed: u64,
}

impl LiveRelay {
    pub fn new(store: Arc<HistoryStore>, registry: Arc<ClientRegistry>) -> Self {
        info!(
            history_capacity = store.capacity(),
            upstream_topic = registry.upstream_topic(),
            "LiveRelay initialized"
        );

        Self {
            store,
            registry,
            messages_relayed: 0,
            messages_dropped: 0,
            keys_failed: 0,
        }
    }

    /// Relay one raw upstream message.
    ///
    /// Errors only when the envelope itself is malformed; per-key failures
    /// are reported in the returned `RelayReport`.
    pub fn handle_message(&mut self, raw: &str) -> Result<RelayReport, RelayError> {
        let envelope = match UpstreamEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.messages_dropped += 1;
                warn!(
                    error = %err,
                    messages_dropped = self.messages_dropped,
                    "Dropping malformed upstream message"
                );
                return Err(err);
            }
        };

        let mut report = RelayReport::default();
        if envelope.is_empty() {
            self.messages_relayed += 1;
            debug!("Upstream message carried no keys");
            return Ok(report);
        }

        let key_count = envelope.len();
        for (key, value) in envelope.into_entries() {
            match self.relay_key(&key, value) {
                Ok(broadcast) => {
                    report.keys_relayed += 1;
                    report.deliveries += broadcast.delivered;
                    report.disconnected += broadcast.disconnected;
                }
                Err(err) => {
                    self.keys_failed += 1;
                    warn!(key = %key, error = %err, "Skipping key update");
                    report.failed_keys.push(key);
                }
            }
        }

        self.messages_relayed += 1;
        debug!(
            key_count,
            keys_relayed = report.keys_relayed,
            keys_failed = report.failed_keys.len(),
            deliveries = report.deliveries,
            "Upstream message relayed"
        );
        Ok(report)
    }

    fn relay_key(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<BroadcastReport, RelayError> {
        let update = KeyedUpdate::from_value(key, value)?;
        let outcome = self.store.upsert(key, update);
        if outcome == UpsertOutcome::Coalesced {
            debug!(key, "Coalesced re-flushed update");
        }

        let frame = self
            .store
            .get_json(key)
            .and_then(|history| relay_frame(key, history))
            .map_err(|e| RelayError::InvalidUpdate {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(self.registry.broadcast(key, &frame))
    }

    /// Drive the relay until the upstream stream ends.
    pub async fn run<S>(mut self, mut upstream: S) -> Self
    where
        S: Stream<Item = String> + Unpin,
    {
        while let Some(raw) = upstream.next().await {
            // Malformed messages are already logged; keep consuming.
            let _ = self.handle_message(&raw);
        }

        info!(
            messages_relayed = self.messages_relayed,
            messages_dropped = self.messages_dropped,
            keys_failed = self.keys_failed,
            "Upstream closed, relay stopped"
        );
        self
    }

    /// Total upstream messages relayed since creation.
    pub fn messages_relayed(&self) -> u64 {
        self.messages_relayed
    }

    /// Total malformed envelopes dropped since creation.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }

    /// Total per-key failures since creation.
    pub fn keys_failed(&self) -> u64 {
        self.keys_failed
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }
}
