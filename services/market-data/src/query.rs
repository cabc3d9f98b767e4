//! Historical query service
//!
//! Answers "price + buys + sells for one ticker over a window" by running two
//! label-filtered range queries against the time-series backend and merging
//! the results onto the price series' timestamps.
//!
//! Every backend call is bounded by a timeout and fails closed: a slow or
//! failing backend produces an error, never a partial result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use types::errors::RelayError;
use types::range::TimeRange;
use types::record::{MergedRecord, SeriesField};
use types::series::{LabelFilter, LabeledSeries, NAME_LABEL};

use crate::merge::merge;
use crate::timeseries::{Table, TimeSeriesBackend};

/// Name of the share metadata table.
pub const SHARES_TABLE: &str = "shares";

/// Historical query response.
///
/// Serializes as `{"data": [...]}` or `{}`; the empty form means no price
/// data for the ticker/window, which is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryResult {
    Data { data: Vec<MergedRecord> },
    Empty {},
}

impl HistoryResult {
    pub fn records(&self) -> &[MergedRecord] {
        match self {
            HistoryResult::Data { data } => data,
            HistoryResult::Empty {} => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HistoryResult::Empty {})
    }
}

/// Configuration for the query service.
#[derive(Debug, Clone)]
pub struct HistoryServiceConfig {
    /// Upper bound on each backend round trip.
    pub query_timeout: Duration,
    /// Label filter selecting the price family.
    pub price_filter: LabelFilter,
    /// Label filter selecting the order-count family.
    pub order_filter: LabelFilter,
}

impl Default for HistoryServiceConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            price_filter: LabelFilter::aggregated_prices(),
            order_filter: LabelFilter::aggregated_orders(),
        }
    }
}

/// Orchestrates backend range queries and the merge engine.
pub struct HistoryService {
    backend: Arc<dyn TimeSeriesBackend>,
    config: HistoryServiceConfig,
}

impl HistoryService {
    pub fn new(backend: Arc<dyn TimeSeriesBackend>, config: HistoryServiceConfig) -> Self {
        Self { backend, config }
    }

    /// Merged history for `ticker` over `range`.
    pub async fn query_history(
        &self,
        ticker: &str,
        range: TimeRange,
    ) -> Result<HistoryResult, RelayError> {
        let (prices, orders) = self
            .bounded(async {
                tokio::try_join!(
                    self.backend.range_query(range, &self.config.price_filter),
                    self.backend.range_query(range, &self.config.order_filter),
                )
            })
            .await
            .map_err(|e| {
                error!(ticker, error = %e, "History query failed");
                e
            })?;

        let Some(primary) = prices.into_iter().find(|s| s.share() == Some(ticker)) else {
            debug!(ticker, "No price series for ticker");
            return Ok(HistoryResult::Empty {});
        };
        if primary.is_empty() {
            debug!(ticker, "Price series has no samples in range");
            return Ok(HistoryResult::Empty {});
        }

        let secondaries = order_series_for(orders, ticker);
        let data = merge(&primary, &secondaries);
        debug!(
            ticker,
            records = data.len(),
            secondaries = secondaries.len(),
            "History merged"
        );
        Ok(HistoryResult::Data { data })
    }

    /// The share metadata table, verbatim.
    pub async fn query_share_table(&self) -> Result<Table, RelayError> {
        self.bounded(self.backend.get_table(SHARES_TABLE))
            .await
            .map_err(|e| {
                error!(error = %e, "Share table query failed");
                e
            })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, RelayError>>,
    {
        let timeout = self.config.query_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "Backend query timed out");
                Err(RelayError::BackendTimeout { timeout_ms })
            }
        }
    }
}

/// The ticker's order series routed to `buys`/`sells`, buys first.
fn order_series_for(orders: Vec<LabeledSeries>, ticker: &str) -> Vec<LabeledSeries> {
    let mut routed: Vec<(SeriesField, LabeledSeries)> = orders
        .into_iter()
        .filter(|s| s.share() == Some(ticker))
        .filter_map(|s| {
            let field = s.label(NAME_LABEL).and_then(SeriesField::from_name)?;
            Some((field, s))
        })
        .collect();
    routed.sort_by_key(|(field, _)| *field);
    routed.into_iter().map(|(_, s)| s).collect()
}
