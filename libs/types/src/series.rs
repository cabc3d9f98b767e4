//! Labeled time-series types
//!
//! Mirrors the shape returned by a multi-series range query on the
//! time-series backend: each series carries a flat label map and an
//! ascending sequence of `(timestamp, value)` samples.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label holding the ticker a series belongs to.
pub const SHARE_LABEL: &str = "share";
/// Label selecting which merged field a secondary series feeds.
pub const NAME_LABEL: &str = "name";

/// A single sample: millisecond timestamp and value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Unix milliseconds, monotonic within one series
    pub timestamp: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One series returned by a range query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabeledSeries {
    /// Flat label map (e.g. `share=AAPL`, `name=buys`)
    pub labels: BTreeMap<String, String>,
    /// Samples in ascending timestamp order
    pub samples: Vec<TimeSeriesPoint>,
}

impl LabeledSeries {
    pub fn new(labels: BTreeMap<String, String>, samples: Vec<TimeSeriesPoint>) -> Self {
        Self { labels, samples }
    }

    /// Builder-style label insertion.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Look up a label value.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Ticker this series belongs to, if labeled.
    pub fn share(&self) -> Option<&str> {
        self.label(SHARE_LABEL)
    }

    /// Whether every `key=value` pair of the filter is present.
    pub fn matches(&self, filter: &LabelFilter) -> bool {
        filter
            .pairs()
            .iter()
            .all(|(k, v)| self.label(k) == Some(v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Conjunction of `label=value` equality matchers.
///
/// Textual form is the backend's filter syntax: `agg_prices=True`, with
/// multiple matchers separated by whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LabelFilter {
    pairs: Vec<(String, String)>,
}

impl LabelFilter {
    /// Filter with a single `key=value` matcher.
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            pairs: vec![(key.into(), value.into())],
        }
    }

    /// Add another matcher.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Price series family (`agg_prices=True`).
    pub fn aggregated_prices() -> Self {
        Self::eq("agg_prices", "True")
    }

    /// Buy/sell order count family (`agg_orders=True`).
    pub fn aggregated_orders() -> Self {
        Self::eq("agg_orders", "True")
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
