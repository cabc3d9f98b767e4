//! Time-series backend seam
//!
//! The historical query path needs two things from storage: a multi-series
//! range query filtered by labels, and a flat key → value table.
//! `InMemoryTimeSeries` serves both from process memory for development and
//! tests; production connectors live with the binary that configures them.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use types::errors::RelayError;
use types::range::TimeRange;
use types::series::{LabelFilter, LabeledSeries, TimeSeriesPoint};

/// Flat snapshot table (e.g. latest known share metadata).
pub type Table = BTreeMap<String, String>;

/// Read access to the time-series store.
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Every series matching `filter`, samples clipped to `range`.
    async fn range_query(
        &self,
        range: TimeRange,
        filter: &LabelFilter,
    ) -> Result<Vec<LabeledSeries>, RelayError>;

    /// A named flat table. Unknown tables read as empty.
    async fn get_table(&self, name: &str) -> Result<Table, RelayError>;
}

/// In-memory backend.
#[derive(Default)]
pub struct InMemoryTimeSeries {
    series: RwLock<Vec<LabeledSeries>>,
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series, keeping its samples sorted by timestamp.
    pub async fn insert_series(&self, mut series: LabeledSeries) {
        series.samples.sort_by_key(|p| p.timestamp);
        self.series.write().await.push(series);
    }

    /// Append a sample to the first series whose labels equal `labels`,
    /// creating the series if needed.
    pub async fn add_sample(&self, labels: &BTreeMap<String, String>, point: TimeSeriesPoint) {
        let mut all = self.series.write().await;
        match all.iter_mut().find(|s| &s.labels == labels) {
            Some(series) => {
                let at = series
                    .samples
                    .partition_point(|p| p.timestamp <= point.timestamp);
                series.samples.insert(at, point);
            }
            None => all.push(LabeledSeries::new(labels.clone(), vec![point])),
        }
    }

    /// Set one field of a named table.
    pub async fn set_table_field(&self, table: &str, field: &str, value: &str) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

#[async_trait]
impl TimeSeriesBackend for InMemoryTimeSeries {
    async fn range_query(
        &self,
        range: TimeRange,
        filter: &LabelFilter,
    ) -> Result<Vec<LabeledSeries>, RelayError> {
        let all = self.series.read().await;
        Ok(all
            .iter()
            .filter(|s| s.matches(filter))
            .map(|s| LabeledSeries {
                labels: s.labels.clone(),
                samples: s
                    .samples
                    .iter()
                    .copied()
                    .filter(|p| range.contains(p.timestamp))
                    .collect(),
            })
            .collect())
    }

    async fn get_table(&self, name: &str) -> Result<Table, RelayError> {
        Ok(self
            .tables
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::range::TimeBound;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_range_query_filters_labels_and_time() {
        let backend = InMemoryTimeSeries::new();
        let aapl = labels(&[("agg_prices", "True"), ("share", "AAPL")]);
        for t in [50, 100, 150, 250] {
            backend.add_sample(&aapl, TimeSeriesPoint::new(t, t as f64)).await;
        }
        backend
            .add_sample(
                &labels(&[("agg_orders", "True"), ("share", "AAPL"), ("name", "buys")]),
                TimeSeriesPoint::new(100, 1.0),
            )
            .await;

        let range = TimeRange::new(TimeBound::At(100), TimeBound::At(200));
        let result = backend
            .range_query(range, &LabelFilter::aggregated_prices())
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        let times: Vec<i64> = result[0].samples.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![100, 150]);
    }

    #[tokio::test]
    async fn test_samples_kept_sorted() {
        let backend = InMemoryTimeSeries::new();
        let key = labels(&[("agg_prices", "True")]);
        for t in [30, 10, 20] {
            backend.add_sample(&key, TimeSeriesPoint::new(t, 0.0)).await;
        }
        backend
            .insert_series(LabeledSeries::new(
                labels(&[("agg_prices", "True"), ("share", "X")]),
                vec![TimeSeriesPoint::new(2, 0.0), TimeSeriesPoint::new(1, 0.0)],
            ))
            .await;

        let result = backend
            .range_query(TimeRange::all(), &LabelFilter::aggregated_prices())
            .await
            .unwrap();
        for series in result {
            assert!(series.samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[tokio::test]
    async fn test_tables() {
        let backend = InMemoryTimeSeries::new();
        assert!(backend.get_table("shares").await.unwrap().is_empty());

        backend.set_table_field("shares", "AAPL", "Apple Inc.").await;
        let table = backend.get_table("shares").await.unwrap();
        assert_eq!(table.get("AAPL").map(String::as_str), Some("Apple Inc."));
    }
}
