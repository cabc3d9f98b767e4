//! Sample merge engine
//!
//! Aligns independently-sampled series onto the timestamps of a primary
//! series. Output timestamps are exactly the primary's, in the primary's
//! order; each secondary contributes its field only on an exact timestamp
//! match. No interpolation, no zero-fill.
//!
//! Secondaries are indexed by timestamp once, so a merge costs
//! O(|primary| + Σ|secondary|) rather than a rescan per output row.

use std::collections::HashMap;

use tracing::debug;
use types::record::{MergedRecord, SeriesField};
use types::series::{LabeledSeries, NAME_LABEL};

/// Timestamp index over one secondary series.
struct SecondaryIndex {
    field: SeriesField,
    by_time: HashMap<i64, f64>,
}

impl SecondaryIndex {
    /// Index a secondary, routed by its `name` label. Unroutable series
    /// contribute nothing.
    fn build(series: &LabeledSeries) -> Option<Self> {
        let name = series.label(NAME_LABEL)?;
        let Some(field) = SeriesField::from_name(name) else {
            debug!(name, "Ignoring secondary series with unknown name label");
            return None;
        };

        let mut by_time = HashMap::with_capacity(series.samples.len());
        for point in &series.samples {
            // First sample at a timestamp wins.
            by_time.entry(point.timestamp).or_insert(point.value);
        }
        Some(Self { field, by_time })
    }
}

/// Merge `secondaries` onto the timestamps of `primary`.
///
/// Produces exactly `primary.samples.len()` records. An empty primary yields
/// an empty result, which callers treat as "no data" rather than an error.
/// When two secondaries route to the same field, the later one wins.
pub fn merge(primary: &LabeledSeries, secondaries: &[LabeledSeries]) -> Vec<MergedRecord> {
    if primary.samples.is_empty() {
        return Vec::new();
    }

    let indexes: Vec<SecondaryIndex> = secondaries
        .iter()
        .filter_map(SecondaryIndex::build)
        .collect();

    primary
        .samples
        .iter()
        .map(|point| {
            let mut record = MergedRecord::priced(point.timestamp, point.value);
            for index in &indexes {
                if let Some(value) = index.by_time.get(&point.timestamp) {
                    record.set(index.field, *value);
                }
            }
            record
        })
        .collect()
}


// ── Property-Based Tests ────────────────────────────────────────────

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use types::series::TimeSeriesPoint;

    fn sorted_series(times: Vec<i64>) -> Vec<TimeSeriesPoint> {
        let mut times = times;
        times.sort_unstable();
        times
            .into_iter()
            .enumerate()
            .map(|(i, t)| TimeSeriesPoint::new(t, i as f64))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_output_tracks_primary(
            primary_times in proptest::collection::vec(0i64..500, 0..60),
            buy_times in proptest::collection::vec(0i64..500, 0..60),
        ) {
            let primary = LabeledSeries::new(Default::default(), sorted_series(primary_times));
            let buys = LabeledSeries::new(Default::default(), sorted_series(buy_times))
                .with_label(NAME_LABEL, "buys");

            let merged = merge(&primary, &[buys.clone()]);

            prop_assert_eq!(merged.len(), primary.samples.len());
            for (record, point) in merged.iter().zip(&primary.samples) {
                prop_assert_eq!(record.time, point.timestamp);
                prop_assert_eq!(record.price, Some(point.value));
                let has_match = buys.samples.iter().any(|p| p.timestamp == point.timestamp);
                prop_assert_eq!(record.buys.is_some(), has_match);
            }
        }
    }
}
