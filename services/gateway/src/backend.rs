//! HTTP connector for the time-series service.
//!
//! `GET {base}/range?start=&end=&filter=` returns the matching series as
//! `[{"labels": {...}, "samples": [{"timestamp", "value"}]}]`;
//! `GET {base}/tables/{name}` returns a flat `{field: value}` object.

use std::time::Duration;

use async_trait::async_trait;
use market_data::timeseries::{Table, TimeSeriesBackend};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use types::errors::RelayError;
use types::range::TimeRange;
use types::series::{LabelFilter, LabeledSeries};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub struct HttpTimeSeries {
    client: Client,
    base_url: String,
    retries: u32,
}

impl HttpTimeSeries {
    pub fn new(base_url: impl Into<String>, retries: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retries,
        }
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, RelayError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| RelayError::BackendUnavailable(format!("invalid backend url: {}", e)))
    }

    /// GET `url` and decode the JSON body, retrying with doubling backoff.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RelayError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.try_get(url.clone()).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        url = %url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Time-series request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, url: Url) -> Result<T, RelayError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("Time-series service error: {}", e)))?;

        if !res.status().is_success() {
            return Err(RelayError::BackendUnavailable(format!(
                "Time-series service returned {}",
                res.status()
            )));
        }

        res.json::<T>()
            .await
            .map_err(|e| RelayError::BackendUnavailable(format!("Invalid time-series response: {}", e)))
    }
}

#[async_trait]
impl TimeSeriesBackend for HttpTimeSeries {
    async fn range_query(
        &self,
        range: TimeRange,
        filter: &LabelFilter,
    ) -> Result<Vec<LabeledSeries>, RelayError> {
        let url = self.url(
            "/range",
            &[
                ("start", range.start.to_string()),
                ("end", range.end.to_string()),
                ("filter", filter.to_string()),
            ],
        )?;
        self.get_json(url).await
    }

    async fn get_table(&self, name: &str) -> Result<Table, RelayError> {
        let url = self.url(&format!("/tables/{}", name), &[])?;
        self.get_json(url).await
    }
}
