use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use market_data::query::HistoryResult;
use serde::Deserialize;
use types::range::TimeRange;

/// Optional window bounds: `-`/`+`, Unix milliseconds, or RFC 3339.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResult>, AppError> {
    let range = TimeRange::from_params(params.start.as_deref(), params.end.as_deref())?;

    tracing::debug!(ticker = %ticker, start = %range.start, end = %range.end, "History request");

    let result = state.history.query_history(&ticker, range).await?;
    Ok(Json(result))
}
