use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use market_data::timeseries::Table;

/// Current share metadata table, passed through verbatim.
pub async fn get_shares(State(state): State<AppState>) -> Result<Json<Table>, AppError> {
    let table = state.history.query_share_table().await?;
    Ok(Json(table))
}
