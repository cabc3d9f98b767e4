use crate::handlers::{health, history, shares, ws};
use crate::state::AppState;
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/server", get(health::server))
        .route("/history/{ticker}", get(history::get_history))
        .route("/history-data/{ticker}", get(history::get_history))
        .route("/history-data/{ticker}/", get(history::get_history))
        .route("/shares", get(shares::get_shares))
        .route("/shares-data", get(shares::get_shares))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
