// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;
use crate::store::{TrendRow, TrendStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TrendStore>,
}

impl AppState {
    pub fn new(store: Arc<TrendStore>) -> Self {
        Self { store }
    }
}

/// Read-only API for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trends", get(list_trends))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Read API plus `/metrics`, as served by `crypto-trend serve`.
pub fn app(state: AppState, metrics: &Metrics) -> Router {
    router(state).merge(metrics.router())
}

#[derive(Debug, serde::Deserialize)]
struct TrendQuery {
    #[serde(default)]
    crypto: Option<String>,
}

async fn list_trends(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> Result<Json<Vec<TrendRow>>, (StatusCode, String)> {
    // `?crypto=` (empty) means no filter
    let crypto = q.crypto.as_deref().map(str::trim).filter(|c| !c.is_empty());
    match state.store.list_trends(crypto) {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            tracing::error!(error = ?e, "listing trends failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to read trend data".to_string(),
            ))
        }
    }
}
