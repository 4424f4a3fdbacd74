// src/routes/dashboard.rs
//! Cached dashboard views, read from the primary store only.
//!
//! A primary failure is a 503 and is never cached.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, response::Response,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use super::{AppState, ListQuery};
use crate::PrimaryError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/dashboard/summary", get(summary))
        .route("/api/dashboard/leituras", get(readings))
        .route("/api/dashboard/alertas", get(alerts))
        .route("/api/dashboard/cache", delete(invalidate))
}

fn respond<T: Serialize>(result: Result<T, PrimaryError>) -> Response {
    // ---
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Dashboard query failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "primary store unavailable", "details": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn summary(State(state): State<AppState>) -> Response {
    respond(state.dashboard.summary().await)
}

async fn readings(Query(params): Query<ListQuery>, State(state): State<AppState>) -> Response {
    let limit = params.limit();
    respond(state.dashboard.readings(limit).await)
}

async fn alerts(Query(params): Query<ListQuery>, State(state): State<AppState>) -> Response {
    let limit = params.limit();
    respond(state.dashboard.alerts(limit).await)
}

async fn invalidate(State(state): State<AppState>) -> impl IntoResponse {
    state.dashboard.invalidate();
    StatusCode::NO_CONTENT
}
