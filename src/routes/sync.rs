// src/routes/sync.rs
//! `POST /api/sync`: replay the fallback ledger into the primary store.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::{ingest, ReplayError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/sync", post(handler))
}

/// Replay unsynced fallback entries into the primary store.
async fn handler(State(state): State<AppState>) -> Response {
    // ---
    info!("POST /api/sync - replaying fallback ledger");

    match ingest::replay(state.primary.as_ref(), &state.fallback).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(ReplayError::Primary(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "primary store unavailable", "details": e.to_string()})),
        )
            .into_response(),
        Err(e @ ReplayError::Fallback(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "failed to update fallback ledger", "details": e.to_string()})),
        )
            .into_response(),
    }
}
