// src/routes/leituras.rs
//! Reading ingestion and listing: `POST /api/leituras`, `GET /api/leituras`.
//!
//! Writes go primary first and fall back to the local ledger; the response
//! carries the storage tag of whichever store took the record.

use axum::{
    extract::rejection::JsonRejection, extract::Query, extract::State, http::StatusCode,
    response::IntoResponse, response::Response, routing::get, Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::{bad_json, ingest_error, AppState, ListQuery};
use crate::{ingest, query};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/leituras", get(list_handler).post(create_handler))
}

async fn create_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    // ---
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_json(rejection),
    };
    info!("POST /api/leituras - payload: {}", payload);

    match ingest::submit_reading(
        state.primary.as_ref(),
        &state.fallback,
        &state.config.provenance,
        &payload,
    )
    .await
    {
        Ok(accepted) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "storage": accepted.storage,
                "leitura_id": accepted.id,
                "data": accepted.record,
                "timestamp": Utc::now(),
            })),
        )
            .into_response(),
        Err(e) => ingest_error(e),
    }
}

async fn list_handler(
    Query(params): Query<ListQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    let limit = params.limit();
    info!("GET /api/leituras - limit {}", limit);

    let page = query::recent_readings(state.primary.as_ref(), &state.fallback, limit).await;
    Json(json!({
        "success": true,
        "storage": page.storage,
        "count": page.records.len(),
        "leituras": page.records,
    }))
}
