// src/routes/alertas.rs
//! Alert ingestion and listing: `POST /api/alertas`, `GET /api/alertas`.

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
    Router::new().route("/api/alertas", get(list_handler).post(create_handler))
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
    info!("POST /api/alertas - payload: {}", payload);

    match ingest::submit_alert(state.primary.as_ref(), &state.fallback, &payload).await {
        Ok(accepted) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "storage": accepted.storage,
                "alerta_id": accepted.id,
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
    let page = query::recent_alerts(state.primary.as_ref(), &state.fallback, limit).await;
    Json(json!({
        "success": true,
        "storage": page.storage,
        "count": page.records.len(),
        "alertas": page.records,
    }))
}
