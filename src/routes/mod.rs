use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse,
    response::Response, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{query, Config, DashboardReader, FallbackStore, IngestError, PrimaryStore, ValidationError};

mod alertas;
mod dashboard;
mod health;
mod leituras;
mod sync;

// ---

/// Shared handles every route works with.
#[derive(Clone)]
pub struct AppState {
    pub primary: Arc<dyn PrimaryStore>,
    pub fallback: Arc<FallbackStore>,
    pub dashboard: Arc<DashboardReader>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(primary: Arc<dyn PrimaryStore>, config: Config) -> Self {
        // ---
        let fallback = FallbackStore::new(config.fallback_file.clone(), config.retention);
        let dashboard = DashboardReader::new(Arc::clone(&primary), config.dashboard_ttls);
        Self {
            primary,
            fallback: Arc::new(fallback),
            dashboard: Arc::new(dashboard),
            config: Arc::new(config),
        }
    }
}

/// `?limit=N` on list endpoints.
///
/// Kept as text so a malformed value falls back to the default page size
/// instead of rejecting the request.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<String>,
}

impl ListQuery {
    pub fn limit(&self) -> u32 {
        query::parse_limit(self.limit.as_deref())
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(leituras::router())
        .merge(alertas::router())
        .merge(sync::router())
        .merge(dashboard::router())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "endpoint not found", "timestamp": Utc::now()})),
    )
        .into_response()
}

/// Response for a body that is not valid JSON.
fn bad_json(rejection: JsonRejection) -> Response {
    // ---
    tracing::warn!(error = %rejection.body_text(), "Rejected request body");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "no JSON payload received",
            "details": rejection.body_text(),
        })),
    )
        .into_response()
}

/// Map a rejected submission onto its HTTP status and body.
fn ingest_error(err: IngestError) -> Response {
    // ---
    match err {
        IngestError::Validation(ValidationError::MissingFields {
            ref missing,
            required,
            ref received,
        }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": err.to_string(),
                "missing_fields": missing,
                "required_fields": required,
                "received_fields": received,
            })),
        )
            .into_response(),
        IngestError::Validation(ref validation) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": validation.to_string()})),
        )
            .into_response(),
        IngestError::PersistenceUnavailable { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "failed to persist submission",
                "details": err.to_string(),
                "timestamp": Utc::now(),
            })),
        )
            .into_response(),
    }
}
