// src/routes/health.rs
//! Service banner, health check and debug introspection.
//!
//! All three endpoints probe the primary store with a fresh connection, so
//! their answers reflect reachability at request time.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;

use super::AppState;
use crate::primary::{self, PrimaryDescription};
use crate::StorageTag;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/api/debug", get(debug_info))
}

fn storage_mode(primary_connected: bool) -> StorageTag {
    if primary_connected {
        StorageTag::Primary
    } else {
        StorageTag::Fallback
    }
}

fn primary_summary(desc: &PrimaryDescription) -> serde_json::Value {
    json!({
        "backend": desc.backend,
        "host": desc.host,
        "port": desc.port,
        "database": desc.database,
        "user": desc.user,
    })
}

/// Handle `GET /`.
async fn banner(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let connected = primary::probe(state.primary.as_ref()).await.is_ok();
    let desc = state.primary.describe();

    Json(json!({
        "message": "WaterWise API - flood-risk telemetry",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "online",
        "primary": primary_summary(&desc),
        "primary_connected": connected,
        "storage_mode": storage_mode(connected),
        "timestamp": Utc::now(),
    }))
}

/// Handle `GET /health`.
///
/// 200 when the primary store answers, 206 when only the fallback ledger is
/// available.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let connected = primary::probe(state.primary.as_ref()).await.is_ok();
    let ledger = state.fallback.load().await;
    let desc = state.primary.describe();

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::PARTIAL_CONTENT
    };

    (
        status,
        Json(json!({
            "api_status": "healthy",
            "oracle_connection": connected,
            "storage_mode": storage_mode(connected),
            "fallback_data": {
                "leituras": ledger.leituras.len(),
                "alertas": ledger.alertas.len(),
            },
            "config": primary_summary(&desc),
            "timestamp": Utc::now(),
        })),
    )
}

/// Handle `GET /api/debug`.
async fn debug_info(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let probe = primary::probe(state.primary.as_ref()).await;
    let desc = state.primary.describe();
    let exists = state.fallback.exists().await;
    let data = if exists {
        Some(state.fallback.load().await)
    } else {
        None
    };
    let current_directory = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    Json(json!({
        "primary_connection_test": probe.is_ok(),
        "primary_identity": probe.as_ref().ok(),
        "primary_error": probe.as_ref().err().map(ToString::to_string),
        "primary": {
            "backend": desc.backend,
            "host": desc.host,
            "port": desc.port,
            "database": desc.database,
            "user": desc.user,
            "password_length": desc.password_length,
        },
        "address_variants": desc.address_variants,
        "fallback_info": {
            "file": state.fallback.path().display().to_string(),
            "exists": exists,
            "retention": state.fallback.retention(),
            "data": data,
        },
        "system_info": {
            "current_directory": current_directory,
            "service_version": env!("CARGO_PKG_VERSION"),
        },
        "timestamp": Utc::now(),
    }))
}
