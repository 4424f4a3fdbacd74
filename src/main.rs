//! Application entry point for the `waterwise-telemetry` backend service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Building the configured primary store (PostgreSQL, memory, or disabled)
//! - Creating the primary schema when the database is reachable
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! An unreachable primary store is not fatal: the service starts anyway and
//! writes into the fallback ledger until the database comes back.
//!
//! # Environment Variables
//! - `PRIMARY_BACKEND` – `postgres` (default), `memory`, or `disabled`
//! - `PRIMARY_DB_HOST` / `PRIMARY_DB_USER` / `PRIMARY_DB_PASSWORD` – required for postgres
//! - `FALLBACK_DATA_FILE` – ledger path (default: `waterwise_data.json`)
//! - `WATERWISE_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `WATERWISE_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use waterwise_telemetry::{
    load_from_env, primary, router, AppState, PgPrimaryStore, PrimaryBackend, PrimaryStore,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = load_from_env()?;
    cfg.log_config();

    let primary: Arc<dyn PrimaryStore> = match &cfg.primary {
        PrimaryBackend::Postgres(pg) => {
            let store = PgPrimaryStore::new(pg.clone());
            match store.bootstrap_schema().await {
                Ok(()) => tracing::info!("Primary schema ready"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Primary store not reachable at startup, serving from fallback ledger until it is"
                ),
            }
            Arc::new(store)
        }
        other => primary::from_config(other),
    };

    let addr = cfg.bind_addr;
    let app = router(AppState::new(primary, cfg));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Log target, file, and line number output enabled
/// - Color output controlled by `FORCE_COLOR` (`1|true|yes` on, `0|false|no`
///   off), otherwise TTY detection
/// - Span events from `WATERWISE_SPAN_EVENTS`:
///   - `"full"`       : ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : ENTER and EXIT only
///   - unset or other values: CLOSE events only
/// - Level from `RUST_LOG`, else `WATERWISE_LOG_LEVEL`
///
/// Called once at startup before any logging macro runs.
fn init_tracing() {
    // ---
    let span_events = match env::var("WATERWISE_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("WATERWISE_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
