//! Primary store client.
//!
//! The primary store is the authoritative relational database. Every request
//! opens its own session through [`PrimaryStore::connect`], uses it, and closes
//! it with [`PrimarySession::close`] on every path, success or failure, before
//! any fallback write happens.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{PrimaryBackend, PrimaryConfig};
use crate::error::PrimaryError;
use crate::models::{NewAlert, NewReading, StoredAlert, StoredReading};

mod memory;
mod postgres;

pub use memory::MemoryPrimary;
pub use postgres::PgPrimaryStore;

// ---

/// Tables the service expects to find in the primary store.
pub const EXPECTED_TABLES: [&str; 3] = ["ww_leitura_sensor", "ww_alerta", "ww_nivel_severidade"];

/// Address encodings tried, in this order, when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressVariant {
    /// `host:port/database`
    HostPortService,
    /// `host=.. port=.. dbname=.. user=..`, assembled field by field.
    Descriptor,
    /// `postgresql://host:port/database?sslmode=disable`
    ExplicitProtocol,
}

impl AddressVariant {
    pub const PRIORITY: [AddressVariant; 3] = [
        AddressVariant::HostPortService,
        AddressVariant::Descriptor,
        AddressVariant::ExplicitProtocol,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AddressVariant::HostPortService => "host_port_service",
            AddressVariant::Descriptor => "descriptor",
            AddressVariant::ExplicitProtocol => "explicit_protocol",
        }
    }

    /// Human-readable address; never includes the password.
    pub fn render(self, cfg: &PrimaryConfig) -> String {
        match self {
            AddressVariant::HostPortService => {
                format!("{}:{}/{}", cfg.host, cfg.port, cfg.database)
            }
            AddressVariant::Descriptor => format!(
                "host={} port={} dbname={} user={}",
                cfg.host, cfg.port, cfg.database, cfg.user
            ),
            AddressVariant::ExplicitProtocol => format!(
                "postgresql://{}:{}/{}?sslmode=disable",
                cfg.host, cfg.port, cfg.database
            ),
        }
    }
}

/// Who we are talking to, as reported by a successful probe.
#[derive(Debug, Clone, Serialize)]
pub struct PrimaryIdentity {
    pub user: String,
    pub database: String,
    pub tables_found: i64,
    pub tables_expected: usize,
}

/// Aggregates shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyMetrics {
    pub leituras_hoje: i64,
    pub alertas_hoje: i64,
    pub sensores_ativos: i64,
    /// Alert count per severity code over the last 24 hours.
    pub alertas_por_severidade: BTreeMap<String, i64>,
}

/// Static description of a primary store, for the banner and debug routes.
#[derive(Debug, Clone, Serialize)]
pub struct PrimaryDescription {
    pub backend: &'static str,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password_length: Option<usize>,
    pub address_variants: Vec<String>,
}

impl PrimaryDescription {
    pub fn without_address(backend: &'static str) -> Self {
        Self {
            backend,
            host: None,
            port: None,
            database: None,
            user: None,
            password_length: None,
            address_variants: Vec::new(),
        }
    }
}

/// Factory for primary store sessions.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Open a fresh session, or fail with
    /// [`PrimaryError::ConnectionUnavailable`] once every address is exhausted.
    async fn connect(&self) -> Result<Box<dyn PrimarySession>, PrimaryError>;

    fn describe(&self) -> PrimaryDescription;
}

/// One open connection to the primary store.
#[async_trait]
pub trait PrimarySession: Send {
    async fn ping(&mut self) -> Result<PrimaryIdentity, PrimaryError>;

    /// Insert and commit a reading; returns the store-assigned id.
    async fn insert_reading(&mut self, reading: &NewReading) -> Result<i64, PrimaryError>;

    /// Insert and commit an alert, resolving its severity code.
    ///
    /// An unknown code is a [`PrimaryError::ConstraintViolation`].
    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<i64, PrimaryError>;

    async fn fetch_recent_readings(&mut self, limit: i64) -> Result<Vec<StoredReading>, PrimaryError>;

    async fn fetch_recent_alerts(&mut self, limit: i64) -> Result<Vec<StoredAlert>, PrimaryError>;

    async fn daily_metrics(&mut self) -> Result<DailyMetrics, PrimaryError>;

    async fn close(self: Box<Self>);
}

/// Primary store that is switched off; every connect fails immediately.
#[derive(Debug, Default)]
pub struct DisabledPrimary;

#[async_trait]
impl PrimaryStore for DisabledPrimary {
    async fn connect(&self) -> Result<Box<dyn PrimarySession>, PrimaryError> {
        tracing::debug!("Primary store disabled, skipping connection");
        Err(PrimaryError::ConnectionUnavailable { attempts: 0 })
    }

    fn describe(&self) -> PrimaryDescription {
        PrimaryDescription::without_address("disabled")
    }
}

/// Build the primary store selected by the configuration.
pub fn from_config(backend: &PrimaryBackend) -> Arc<dyn PrimaryStore> {
    // ---
    match backend {
        PrimaryBackend::Postgres(cfg) => Arc::new(PgPrimaryStore::new(cfg.clone())),
        PrimaryBackend::Memory => Arc::new(MemoryPrimary::new()),
        PrimaryBackend::Disabled => Arc::new(DisabledPrimary),
    }
}

/// Connect, identify the store, and close again.
pub async fn probe(store: &dyn PrimaryStore) -> Result<PrimaryIdentity, PrimaryError> {
    // ---
    let mut session = store.connect().await?;
    let identity = session.ping().await;
    session.close().await;

    match &identity {
        Ok(id) => tracing::info!(
            user = %id.user,
            database = %id.database,
            "Primary store reachable, tables found {}/{}",
            id.tables_found,
            id.tables_expected
        ),
        Err(e) => tracing::warn!(error = %e, "Primary store connected but probe failed"),
    }
    identity
}
