//! Configuration loader for the `waterwise-telemetry` service.
//!
//! All runtime values and their defaults live here, loaded from environment
//! variables (with optional `.env` support provided by the caller). The
//! resulting [`Config`] is built once at startup and handed to every
//! component that needs it; nothing reads `env::var` after that.
use std::{env, fmt, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Result};

use crate::fallback::RetentionPolicy;

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Which implementation backs the primary store.
#[derive(Debug, Clone)]
pub enum PrimaryBackend {
    // ---
    /// PostgreSQL reached through `sqlx`, one fresh connection per request.
    Postgres(PrimaryConfig),

    /// In-process store; useful for local runs and tests.
    Memory,

    /// Connector switched off; every request lands in the fallback ledger.
    Disabled,
}

impl PrimaryBackend {
    pub fn name(&self) -> &'static str {
        match self {
            PrimaryBackend::Postgres(_) => "postgres",
            PrimaryBackend::Memory => "memory",
            PrimaryBackend::Disabled => "disabled",
        }
    }
}

/// Connection settings for the PostgreSQL primary store.
#[derive(Clone)]
pub struct PrimaryConfig {
    // ---
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,

    /// Upper bound for a single address variant's connect attempt.
    pub connect_timeout: Duration,
}

// Keeps the password out of `{:?}` output.
impl fmt::Debug for PrimaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"****")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Provenance tags applied to readings that do not carry their own.
#[derive(Debug, Clone)]
pub struct ProvenanceDefaults {
    pub farm_id: String,
    pub team_name: String,
}

/// TTLs for the dashboard read-through caches.
#[derive(Debug, Clone, Copy)]
pub struct DashboardTtls {
    pub summary: Duration,
    pub readings: Duration,
    pub alerts: Duration,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Primary store selection and settings.
    pub primary: PrimaryBackend,

    /// Location of the fallback ledger file.
    pub fallback_file: PathBuf,

    /// Retention bounds per record kind in the fallback ledger.
    pub retention: RetentionPolicy,

    pub provenance: ProvenanceDefaults,

    pub dashboard_ttls: DashboardTtls,
}

/// Load configuration from the process environment.
///
/// Required (postgres backend only):
/// - `PRIMARY_DB_HOST`, `PRIMARY_DB_USER`, `PRIMARY_DB_PASSWORD`
///
/// Everything else has a default; see [`Config::load_with`].
pub fn load_from_env() -> Result<Config> {
    // ---
    Config::load_with(|key| env::var(key).ok())
}

impl Config {
    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Returns an error if a required variable is missing or any value fails
    /// to parse.
    pub fn load_with<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ---
        let bind_addr = parse_env!(lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 5000)));

        let backend = lookup("PRIMARY_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let primary = match backend.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => {
                let connect_timeout_secs: u64 = parse_env!(lookup, "PRIMARY_CONNECT_TIMEOUT_SECS", 5);
                PrimaryBackend::Postgres(PrimaryConfig {
                    host: require_env!(lookup, "PRIMARY_DB_HOST"),
                    port: parse_env!(lookup, "PRIMARY_DB_PORT", 5432),
                    database: lookup("PRIMARY_DB_NAME").unwrap_or_else(|| "waterwise".to_string()),
                    user: require_env!(lookup, "PRIMARY_DB_USER"),
                    password: require_env!(lookup, "PRIMARY_DB_PASSWORD"),
                    connect_timeout: Duration::from_secs(connect_timeout_secs),
                })
            }
            "memory" => PrimaryBackend::Memory,
            "disabled" | "none" | "off" => PrimaryBackend::Disabled,
            other => bail!("Invalid PRIMARY_BACKEND: {other} (expected postgres, memory or disabled)"),
        };

        let fallback_file = lookup("FALLBACK_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("waterwise_data.json"));

        let retention = RetentionPolicy {
            max_readings: parse_bound(&lookup, "FALLBACK_MAX_READINGS", Some(100))?,
            max_alerts: parse_bound(&lookup, "FALLBACK_MAX_ALERTS", None)?,
        };

        let provenance = ProvenanceDefaults {
            farm_id: lookup("DEFAULT_FARM_ID").unwrap_or_else(|| "FARM_WaterWise_2025".to_string()),
            team_name: lookup("DEFAULT_TEAM_NAME").unwrap_or_else(|| "GRUPO_WATERWISE".to_string()),
        };

        let summary_ttl: u64 = parse_env!(lookup, "DASHBOARD_SUMMARY_TTL_SECS", 30);
        let readings_ttl: u64 = parse_env!(lookup, "DASHBOARD_READINGS_TTL_SECS", 30);
        let alerts_ttl: u64 = parse_env!(lookup, "DASHBOARD_ALERTS_TTL_SECS", 60);

        Ok(Config {
            bind_addr,
            primary,
            fallback_file,
            retention,
            provenance,
            dashboard_ttls: DashboardTtls {
                summary: Duration::from_secs(summary_ttl),
                readings: Duration::from_secs(readings_ttl),
                alerts: Duration::from_secs(alerts_ttl),
            },
        })
    }

    /// Log the loaded configuration.
    ///
    /// The primary store password is never printed, only its length.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  BIND_ADDR             : {}", self.bind_addr);
        tracing::info!("  PRIMARY_BACKEND       : {}", self.primary.name());
        if let PrimaryBackend::Postgres(pg) = &self.primary {
            tracing::info!("  PRIMARY_DB_HOST       : {}", pg.host);
            tracing::info!("  PRIMARY_DB_PORT       : {}", pg.port);
            tracing::info!("  PRIMARY_DB_NAME       : {}", pg.database);
            tracing::info!("  PRIMARY_DB_USER       : {}", pg.user);
            tracing::info!("  PRIMARY_DB_PASSWORD   : **** ({} chars)", pg.password.len());
            tracing::info!("  PRIMARY_CONNECT_TIMEOUT: {:?}", pg.connect_timeout);
        }
        tracing::info!("  FALLBACK_DATA_FILE    : {}", self.fallback_file.display());
        tracing::info!("  FALLBACK_MAX_READINGS : {}", describe_bound(self.retention.max_readings));
        tracing::info!("  FALLBACK_MAX_ALERTS   : {}", describe_bound(self.retention.max_alerts));
        tracing::info!("  DEFAULT_FARM_ID       : {}", self.provenance.farm_id);
        tracing::info!("  DEFAULT_TEAM_NAME     : {}", self.provenance.team_name);
        tracing::info!("  DASHBOARD TTLs        : {:?}", self.dashboard_ttls);
    }
}

/// Parse a retention bound; `unbounded` (or `none`) lifts the cap.
fn parse_bound<F>(lookup: &F, var_name: &str, default: Option<usize>) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let Some(raw) = lookup(var_name) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "unbounded" | "none" => Ok(None),
        value => value
            .parse::<usize>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}: {}", var_name, e)),
    }
}

fn describe_bound(bound: Option<usize>) -> String {
    bound.map_or_else(|| "unbounded".to_string(), |n| n.to_string())
}
