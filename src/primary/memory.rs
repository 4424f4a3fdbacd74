//! In-process primary store.
//!
//! Mirrors the PostgreSQL store's contract (store-assigned ids, severity
//! lookup, newest-first reads) without a database. Reachability can be
//! toggled at runtime to exercise the fallback paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    DailyMetrics, PrimaryDescription, PrimaryIdentity, PrimarySession, PrimaryStore,
    EXPECTED_TABLES,
};
use crate::error::PrimaryError;
use crate::models::{NewAlert, NewReading, Severity, StoredAlert, StoredReading};

// ---

#[derive(Debug, Default)]
struct Tables {
    readings: Vec<StoredReading>,
    alerts: Vec<StoredAlert>,
}

#[derive(Debug)]
pub struct MemoryPrimary {
    tables: Arc<Mutex<Tables>>,
    reachable: AtomicBool,
}

impl Default for MemoryPrimary {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPrimary {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            reachable: AtomicBool::new(true),
        }
    }

    /// Make subsequent connects succeed or fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Snapshot of every stored reading, in insertion order.
    pub fn readings(&self) -> Vec<StoredReading> {
        lock(&self.tables).readings.clone()
    }

    /// Snapshot of every stored alert, in insertion order.
    pub fn alerts(&self) -> Vec<StoredAlert> {
        lock(&self.tables).alerts.clone()
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl PrimaryStore for MemoryPrimary {
    async fn connect(&self) -> Result<Box<dyn PrimarySession>, PrimaryError> {
        // ---
        if !self.reachable.load(Ordering::SeqCst) {
            tracing::warn!("In-memory primary store marked unreachable");
            return Err(PrimaryError::ConnectionUnavailable { attempts: 1 });
        }
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
        }))
    }

    fn describe(&self) -> PrimaryDescription {
        PrimaryDescription::without_address("memory")
    }
}

struct MemorySession {
    tables: Arc<Mutex<Tables>>,
}

#[async_trait]
impl PrimarySession for MemorySession {
    async fn ping(&mut self) -> Result<PrimaryIdentity, PrimaryError> {
        Ok(PrimaryIdentity {
            user: "memory".to_string(),
            database: "memory".to_string(),
            tables_found: EXPECTED_TABLES.len() as i64,
            tables_expected: EXPECTED_TABLES.len(),
        })
    }

    async fn insert_reading(&mut self, reading: &NewReading) -> Result<i64, PrimaryError> {
        // ---
        let mut tables = lock(&self.tables);
        let id = tables.readings.len() as i64 + 1;
        tables.readings.push(reading.clone().into_stored(id));
        Ok(id)
    }

    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<i64, PrimaryError> {
        // ---
        if Severity::from_code(&alert.codigo_severidade).is_none() {
            return Err(PrimaryError::ConstraintViolation(format!(
                "unknown severity code {:?}",
                alert.codigo_severidade
            )));
        }
        let mut tables = lock(&self.tables);
        let id = tables.alerts.len() as i64 + 1;
        tables.alerts.push(alert.clone().into_stored(id));
        Ok(id)
    }

    async fn fetch_recent_readings(&mut self, limit: i64) -> Result<Vec<StoredReading>, PrimaryError> {
        // ---
        let mut rows = lock(&self.tables).readings.clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn fetch_recent_alerts(&mut self, limit: i64) -> Result<Vec<StoredAlert>, PrimaryError> {
        // ---
        let mut rows = lock(&self.tables).alerts.clone();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn daily_metrics(&mut self) -> Result<DailyMetrics, PrimaryError> {
        // ---
        let tables = lock(&self.tables);
        let now = Utc::now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let day_ago = now - Duration::hours(24);

        let mut sensors: Vec<i64> = tables.readings.iter().map(|r| r.id_sensor).collect();
        sensors.sort_unstable();
        sensors.dedup();

        let mut metrics = DailyMetrics {
            leituras_hoje: tables.readings.iter().filter(|r| r.timestamp >= midnight).count() as i64,
            alertas_hoje: tables.alerts.iter().filter(|a| a.timestamp >= midnight).count() as i64,
            sensores_ativos: sensors.len() as i64,
            ..DailyMetrics::default()
        };
        for alert in tables.alerts.iter().filter(|a| a.timestamp >= day_ago) {
            *metrics
                .alertas_por_severidade
                .entry(alert.codigo_severidade.clone())
                .or_insert(0) += 1;
        }
        Ok(metrics)
    }

    async fn close(self: Box<Self>) {}
}
