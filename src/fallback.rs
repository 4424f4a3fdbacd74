//! Local fallback ledger.
//!
//! A single JSON file holding two ordered sequences, `leituras` and
//! `alertas`, written only when the primary store cannot take a record.
//! The file is always rewritten in full (temp file + rename); loading a
//! missing or unreadable file yields an empty ledger so there is always
//! something to write into.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::FallbackError;
use crate::models::{NewAlert, NewReading, StoredAlert, StoredReading};

// ---

/// Retention bound per record kind; `None` keeps everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub max_readings: Option<usize>,
    pub max_alerts: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_readings: Some(100),
            max_alerts: None,
        }
    }
}

/// An entry of one of the ledger sequences.
pub trait LedgerEntry {
    fn local_id(&self) -> i64;
}

impl LedgerEntry for StoredReading {
    fn local_id(&self) -> i64 {
        self.id_leitura
    }
}

impl LedgerEntry for StoredAlert {
    fn local_id(&self) -> i64 {
        self.id_alerta
    }
}

/// In-memory image of the ledger file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub leituras: Vec<StoredReading>,
    #[serde(default)]
    pub alertas: Vec<StoredAlert>,
}

impl Ledger {
    /// Append a reading under a fresh local id, then trim to the bound.
    pub fn append_reading(&mut self, reading: NewReading, retention: &RetentionPolicy) -> StoredReading {
        // ---
        let stored = reading.into_stored(next_local_id(&self.leituras));
        push_bounded(&mut self.leituras, stored.clone(), retention.max_readings);
        stored
    }

    /// Append an alert under a fresh local id, then trim to the bound.
    pub fn append_alert(&mut self, alert: NewAlert, retention: &RetentionPolicy) -> StoredAlert {
        // ---
        let stored = alert.into_stored(next_local_id(&self.alertas));
        push_bounded(&mut self.alertas, stored.clone(), retention.max_alerts);
        stored
    }

    /// Up to `limit` most recent readings, most recent first.
    pub fn recent_readings(&self, limit: usize) -> Vec<StoredReading> {
        most_recent_first(&self.leituras, limit)
    }

    /// Up to `limit` most recent alerts, most recent first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<StoredAlert> {
        most_recent_first(&self.alertas, limit)
    }
}

/// One greater than the highest id in the sequence.
///
/// Equals `len + 1` until the first trim, and stays unique afterwards.
fn next_local_id<T: LedgerEntry>(entries: &[T]) -> i64 {
    entries.iter().map(LedgerEntry::local_id).max().unwrap_or(0) + 1
}

/// Oldest entries are evicted first; order is never changed.
fn push_bounded<T>(entries: &mut Vec<T>, entry: T, bound: Option<usize>) {
    entries.push(entry);
    if let Some(max) = bound {
        if entries.len() > max {
            let excess = entries.len() - max;
            entries.drain(..excess);
        }
    }
}

fn most_recent_first<T: Clone>(entries: &[T], limit: usize) -> Vec<T> {
    entries.iter().rev().take(limit).cloned().collect()
}

/// File-backed ledger used when the primary store is unavailable.
#[derive(Debug)]
pub struct FallbackStore {
    // ---
    path: PathBuf,
    retention: RetentionPolicy,

    /// Serializes load-modify-persist cycles within this process.
    write_lock: Mutex<()>,
}

impl FallbackStore {
    pub fn new(path: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            path: path.into(),
            retention,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Hold the ledger exclusively across a custom load/persist cycle.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Read the ledger file.
    ///
    /// A missing or unparseable file is logged and treated as empty.
    pub async fn load(&self) -> Ledger {
        // ---
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No fallback ledger yet, starting empty");
                return Ledger::default();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read fallback ledger");
                return Ledger::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fallback ledger is corrupt, treating as empty");
                Ledger::default()
            }
        }
    }

    /// Rewrite the whole ledger file.
    ///
    /// The new content goes to a sibling temp file that is then renamed over
    /// the ledger, so readers see either the old or the new file.
    pub async fn persist(&self, ledger: &Ledger) -> Result<(), FallbackError> {
        // ---
        let body = serde_json::to_vec_pretty(ledger)?;

        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let write_failed = |source| FallbackError::FallbackWriteFailed {
            path: self.path.clone(),
            source,
        };

        tokio::fs::write(&tmp_path, &body).await.map_err(write_failed)?;
        if let Err(source) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_failed(source));
        }

        debug!(
            path = %self.path.display(),
            leituras = ledger.leituras.len(),
            alertas = ledger.alertas.len(),
            "Fallback ledger persisted"
        );
        Ok(())
    }

    /// Append a reading and persist the ledger.
    pub async fn append_reading(&self, reading: NewReading) -> Result<StoredReading, FallbackError> {
        // ---
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.load().await;
        let stored = ledger.append_reading(reading, &self.retention);
        self.persist(&ledger).await?;

        info!(
            id_leitura = stored.id_leitura,
            total = ledger.leituras.len(),
            "Reading saved to fallback ledger"
        );
        Ok(stored)
    }

    /// Append an alert and persist the ledger.
    pub async fn append_alert(&self, alert: NewAlert) -> Result<StoredAlert, FallbackError> {
        // ---
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.load().await;
        let stored = ledger.append_alert(alert, &self.retention);
        self.persist(&ledger).await?;

        info!(
            id_alerta = stored.id_alerta,
            total = ledger.alertas.len(),
            "Alert saved to fallback ledger"
        );
        Ok(stored)
    }

    pub async fn fetch_recent_readings(&self, limit: usize) -> Vec<StoredReading> {
        self.load().await.recent_readings(limit)
    }

    pub async fn fetch_recent_alerts(&self, limit: usize) -> Vec<StoredAlert> {
        self.load().await.recent_alerts(limit)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    // ---
    use super::*;
    use chrono::Utc;

    pub(crate) fn scratch_path() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("waterwise-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("waterwise_data.json")
    }

    pub(crate) fn reading(id_sensor: i64) -> NewReading {
        NewReading {
            id_sensor,
            umidade_solo: 42.0,
            temperatura_ar: 25.0,
            precipitacao_mm: 1.5,
            timestamp: Utc::now(),
            farm_id: Some("FARM_WaterWise_2025".to_string()),
            team_name: Some("GRUPO_WATERWISE".to_string()),
        }
    }

    pub(crate) fn alert(code: &str) -> NewAlert {
        NewAlert {
            id_produtor: 1,
            codigo_severidade: code.to_string(),
            descricao_alerta: "Solo seco com chuva intensa".to_string(),
            id_leitura: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        // ---
        let store = FallbackStore::new(scratch_path(), RetentionPolicy::default());
        assert_eq!(store.load().await, Ledger::default());
        assert_eq!(store.load().await, Ledger::default());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        // ---
        let path = scratch_path();
        std::fs::write(&path, b"{\"leituras\": [ not json").unwrap();
        let store = FallbackStore::new(&path, RetentionPolicy::default());

        assert_eq!(store.load().await, Ledger::default());
        assert_eq!(store.load().await, Ledger::default());
    }

    #[tokio::test]
    async fn test_first_append_gets_id_one() {
        // ---
        let store = FallbackStore::new(scratch_path(), RetentionPolicy::default());
        let stored = store.append_reading(reading(3)).await.unwrap();

        assert_eq!(stored.id_leitura, 1);
        let recent = store.fetch_recent_readings(10).await;
        assert_eq!(recent, vec![stored]);
    }

    #[test]
    fn test_reading_retention_evicts_oldest() {
        // ---
        let retention = RetentionPolicy::default();
        let mut ledger = Ledger::default();
        for sensor in 1..=101 {
            ledger.append_reading(reading(sensor), &retention);
        }

        assert_eq!(ledger.leituras.len(), 100);
        let ids: Vec<i64> = ledger.leituras.iter().map(|r| r.id_leitura).collect();
        assert_eq!(ids, (2..=101).collect::<Vec<_>>());
        assert_eq!(ledger.leituras[0].id_sensor, 2);

        // Ids stay unique after trimming.
        let next = ledger.append_reading(reading(102), &retention);
        assert_eq!(next.id_leitura, 102);
        assert_eq!(ledger.leituras.first().unwrap().id_leitura, 3);
    }

    #[test]
    fn test_alert_retention_is_configurable() {
        // ---
        let mut ledger = Ledger::default();
        let unbounded = RetentionPolicy::default();
        for _ in 0..150 {
            ledger.append_alert(alert("ALTO"), &unbounded);
        }
        assert_eq!(ledger.alertas.len(), 150);

        let bounded = RetentionPolicy {
            max_readings: Some(100),
            max_alerts: Some(10),
        };
        ledger.append_alert(alert("ALTO"), &bounded);
        assert_eq!(ledger.alertas.len(), 10);
        assert_eq!(ledger.alertas.last().unwrap().id_alerta, 151);
    }

    #[tokio::test]
    async fn test_recent_readings_newest_first() {
        // ---
        let store = FallbackStore::new(scratch_path(), RetentionPolicy::default());
        for sensor in 1..=5 {
            store.append_reading(reading(sensor)).await.unwrap();
        }

        let ids: Vec<i64> = store
            .fetch_recent_readings(3)
            .await
            .iter()
            .map(|r| r.id_leitura)
            .collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(store.fetch_recent_readings(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        // ---
        let path = std::env::temp_dir()
            .join(format!("waterwise-missing-{}", uuid::Uuid::new_v4()))
            .join("nested")
            .join("waterwise_data.json");
        let store = FallbackStore::new(&path, RetentionPolicy::default());

        let err = store.append_reading(reading(1)).await.unwrap_err();
        assert!(matches!(err, FallbackError::FallbackWriteFailed { .. }));
    }

    #[tokio::test]
    async fn test_ledger_file_layout() {
        // ---
        let path = scratch_path();
        let store = FallbackStore::new(&path, RetentionPolicy::default());
        store.append_reading(reading(3)).await.unwrap();
        store.append_alert(alert("URGENTE")).await.unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["leituras"][0]["id_leitura"], 1);
        assert_eq!(raw["leituras"][0]["id_sensor"], 3);
        assert_eq!(raw["alertas"][0]["id_alerta"], 1);
        assert_eq!(raw["alertas"][0]["codigo_severidade"], "URGENTE");
        assert!(!path.with_file_name("waterwise_data.json.tmp").exists());
    }
}
