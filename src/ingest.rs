//! Ingestion write policy: primary first, fallback on failure.
//!
//! A submission is durable if and only if the primary insert committed or
//! the fallback ledger was persisted; the returned [`StorageTag`] says which.
//! Nothing written to the ledger is copied to the primary store until
//! [`replay`] runs.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ProvenanceDefaults;
use crate::error::{IngestError, PrimaryError, ReplayError};
use crate::fallback::{FallbackStore, Ledger};
use crate::models::{NewAlert, NewReading, StorageTag, StoredAlert, StoredReading};
use crate::primary::{PrimarySession, PrimaryStore};
use crate::validate;

// ---

/// A submission that one of the stores accepted.
#[derive(Debug, Clone)]
pub struct Accepted<T> {
    pub storage: StorageTag,
    pub id: i64,
    pub record: T,
}

/// Validate and persist a sensor reading.
pub async fn submit_reading(
    primary: &dyn PrimaryStore,
    fallback: &FallbackStore,
    defaults: &ProvenanceDefaults,
    payload: &Value,
) -> Result<Accepted<StoredReading>, IngestError> {
    // ---
    let span = info_span!("ingest_reading", request_id = %Uuid::new_v4());
    async move {
        let reading = validate::reading_from_payload(payload, defaults, Utc::now()).map_err(|e| {
            warn!(error = %e, "Rejected reading");
            e
        })?;
        info!(id_sensor = reading.id_sensor, "Reading received");
        record_reading(primary, fallback, reading).await
    }
    .instrument(span)
    .await
}

/// Validate and persist an alert.
pub async fn submit_alert(
    primary: &dyn PrimaryStore,
    fallback: &FallbackStore,
    payload: &Value,
) -> Result<Accepted<StoredAlert>, IngestError> {
    // ---
    let span = info_span!("ingest_alert", request_id = %Uuid::new_v4());
    async move {
        let alert = validate::alert_from_payload(payload, Utc::now()).map_err(|e| {
            warn!(error = %e, "Rejected alert");
            e
        })?;
        info!(
            id_produtor = alert.id_produtor,
            codigo_severidade = %alert.codigo_severidade,
            "Alert received"
        );
        record_alert(primary, fallback, alert).await
    }
    .instrument(span)
    .await
}

/// Persist an already validated reading.
pub async fn record_reading(
    primary: &dyn PrimaryStore,
    fallback: &FallbackStore,
    reading: NewReading,
) -> Result<Accepted<StoredReading>, IngestError> {
    // ---
    let primary_err = match primary.connect().await {
        Ok(mut session) => {
            let outcome = session.insert_reading(&reading).await;
            session.close().await;
            match outcome {
                Ok(id) => {
                    info!(id_leitura = id, storage = "primary", "Reading stored");
                    return Ok(Accepted {
                        storage: StorageTag::Primary,
                        id,
                        record: reading.into_stored(id),
                    });
                }
                Err(e) => e,
            }
        }
        Err(e) => e,
    };
    warn!(error = %primary_err, "Primary store did not take the reading, using fallback ledger");

    match fallback.append_reading(reading).await {
        Ok(stored) => Ok(Accepted {
            storage: StorageTag::Fallback,
            id: stored.id_leitura,
            record: stored,
        }),
        Err(fallback_err) => {
            error!(error = %fallback_err, "Reading could not be persisted anywhere");
            Err(IngestError::PersistenceUnavailable {
                primary: primary_err,
                fallback: fallback_err,
            })
        }
    }
}

/// Persist an already validated alert.
pub async fn record_alert(
    primary: &dyn PrimaryStore,
    fallback: &FallbackStore,
    alert: NewAlert,
) -> Result<Accepted<StoredAlert>, IngestError> {
    // ---
    let primary_err = match primary.connect().await {
        Ok(mut session) => {
            let outcome = session.insert_alert(&alert).await;
            session.close().await;
            match outcome {
                Ok(id) => {
                    info!(id_alerta = id, storage = "primary", "Alert stored");
                    return Ok(Accepted {
                        storage: StorageTag::Primary,
                        id,
                        record: alert.into_stored(id),
                    });
                }
                Err(e) => e,
            }
        }
        Err(e) => e,
    };
    warn!(error = %primary_err, "Primary store did not take the alert, using fallback ledger");

    match fallback.append_alert(alert).await {
        Ok(stored) => Ok(Accepted {
            storage: StorageTag::Fallback,
            id: stored.id_alerta,
            record: stored,
        }),
        Err(fallback_err) => {
            error!(error = %fallback_err, "Alert could not be persisted anywhere");
            Err(IngestError::PersistenceUnavailable {
                primary: primary_err,
                fallback: fallback_err,
            })
        }
    }
}

/// Per-kind counters of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayCounts {
    pub replayed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub readings: ReplayCounts,
    pub alerts: ReplayCounts,
}

/// Re-insert unsynced ledger entries into the primary store.
///
/// Each entry is marked `synced` and the ledger is rewritten as soon as its
/// insert committed; entries already marked are skipped, so running this
/// twice inserts nothing new. Entries that fail stay unsynced for the next
/// run. The ledger is rewritten once before anything is inserted, so a
/// ledger that cannot be written aborts the run with nothing replayed.
pub async fn replay(primary: &dyn PrimaryStore, fallback: &FallbackStore) -> Result<ReplayReport, ReplayError> {
    // ---
    let _guard = fallback.exclusive().await;
    let mut ledger = fallback.load().await;

    if fallback.exists().await {
        fallback.persist(&ledger).await?;
    }

    let mut session = primary.connect().await?;
    let result = replay_entries(session.as_mut(), fallback, &mut ledger).await;
    session.close().await;

    let report = result?;
    info!(?report, "Fallback replay finished");
    Ok(report)
}

async fn replay_entries(
    session: &mut dyn PrimarySession,
    fallback: &FallbackStore,
    ledger: &mut Ledger,
) -> Result<ReplayReport, ReplayError> {
    // ---
    let mut report = ReplayReport::default();

    for index in 0..ledger.leituras.len() {
        let entry = &ledger.leituras[index];
        if entry.synced {
            report.readings.skipped += 1;
            continue;
        }
        match session.insert_reading(&entry.to_new()).await {
            Ok(id) => {
                info!(id_leitura = entry.id_leitura, primary_id = id, "Reading replayed");
                ledger.leituras[index].synced = true;
                fallback.persist(ledger).await?;
                report.readings.replayed += 1;
            }
            Err(e) => {
                log_replay_failure("reading", entry.id_leitura, &e);
                report.readings.failed += 1;
            }
        }
    }

    for index in 0..ledger.alertas.len() {
        let entry = &ledger.alertas[index];
        if entry.synced {
            report.alerts.skipped += 1;
            continue;
        }
        match session.insert_alert(&entry.to_new()).await {
            Ok(id) => {
                info!(id_alerta = entry.id_alerta, primary_id = id, "Alert replayed");
                ledger.alertas[index].synced = true;
                fallback.persist(ledger).await?;
                report.alerts.replayed += 1;
            }
            Err(e) => {
                log_replay_failure("alert", entry.id_alerta, &e);
                report.alerts.failed += 1;
            }
        }
    }

    Ok(report)
}

fn log_replay_failure(kind: &str, local_id: i64, err: &PrimaryError) {
    warn!(kind, local_id, error = %err, "Replay insert failed, entry stays unsynced");
}
