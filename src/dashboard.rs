//! Cached read-only queries backing the monitoring dashboard.
//!
//! The dashboard only ever reads the primary store; a failed primary read
//! surfaces as an error and is not cached.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::ReadThroughCache;
use crate::config::DashboardTtls;
use crate::error::PrimaryError;
use crate::models::{Severity, StoredAlert, StoredReading};
use crate::primary::{DailyMetrics, PrimaryStore};

// ---

#[derive(Debug, Clone, Serialize)]
pub struct SeverityCount {
    pub codigo_severidade: &'static str,
    pub descricao: &'static str,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub leituras_hoje: i64,
    pub alertas_hoje: i64,
    pub sensores_ativos: i64,
    /// Every severity level, most severe first, zero when absent.
    pub alertas_por_severidade: Vec<SeverityCount>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSummary {
    fn from_metrics(metrics: DailyMetrics) -> Self {
        // ---
        let alertas_por_severidade = Severity::ALL
            .into_iter()
            .map(|severity| SeverityCount {
                codigo_severidade: severity.code(),
                descricao: severity.description(),
                total: metrics
                    .alertas_por_severidade
                    .get(severity.code())
                    .copied()
                    .unwrap_or(0),
            })
            .collect();

        Self {
            leituras_hoje: metrics.leituras_hoje,
            alertas_hoje: metrics.alertas_hoje,
            sensores_ativos: metrics.sensores_ativos,
            alertas_por_severidade,
            generated_at: Utc::now(),
        }
    }
}

pub struct DashboardReader {
    primary: Arc<dyn PrimaryStore>,
    summary: ReadThroughCache<(), DashboardSummary>,
    readings: ReadThroughCache<u32, Vec<StoredReading>>,
    alerts: ReadThroughCache<u32, Vec<StoredAlert>>,
}

impl DashboardReader {
    pub fn new(primary: Arc<dyn PrimaryStore>, ttls: DashboardTtls) -> Self {
        let reader = Self {
            primary,
            summary: ReadThroughCache::new("dashboard_summary", ttls.summary),
            readings: ReadThroughCache::new("dashboard_readings", ttls.readings),
            alerts: ReadThroughCache::new("dashboard_alerts", ttls.alerts),
        };
        tracing::debug!(
            summary_ttl = ?reader.summary.ttl(),
            readings_ttl = ?reader.readings.ttl(),
            alerts_ttl = ?reader.alerts.ttl(),
            "Dashboard caches ready"
        );
        reader
    }

    pub async fn summary(&self) -> Result<DashboardSummary, PrimaryError> {
        // ---
        self.summary
            .get_or_load((), || async {
                let mut session = self.primary.connect().await?;
                let metrics = session.daily_metrics().await;
                session.close().await;
                Ok::<_, PrimaryError>(DashboardSummary::from_metrics(metrics?))
            })
            .await
    }

    pub async fn readings(&self, limit: u32) -> Result<Vec<StoredReading>, PrimaryError> {
        // ---
        self.readings
            .get_or_load(limit, || async {
                let mut session = self.primary.connect().await?;
                let rows = session.fetch_recent_readings(i64::from(limit)).await;
                session.close().await;
                rows
            })
            .await
    }

    pub async fn alerts(&self, limit: u32) -> Result<Vec<StoredAlert>, PrimaryError> {
        // ---
        self.alerts
            .get_or_load(limit, || async {
                let mut session = self.primary.connect().await?;
                let rows = session.fetch_recent_alerts(i64::from(limit)).await;
                session.close().await;
                rows
            })
            .await
    }

    /// Drop every cached dashboard query.
    pub fn invalidate(&self) {
        self.summary.invalidate_all();
        self.readings.invalidate_all();
        self.alerts.invalidate_all();
        tracing::info!("Dashboard caches invalidated");
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::fallback::tests::{alert, reading};
    use crate::primary::MemoryPrimary;
    use std::time::Duration;

    fn ttls() -> DashboardTtls {
        DashboardTtls {
            summary: Duration::from_secs(60),
            readings: Duration::from_secs(60),
            alerts: Duration::from_secs(60),
        }
    }

    async fn seed(primary: &MemoryPrimary) {
        let mut session = primary.connect().await.ok().unwrap();
        session.insert_reading(&reading(1)).await.unwrap();
        session.insert_alert(&alert("CRITICO")).await.unwrap();
        session.close().await;
    }

    #[tokio::test]
    async fn test_summary_lists_every_severity() {
        // ---
        let primary = Arc::new(MemoryPrimary::new());
        seed(&primary).await;
        let reader = DashboardReader::new(primary.clone(), ttls());

        let summary = reader.summary().await.unwrap();
        assert_eq!(summary.leituras_hoje, 1);
        let codes: Vec<&str> = summary.alertas_por_severidade.iter().map(|c| c.codigo_severidade).collect();
        assert_eq!(codes, vec!["CRITICO", "ALTO", "MEDIO", "BAIXO"]);
        assert_eq!(summary.alertas_por_severidade[0].total, 1);
        assert_eq!(summary.alertas_por_severidade[3].total, 0);
    }

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        // ---
        let primary = Arc::new(MemoryPrimary::new());
        seed(&primary).await;
        let reader = DashboardReader::new(primary.clone(), ttls());

        assert_eq!(reader.readings(10).await.unwrap().len(), 1);
        seed(&primary).await;
        assert_eq!(reader.readings(10).await.unwrap().len(), 1);

        reader.invalidate();
        assert_eq!(reader.readings(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_primary_is_an_error() {
        // ---
        let primary = Arc::new(MemoryPrimary::new());
        primary.set_reachable(false);
        let reader = DashboardReader::new(primary.clone(), ttls());

        assert!(reader.alerts(5).await.is_err());
        primary.set_reachable(true);
        assert!(reader.alerts(5).await.unwrap().is_empty());
    }
}
