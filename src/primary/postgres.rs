//! PostgreSQL implementation of the primary store.
//!
//! No pooling: each call to [`PgPrimaryStore::connect`] walks the address
//! variants in priority order and returns the first connection that answers
//! a trivial query.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};
use tracing::{debug, error, info, warn};

use super::{
    AddressVariant, DailyMetrics, PrimaryDescription, PrimaryIdentity, PrimarySession,
    PrimaryStore, EXPECTED_TABLES,
};
use crate::config::PrimaryConfig;
use crate::error::PrimaryError;
use crate::models::{NewAlert, NewReading, StoredAlert, StoredReading};
use crate::schema;

// ---

pub struct PgPrimaryStore {
    cfg: PrimaryConfig,
}

impl PgPrimaryStore {
    pub fn new(cfg: PrimaryConfig) -> Self {
        Self { cfg }
    }

    fn connect_options(&self, variant: AddressVariant) -> Result<PgConnectOptions, sqlx::Error> {
        // ---
        let cfg = &self.cfg;
        let opts = match variant {
            AddressVariant::HostPortService => PgConnectOptions::from_str(&format!(
                "postgres://{}:{}/{}",
                cfg.host, cfg.port, cfg.database
            ))?,
            AddressVariant::Descriptor => PgConnectOptions::new()
                .host(&cfg.host)
                .port(cfg.port)
                .database(&cfg.database),
            AddressVariant::ExplicitProtocol => PgConnectOptions::from_str(&format!(
                "postgresql://{}:{}/{}?sslmode=disable",
                cfg.host, cfg.port, cfg.database
            ))?,
        };
        // Credentials go through the builder so they never need URL escaping.
        Ok(opts.username(&cfg.user).password(&cfg.password))
    }

    /// Try every address variant; the first verified connection wins.
    async fn open(&self) -> Result<PgConnection, PrimaryError> {
        // ---
        for (index, variant) in AddressVariant::PRIORITY.into_iter().enumerate() {
            let attempt = index + 1;
            let address = variant.render(&self.cfg);
            info!(attempt, variant = variant.name(), "Connecting {}@{}", self.cfg.user, address);

            let opts = match self.connect_options(variant) {
                Ok(opts) => opts,
                Err(e) => {
                    warn!(attempt, variant = variant.name(), error = %e, "Invalid address variant");
                    continue;
                }
            };

            let connecting = PgConnection::connect_with(&opts);
            let mut conn = match tokio::time::timeout(self.cfg.connect_timeout, connecting).await {
                Ok(Ok(conn)) => conn,
                Ok(Err(e)) => {
                    warn!(attempt, variant = variant.name(), error = %e, "Address variant failed");
                    continue;
                }
                Err(_) => {
                    warn!(
                        attempt,
                        variant = variant.name(),
                        "Address variant timed out after {:?}",
                        self.cfg.connect_timeout
                    );
                    continue;
                }
            };

            if let Err(e) = sqlx::query("SELECT 1").execute(&mut conn).await {
                warn!(attempt, variant = variant.name(), error = %e, "Connection did not answer");
                close_quietly(conn).await;
                continue;
            }

            info!(attempt, variant = variant.name(), "Connected to primary store at {}", address);
            return Ok(conn);
        }

        error!("All primary store address variants failed");
        Err(PrimaryError::ConnectionUnavailable {
            attempts: AddressVariant::PRIORITY.len(),
        })
    }

    /// Create tables, views and seed data if missing.
    pub async fn bootstrap_schema(&self) -> Result<(), PrimaryError> {
        // ---
        let mut conn = self.open().await?;
        let result = schema::create_schema(&mut conn).await;
        close_quietly(conn).await;
        result.map_err(PrimaryError::from)
    }
}

#[async_trait]
impl PrimaryStore for PgPrimaryStore {
    async fn connect(&self) -> Result<Box<dyn PrimarySession>, PrimaryError> {
        let conn = self.open().await?;
        Ok(Box::new(PgSession { conn }))
    }

    fn describe(&self) -> PrimaryDescription {
        // ---
        PrimaryDescription {
            backend: "postgres",
            host: Some(self.cfg.host.clone()),
            port: Some(self.cfg.port),
            database: Some(self.cfg.database.clone()),
            user: Some(self.cfg.user.clone()),
            password_length: Some(self.cfg.password.len()),
            address_variants: AddressVariant::PRIORITY
                .iter()
                .map(|v| v.render(&self.cfg))
                .collect(),
        }
    }
}

async fn close_quietly(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Error while closing primary connection");
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl PrimarySession for PgSession {
    async fn ping(&mut self) -> Result<PrimaryIdentity, PrimaryError> {
        // ---
        let row = sqlx::query(
            r#"
            SELECT current_user::text     AS db_user,
                   current_database()::text AS db_name,
                   (SELECT COUNT(*)
                      FROM information_schema.tables
                     WHERE table_schema = current_schema()
                       AND table_name = ANY($1)) AS tables_found
            "#,
        )
        .bind(&EXPECTED_TABLES[..])
        .fetch_one(&mut self.conn)
        .await?;

        Ok(PrimaryIdentity {
            user: row.try_get("db_user")?,
            database: row.try_get("db_name")?,
            tables_found: row.try_get("tables_found")?,
            tables_expected: EXPECTED_TABLES.len(),
        })
    }

    async fn insert_reading(&mut self, reading: &NewReading) -> Result<i64, PrimaryError> {
        // ---
        let mut tx = self.conn.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ww_leitura_sensor (
                id_sensor, umidade_solo, temperatura_ar, precipitacao_mm,
                timestamp_leitura, farm_id, team_name
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id_leitura
            "#,
        )
        .bind(reading.id_sensor)
        .bind(reading.umidade_solo)
        .bind(reading.temperatura_ar)
        .bind(reading.precipitacao_mm)
        .bind(reading.timestamp)
        .bind(&reading.farm_id)
        .bind(&reading.team_name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn insert_alert(&mut self, alert: &NewAlert) -> Result<i64, PrimaryError> {
        // ---
        let mut tx = self.conn.begin().await?;

        // The join yields no row for an unknown code, so nothing is inserted.
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO ww_alerta (
                id_produtor, id_leitura, id_nivel_severidade,
                descricao_alerta, timestamp_alerta
            )
            SELECT $1, $2, ns.id_nivel_severidade, $4, $5
              FROM ww_nivel_severidade ns
             WHERE ns.codigo_severidade = $3
            RETURNING id_alerta
            "#,
        )
        .bind(alert.id_produtor)
        .bind(alert.id_leitura)
        .bind(&alert.codigo_severidade)
        .bind(&alert.descricao_alerta)
        .bind(alert.timestamp)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Err(PrimaryError::ConstraintViolation(format!(
                "unknown severity code {:?}",
                alert.codigo_severidade
            )));
        };

        tx.commit().await?;
        Ok(id)
    }

    async fn fetch_recent_readings(&mut self, limit: i64) -> Result<Vec<StoredReading>, PrimaryError> {
        // ---
        let rows = sqlx::query_as::<_, StoredReading>(
            r#"
            SELECT id_leitura, id_sensor, umidade_solo, temperatura_ar, precipitacao_mm,
                   timestamp_leitura AS timestamp, farm_id, team_name
              FROM ww_leitura_sensor
             ORDER BY timestamp_leitura DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows)
    }

    async fn fetch_recent_alerts(&mut self, limit: i64) -> Result<Vec<StoredAlert>, PrimaryError> {
        // ---
        let rows = sqlx::query_as::<_, StoredAlert>(
            r#"
            SELECT a.id_alerta, a.id_produtor, ns.codigo_severidade, a.descricao_alerta,
                   a.id_leitura, a.timestamp_alerta AS timestamp
              FROM ww_alerta a
              JOIN ww_nivel_severidade ns USING (id_nivel_severidade)
             ORDER BY a.timestamp_alerta DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows)
    }

    async fn daily_metrics(&mut self) -> Result<DailyMetrics, PrimaryError> {
        // ---
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM ww_leitura_sensor
                  WHERE timestamp_leitura >= date_trunc('day', now())) AS leituras_hoje,
                (SELECT COUNT(*) FROM ww_alerta
                  WHERE timestamp_alerta >= date_trunc('day', now()))  AS alertas_hoje,
                (SELECT COUNT(DISTINCT id_sensor) FROM ww_leitura_sensor) AS sensores_ativos
            "#,
        )
        .fetch_one(&mut self.conn)
        .await?;

        let by_severity: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT codigo_severidade, COUNT(*)
              FROM vw_alertas_ativos
             GROUP BY codigo_severidade
            "#,
        )
        .fetch_all(&mut self.conn)
        .await?;

        Ok(DailyMetrics {
            leituras_hoje: row.try_get("leituras_hoje")?,
            alertas_hoje: row.try_get("alertas_hoje")?,
            sensores_ativos: row.try_get("sensores_ativos")?,
            alertas_por_severidade: by_severity.into_iter().collect(),
        })
    }

    async fn close(self: Box<Self>) {
        close_quietly(self.conn).await;
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_err;

    fn closed_port_store() -> PgPrimaryStore {
        PgPrimaryStore::new(PrimaryConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "waterwise".to_string(),
            user: "waterwise".to_string(),
            password: "secret".to_string(),
            connect_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_every_variant_tried_before_giving_up() {
        // ---
        let store = closed_port_store();

        let err = assert_err!(store.connect().await.map(|_| ()));

        assert!(matches!(err, PrimaryError::ConnectionUnavailable { attempts: 3 }));
    }

    #[test]
    fn test_every_variant_builds_options() {
        // ---
        let store = closed_port_store();
        for variant in AddressVariant::PRIORITY {
            let opts = store.connect_options(variant).unwrap();
            assert_eq!(opts.get_host(), "127.0.0.1");
            assert_eq!(opts.get_port(), 1);
            assert_eq!(opts.get_database(), Some("waterwise"));
            assert_eq!(opts.get_username(), "waterwise");
        }
    }
}
