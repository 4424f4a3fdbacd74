//! Primary store schema management for `waterwise-telemetry`.
//!
//! Ensures the lookup table, record tables, the active-alerts view and their
//! indexes exist. Applied once on startup when the PostgreSQL backend is
//! reachable.

use sqlx::postgres::PgConnection;
use sqlx::Connection;

use crate::models::Severity;

// ---

/// Create or update the primary schema (idempotent).
///
/// Identifiers are owned by the database (`GENERATED ALWAYS AS IDENTITY`);
/// inserts read them back with `RETURNING`. Safe to call on every startup.
pub async fn create_schema(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = conn.begin().await?;

    // Severity lookup resolved by alert inserts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ww_nivel_severidade (
            id_nivel_severidade  SMALLINT PRIMARY KEY,
            codigo_severidade    TEXT NOT NULL UNIQUE,
            descricao_severidade TEXT NOT NULL,
            acoes_recomendadas   TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for severity in Severity::ALL {
        sqlx::query(
            r#"
            INSERT INTO ww_nivel_severidade (
                id_nivel_severidade, codigo_severidade,
                descricao_severidade, acoes_recomendadas
            ) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id_nivel_severidade) DO NOTHING
            "#,
        )
        .bind(severity.id())
        .bind(severity.code())
        .bind(severity.description())
        .bind(severity.recommended_action())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ww_leitura_sensor (
            id_leitura        BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            id_sensor         BIGINT           NOT NULL,
            umidade_solo      DOUBLE PRECISION NOT NULL,
            temperatura_ar    DOUBLE PRECISION NOT NULL,
            precipitacao_mm   DOUBLE PRECISION NOT NULL,
            timestamp_leitura TIMESTAMPTZ      NOT NULL DEFAULT now(),
            farm_id           TEXT,
            team_name         TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // `id_leitura` is a loose link: replayed alerts may reference ledger-local ids.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ww_alerta (
            id_alerta           BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            id_produtor         BIGINT      NOT NULL,
            id_leitura          BIGINT,
            id_nivel_severidade SMALLINT    NOT NULL REFERENCES ww_nivel_severidade,
            descricao_alerta    TEXT        NOT NULL,
            timestamp_alerta    TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE OR REPLACE VIEW vw_alertas_ativos AS
        SELECT a.id_alerta,
               a.id_produtor,
               a.id_leitura,
               ns.codigo_severidade,
               ns.descricao_severidade,
               ns.acoes_recomendadas,
               a.descricao_alerta,
               a.timestamp_alerta
          FROM ww_alerta a
          JOIN ww_nivel_severidade ns USING (id_nivel_severidade)
         WHERE a.timestamp_alerta >= now() - INTERVAL '24 hours';
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_leitura_sensor_timestamp
            ON ww_leitura_sensor (timestamp_leitura DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerta_timestamp
            ON ww_alerta (timestamp_alerta DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
